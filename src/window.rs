use crate::error::ConfigError;
use chrono::{Duration, NaiveDate, NaiveDateTime};

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive UTC time window of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::TimeWindow {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, ConfigError> {
        Self::new(parse_time(start)?, parse_time(end)?)
    }

    /// Instants `start + n * step` that do not pass `end`.
    pub fn steps(&self, step: Duration) -> Vec<NaiveDateTime> {
        if step <= Duration::zero() {
            return vec![self.start];
        }
        std::iter::successors(Some(self.start), |t| t.checked_add_signed(step))
            .take_while(|t| *t <= self.end)
            .collect()
    }

    /// Dates of the whole-day steps from `start`. The day of `end` only counts
    /// when a full day from `start` still fits.
    pub fn days(&self) -> Vec<NaiveDate> {
        self.steps(Duration::days(1))
            .iter()
            .map(|t| t.date())
            .collect()
    }

    pub fn start_rfc3339(&self) -> String {
        format!("{}Z", self.start.format(DATETIME_FORMAT))
    }

    pub fn end_rfc3339(&self) -> String {
        format!("{}Z", self.end.format(DATETIME_FORMAT))
    }

    /// STAC `datetime` interval, `start/end`.
    pub fn as_interval(&self) -> String {
        format!("{}/{}", self.start_rfc3339(), self.end_rfc3339())
    }
}

/// Accept a full timestamp or a bare date, which means midnight.
pub fn parse_time(value: &str) -> Result<NaiveDateTime, ConfigError> {
    let value = value.trim();
    if let Ok(t) = NaiveDateTime::parse_from_str(value, DATETIME_FORMAT) {
        return Ok(t);
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ConfigError::Time {
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_and_date() {
        let window = TimeWindow::parse("2024-09-15", "2024-09-20T23:59:59").unwrap();
        assert_eq!(window.start.to_string(), "2024-09-15 00:00:00");
        assert_eq!(window.end_rfc3339(), "2024-09-20T23:59:59Z");
        assert!(parse_time("15/09/2024").is_err());
    }

    #[test]
    fn test_days_step_from_start() {
        let window = TimeWindow::parse("2024-09-15T12:00:00", "2024-09-17T00:30:00").unwrap();
        let days: Vec<String> = window.days().iter().map(|d| d.to_string()).collect();
        assert_eq!(days, vec!["2024-09-15", "2024-09-16"]);

        let window = TimeWindow::parse("2024-09-15", "2024-09-17").unwrap();
        assert_eq!(window.days().len(), 3);

        let window = TimeWindow::parse("2024-09-15T08:00:00", "2024-09-15T20:00:00").unwrap();
        let days: Vec<String> = window.days().iter().map(|d| d.to_string()).collect();
        assert_eq!(days, vec!["2024-09-15"]);
    }

    #[test]
    fn test_quarter_hour_steps() {
        let window = TimeWindow::parse("2024-09-15T23:30:00", "2024-09-16T00:10:00").unwrap();
        let slots: Vec<String> = window
            .steps(Duration::minutes(15))
            .iter()
            .map(|t| t.format("%H:%M").to_string())
            .collect();
        assert_eq!(slots, vec!["23:30", "23:45", "00:00"]);
    }

    #[test]
    fn test_reversed_window_rejected() {
        assert!(TimeWindow::parse("2024-09-20", "2024-09-15").is_err());
    }

    #[test]
    fn test_interval() {
        let window = TimeWindow::parse("2024-09-15", "2024-09-16").unwrap();
        assert_eq!(
            window.as_interval(),
            "2024-09-15T00:00:00Z/2024-09-16T00:00:00Z"
        );
    }
}
