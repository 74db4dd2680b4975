use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A (west, south, east, north) longitude/latitude rectangle in degrees.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self, ConfigError> {
        let values = [west, south, east, north];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::BoundingBox(format!(
                "non-finite value in {values:?}"
            )));
        }
        if !(-180.0..=180.0).contains(&west) || !(-180.0..=180.0).contains(&east) || west >= east
        {
            return Err(ConfigError::BoundingBox(format!(
                "longitudes must satisfy -180 <= west < east <= 180, got {west}, {east}"
            )));
        }
        if !(-90.0..=90.0).contains(&south) || !(-90.0..=90.0).contains(&north) || south >= north
        {
            return Err(ConfigError::BoundingBox(format!(
                "latitudes must satisfy -90 <= south < north <= 90, got {south}, {north}"
            )));
        }
        Ok(Self { west, south, east, north })
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.west && lon <= self.east && lat >= self.south && lat <= self.north
    }

    /// Interior test, points on the boundary are excluded.
    pub fn strictly_contains(&self, lon: f64, lat: f64) -> bool {
        lon > self.west && lon < self.east && lat > self.south && lat < self.north
    }

    /// Render as the `W,S,E,N` query parameter most provider APIs accept.
    pub fn as_query(&self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = ConfigError;

    fn try_from(value: [f64; 4]) -> Result<Self, Self::Error> {
        let [west, south, east, north] = value;
        Self::new(west, south, east, north)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(bbox: BoundingBox) -> Self {
        [bbox.west, bbox.south, bbox.east, bbox.north]
    }
}

impl FromStr for BoundingBox {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::BoundingBox(format!("'{s}': {e}")))?;

        let values: [f64; 4] = values
            .try_into()
            .map_err(|_| ConfigError::BoundingBox(format!("'{s}': expected W,S,E,N")))?;
        Self::try_from(values)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[W {}, S {}, E {}, N {}]",
            self.west, self.south, self.east, self.north
        )
    }
}
