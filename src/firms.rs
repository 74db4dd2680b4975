//! Active fire detections from NASA's Fire Information for Resource Management System (FIRMS).
//! see https://firms.modaps.eosdis.nasa.gov/api/area/ for the area API
use crate::bbox::BoundingBox;
use crate::vector::{property_text, PointLayer};
use crate::window::TimeWindow;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use geojson::JsonValue;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const BASE_URL: &str = "https://firms.modaps.eosdis.nasa.gov";

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct FirmsConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_instruments")]
    pub instruments: Vec<FirmsInstrument>,
}

/// An instrument and the FIRMS sources whose detections are merged for it.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct FirmsInstrument {
    pub name: String,
    pub sources: Vec<String>,
}

fn default_base_url() -> String {
    BASE_URL.to_string()
}

fn default_instruments() -> Vec<FirmsInstrument> {
    let instrument = |name: &str, sources: &[&str]| FirmsInstrument {
        name: name.to_string(),
        sources: sources.iter().map(|s| s.to_string()).collect(),
    };
    vec![
        instrument("MODIS", &["MODIS_NRT", "MODIS_SP"]),
        instrument(
            "VIIRS",
            &[
                "VIIRS_SNPP_NRT",
                "VIIRS_NOAA20_NRT",
                "VIIRS_NOAA21_NRT",
                "VIIRS_SNPP_SP",
            ],
        ),
    ]
}

impl Default for FirmsConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            instruments: default_instruments(),
        }
    }
}

/// `[BASE_URL]/api/area/csv/[MAP_KEY]/[SOURCE]/[W,S,E,N]/[DAY_RANGE]/[DAY]`, one day per request.
fn area_url(base_url: &str, map_key: &str, source: &str, bbox: &BoundingBox, day: NaiveDate) -> String {
    format!(
        "{}/api/area/csv/{}/{}/{}/1/{}",
        base_url.trim_end_matches('/'),
        map_key,
        source,
        bbox.as_query(),
        day.format("%Y-%m-%d")
    )
}

pub fn output_dir(output_folder: &Path, run_name: &str) -> PathBuf {
    output_folder
        .join(run_name)
        .join("Satellite_ActiveFires")
        .join("MODIS-VIIRS")
}

fn output_file(dir: &Path, day: NaiveDate, instrument: &str) -> PathBuf {
    dir.join(format!(
        "{}_firms_active_fires_{}.geojson",
        day.format("%Y-%m-%d"),
        instrument
    ))
}

/// `acq_time` is an HHMM integer without leading zeros; render as `HH:MM`.
fn format_acq_time(acq_time: &str) -> Option<String> {
    if acq_time.is_empty() || acq_time.len() > 4 || !acq_time.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let padded = format!("{acq_time:0>4}");
    Some(format!("{}:{}", &padded[..2], &padded[2..]))
}

fn add_day_time(layer: &mut PointLayer) {
    layer.derive_property("day_time", |p| {
        let date = property_text(p, "acq_date")?;
        let time = format_acq_time(&property_text(p, "acq_time")?)?;
        Some(JsonValue::from(format!("{date} {time}")))
    });
}

fn parse_area_csv(content: &str) -> Result<PointLayer> {
    // a bare header means no detections, a single line without one is an API error message
    if content.trim().lines().count() <= 1 && !content.contains("latitude") {
        anyhow::bail!("Unexpected FIRMS response: {}", content.trim());
    }
    PointLayer::from_csv(Cursor::new(content), 0, "longitude", "latitude")
}

async fn query_area(client: &reqwest::Client, url: &str) -> Result<PointLayer> {
    let content = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    parse_area_csv(&content)
}

/// Query every instrument source for every day of the window and write one
/// point layer per day and instrument that has detections. Returns the
/// number of layers written.
pub async fn fetch_active_fires(
    config: &FirmsConfig,
    map_key: &str,
    window: &TimeWindow,
    bbox: &BoundingBox,
    output_dir: &Path,
) -> Result<usize> {
    let client = reqwest::Client::new();
    let mut written = 0;

    for day in window.days() {
        info!(%day, "Querying FIRMS");
        for instrument in config.instruments.iter() {
            info!(instrument = %instrument.name, "Searching for data");
            let mut merged = PointLayer::default();

            for source in instrument.sources.iter() {
                let url = area_url(&config.base_url, map_key, source, bbox, day);
                // the map key is part of the url, log the source only
                match query_area(&client, &url).await {
                    Ok(layer) if layer.is_empty() => {
                        info!(%source, %day, "No data found");
                    }
                    Ok(layer) => {
                        info!(%source, %day, points = layer.len(), "Found data points");
                        merged.append(layer);
                    }
                    Err(e) => {
                        error!(%source, %day, error = %e, "FIRMS request failed");
                    }
                }
            }

            if merged.is_empty() {
                info!(instrument = %instrument.name, %day, "No data found for instrument");
                continue;
            }
            info!(instrument = %instrument.name, %day, points = merged.len(), "Exporting");
            add_day_time(&mut merged);
            let path = output_file(output_dir, day, &instrument.name);
            merged
                .write_geojson(&path)
                .with_context(|| format!("Error writing {}", path.display()))?;
            info!(path = %path.display(), "Saved");
            written += 1;
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIIRS_CSV: &str = "\
latitude,longitude,bright_ti4,scan,track,acq_date,acq_time,satellite,instrument,confidence,version,bright_ti5,frp,daynight
42.01,26.91,330.5,0.39,0.36,2024-09-16,52,N,VIIRS,n,2.0NRT,290.1,4.2,N
42.05,26.95,345.0,0.40,0.37,2024-09-16,1142,N,VIIRS,h,2.0NRT,300.2,12.9,D
";

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 16).unwrap()
    }

    #[test]
    fn test_area_url() {
        let bbox = BoundingBox::new(26.5, 41.7, 27.3, 42.3).unwrap();
        assert_eq!(
            area_url("https://firms.modaps.eosdis.nasa.gov/", "KEY", "VIIRS_SNPP_NRT", &bbox, day()),
            "https://firms.modaps.eosdis.nasa.gov/api/area/csv/KEY/VIIRS_SNPP_NRT/26.5,41.7,27.3,42.3/1/2024-09-16"
        );
    }

    #[test]
    fn test_format_acq_time() {
        assert_eq!(format_acq_time("52").unwrap(), "00:52");
        assert_eq!(format_acq_time("1142").unwrap(), "11:42");
        assert!(format_acq_time("11:42").is_none());
        assert!(format_acq_time("").is_none());
    }

    #[test]
    fn test_parse_and_day_time() {
        let mut layer = parse_area_csv(VIIRS_CSV).unwrap();
        assert_eq!(layer.len(), 2);
        add_day_time(&mut layer);
        assert_eq!(
            layer.features()[0].properties["day_time"],
            JsonValue::from("2024-09-16 00:52")
        );
        assert_eq!(
            layer.features()[1].properties["day_time"],
            JsonValue::from("2024-09-16 11:42")
        );
    }

    #[test]
    fn test_header_only_is_empty_and_garbage_is_error() {
        let header = VIIRS_CSV.lines().next().unwrap();
        assert!(parse_area_csv(header).unwrap().is_empty());
        assert!(parse_area_csv("Invalid MAP_KEY.").is_err());
    }

    #[test]
    fn test_output_paths() {
        let dir = output_dir(Path::new("./out"), "testrun");
        assert_eq!(dir, PathBuf::from("./out/testrun/Satellite_ActiveFires/MODIS-VIIRS"));
        assert_eq!(
            output_file(&dir, day(), "VIIRS").file_name().unwrap(),
            "2024-09-16_firms_active_fires_VIIRS.geojson"
        );
    }
}
