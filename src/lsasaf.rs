//! Pixel fire radiative power of the LSA SAF MSG FRP-PIXEL list product.
//! One point shapefile per SEVIRI slot, mirrored by IPMA under `YYYY/MM/DD/`.
use crate::bbox::BoundingBox;
use crate::download_plan::{DownloadPlan, DownloadTask};
use crate::http::HttpSource;
use crate::vector::{PointFeature, PointLayer};
use crate::window::TimeWindow;
use anyhow::{anyhow, Context, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use geojson::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};
use shapefile::dbase::{FieldValue, Record};
use shapefile::Point;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const BASE_URL: &str = "https://mf2.ipma.pt/downloads/data/lsasaf/frp";

/// Files making up one slot; the first one is read, the others accompany it.
const SIDECARS: [&str; 4] = ["shp", "shx", "dbf", "prj"];

const DAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct LsaSafConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Repeat cycle of the full disk scan
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,
}

fn default_base_url() -> String {
    BASE_URL.to_string()
}

fn default_slot_minutes() -> u32 {
    15
}

impl Default for LsaSafConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            slot_minutes: default_slot_minutes(),
        }
    }
}

pub fn output_dir(output_folder: &Path, run_name: &str) -> PathBuf {
    output_folder
        .join(run_name)
        .join("Satellite_ActiveFires")
        .join("MSG")
}

fn output_file(dir: &Path, day: NaiveDate) -> PathBuf {
    dir.join(format!("{}_lsasaf_msg_frppixel.geojson", day.format("%Y-%m-%d")))
}

fn slot_stem(slot: NaiveDateTime) -> String {
    format!(
        "LSASAF_MSG_FRP-PIXEL-ListProduct_MSG-Disk_{}",
        slot.format("%Y%m%d%H%M")
    )
}

fn slot_url(base_url: &str, slot: NaiveDateTime, extension: &str) -> String {
    format!(
        "{}/{}/{}.{}",
        base_url.trim_end_matches('/'),
        slot.format("%Y/%m/%d"),
        slot_stem(slot),
        extension
    )
}

/// Slot start times of the window. A start that is not on the slot grid
/// produces names the mirror does not have.
pub fn slots(config: &LsaSafConfig, window: &TimeWindow) -> Vec<NaiveDateTime> {
    window.steps(Duration::minutes(i64::from(config.slot_minutes)))
}

/// Every sidecar of every slot, newest slot first like the other providers.
pub fn plan_tasks(base_url: &str, slots: &[NaiveDateTime], download_dir: &Path) -> Vec<DownloadTask> {
    slots
        .iter()
        .rev()
        .flat_map(|slot| {
            let stem = slot_stem(*slot);
            SIDECARS.iter().map(move |extension| {
                DownloadTask::new(
                    &stem,
                    &slot_url(base_url, *slot, extension),
                    download_dir.join(format!("{stem}.{extension}")),
                )
            })
        })
        .collect()
}

fn field_value(value: FieldValue) -> JsonValue {
    match value {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => JsonValue::from(s.trim()),
        FieldValue::Numeric(Some(n)) | FieldValue::Double(n) | FieldValue::Currency(n) => {
            JsonValue::from(n)
        }
        FieldValue::Float(Some(f)) => JsonValue::from(f64::from(f)),
        FieldValue::Integer(i) => JsonValue::from(i),
        FieldValue::Logical(Some(b)) => JsonValue::from(b),
        FieldValue::Date(Some(d)) => {
            JsonValue::from(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
        }
        _ => JsonValue::Null,
    }
}

/// The product calls the radiative power `value`; layers of every provider call it `frp`.
fn slot_feature(point: &Point, fields: HashMap<String, FieldValue>, slot: NaiveDateTime) -> PointFeature {
    let mut properties: JsonObject = fields
        .into_iter()
        .map(|(name, value)| {
            let name = if name == "value" { "frp".to_string() } else { name };
            (name, field_value(value))
        })
        .collect();
    properties.insert(
        "day_time".to_string(),
        JsonValue::from(slot.format(DAY_TIME_FORMAT).to_string()),
    );
    PointFeature {
        lon: point.x,
        lat: point.y,
        properties,
    }
}

/// Points of one slot shapefile inside `bbox`, boundary included.
pub fn read_slot(shp: &Path, bbox: &BoundingBox, slot: NaiveDateTime) -> Result<PointLayer> {
    let shapes = shapefile::read_as::<_, Point, Record>(shp)
        .map_err(|e| anyhow!("Error reading {}: {e}", shp.display()))?;
    let features = shapes
        .into_iter()
        .filter(|(point, _)| bbox.contains(point.x, point.y))
        .map(|(point, record)| slot_feature(&point, record.into(), slot))
        .collect();
    Ok(PointLayer::from_features(features))
}

/// Slot points grouped by day. Every day of `slots` gets an entry, empty when
/// none of its slots had points or could be read.
pub fn merge_days(
    download_dir: &Path,
    slots: &[NaiveDateTime],
    bbox: &BoundingBox,
) -> BTreeMap<NaiveDate, PointLayer> {
    let mut days: BTreeMap<NaiveDate, PointLayer> = BTreeMap::new();
    for slot in slots.iter() {
        let day = days.entry(slot.date()).or_default();
        let shp = download_dir.join(format!("{}.shp", slot_stem(*slot)));
        match read_slot(&shp, bbox, *slot) {
            Ok(layer) if layer.is_empty() => {
                info!(%slot, "No points left after lat-lon filtering");
            }
            Ok(layer) => {
                info!(%slot, points = layer.len(), "Processing slot");
                day.append(layer);
            }
            Err(e) => warn!(%slot, error = %e, "Error processing slot"),
        }
    }
    days
}

/// Download every slot of the window and write one layer per day with points.
/// Returns the number of layers written.
pub async fn fetch_msg_frp_pixels(
    client: &reqwest::Client,
    config: &LsaSafConfig,
    window: &TimeWindow,
    bbox: &BoundingBox,
    output_dir: &Path,
    workers: usize,
) -> Result<usize> {
    let download_dir = output_dir.join("slots");
    fs::create_dir_all(&download_dir)?;

    let slots = slots(config, window);
    info!(slots = slots.len(), "Retrieving MSG FRP-PIXEL slots");
    let plan = DownloadPlan::build(plan_tasks(&config.base_url, &slots, &download_dir));
    let report = plan.execute(&HttpSource::new(client.clone()), workers).await;
    if report.failed > 0 {
        warn!(failed = report.failed, "Some slot files could not be downloaded");
    }

    let mut written = 0;
    for (day, layer) in merge_days(&download_dir, &slots, bbox) {
        if layer.is_empty() {
            info!(%day, "Day had no points");
            continue;
        }
        let path = output_file(output_dir, day);
        layer
            .write_geojson(&path)
            .with_context(|| format!("Error writing {}", path.display()))?;
        info!(path = %path.display(), points = layer.len(), "Saved");
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{self, Response, TestServer};

    fn slot(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").unwrap()
    }

    #[test]
    fn test_slot_url() {
        assert_eq!(
            slot_url(BASE_URL, slot("2024-08-15T09:45"), "shp"),
            "https://mf2.ipma.pt/downloads/data/lsasaf/frp/2024/08/15/LSASAF_MSG_FRP-PIXEL-ListProduct_MSG-Disk_202408150945.shp"
        );
        assert_eq!(
            slot_url("http://mirror/frp/", slot("2024-01-02T00:00"), "dbf"),
            "http://mirror/frp/2024/01/02/LSASAF_MSG_FRP-PIXEL-ListProduct_MSG-Disk_202401020000.dbf"
        );
    }

    #[test]
    fn test_slots_follow_the_repeat_cycle() {
        let window = TimeWindow::parse("2024-08-14T23:00:00", "2024-08-15T00:20:00").unwrap();
        let slots = slots(&LsaSafConfig::default(), &window);
        assert_eq!(slots.len(), 6);
        assert_eq!(slots[5], slot("2024-08-15T00:15"));
    }

    #[test]
    fn test_plan_tasks_fetch_every_sidecar() {
        let slots = vec![slot("2024-08-15T09:30"), slot("2024-08-15T09:45")];
        let tasks = plan_tasks(BASE_URL, &slots, Path::new("/out/slots"));
        assert_eq!(tasks.len(), 8);
        assert_eq!(tasks[0].product, "LSASAF_MSG_FRP-PIXEL-ListProduct_MSG-Disk_202408150945");
        assert!(tasks[0].entry.ends_with("/2024/08/15/LSASAF_MSG_FRP-PIXEL-ListProduct_MSG-Disk_202408150945.shp"));
        assert_eq!(
            tasks[7].output,
            PathBuf::from("/out/slots/LSASAF_MSG_FRP-PIXEL-ListProduct_MSG-Disk_202408150930.prj")
        );
    }

    #[test]
    fn test_field_value() {
        assert_eq!(field_value(FieldValue::Numeric(Some(12.5))), JsonValue::from(12.5));
        assert_eq!(field_value(FieldValue::Character(Some(" MSG4 ".into()))), JsonValue::from("MSG4"));
        assert_eq!(field_value(FieldValue::Integer(3)), JsonValue::from(3));
        assert_eq!(field_value(FieldValue::Character(None)), JsonValue::Null);
        assert_eq!(field_value(FieldValue::Numeric(None)), JsonValue::Null);
    }

    #[test]
    fn test_slot_feature_renames_value_to_frp() {
        let fields = HashMap::from([
            ("value".to_string(), FieldValue::Numeric(Some(42.0))),
            ("confidence".to_string(), FieldValue::Numeric(Some(0.9))),
        ]);
        let feature = slot_feature(&Point::new(23.9, 38.1), fields, slot("2024-08-15T09:45"));
        assert_eq!((feature.lon, feature.lat), (23.9, 38.1));
        assert_eq!(feature.properties["frp"], JsonValue::from(42.0));
        assert!(!feature.properties.contains_key("value"));
        assert_eq!(feature.properties["day_time"], JsonValue::from("2024-08-15 09:45"));
    }

    #[test]
    fn test_merge_days_keeps_days_without_readable_slots() {
        let dir = tempfile::tempdir().unwrap();
        let bbox = BoundingBox::new(23.3, 37.8, 24.5, 38.5).unwrap();
        let slots = vec![slot("2024-08-14T23:45"), slot("2024-08-15T00:00")];

        let days = merge_days(dir.path(), &slots, &bbox);
        let keys: Vec<String> = days.keys().map(|d| d.to_string()).collect();
        assert_eq!(keys, vec!["2024-08-14", "2024-08-15"]);
        assert!(days.values().all(|layer| layer.is_empty()));
    }

    #[tokio::test]
    async fn test_fetch_without_published_slots_writes_nothing() {
        let server = TestServer::start(|_| Response::status(404, "text/html", "not found")).await;
        let dir = tempfile::tempdir().unwrap();
        let config = LsaSafConfig {
            base_url: format!("{}/frp", server.url()),
            ..LsaSafConfig::default()
        };
        let window = TimeWindow::parse("2024-08-15T09:30:00", "2024-08-15T09:45:00").unwrap();
        let bbox = BoundingBox::new(23.3, 37.8, 24.5, 38.5).unwrap();

        let written = fetch_msg_frp_pixels(&test_server::client(), &config, &window, &bbox, dir.path(), 2)
            .await
            .unwrap();
        assert_eq!(written, 0);

        let mut paths: Vec<String> = server.requests().iter().map(|r| r.path().to_string()).collect();
        paths.sort();
        assert_eq!(paths.len(), 8);
        assert_eq!(
            paths[0],
            "/frp/2024/08/15/LSASAF_MSG_FRP-PIXEL-ListProduct_MSG-Disk_202408150930.dbf"
        );
        // nothing half written is left behind
        assert_eq!(fs::read_dir(dir.path().join("slots")).unwrap().count(), 0);
    }
}
