//! Sentinel-3 SLSTR Level 2 Fire Radiative Power from the EUMETSAT Data Store,
//! merged into a single point layer over the bounding box.
use crate::bbox::BoundingBox;
use crate::download_plan::{DownloadPlan, DownloadTask};
use crate::eumetsat::{DataStore, Product};
use crate::vector::{property_text, PointLayer};
use crate::window::TimeWindow;
use anyhow::{Context, Result};
use geojson::JsonValue;
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Sentinel3FrpConfig {
    /// SLSTR L2 FRP
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_requested_file")]
    pub requested_file: String,
    /// Preamble lines preceding the table header in the FRP CSV
    #[serde(default = "default_header_lines")]
    pub header_lines: usize,
}

fn default_collection() -> String {
    "EO:EUM:DAT:0417".to_string()
}

fn default_requested_file() -> String {
    "FRP_MWIR1km_standard.csv".to_string()
}

fn default_header_lines() -> usize {
    19
}

impl Default for Sentinel3FrpConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            requested_file: default_requested_file(),
            header_lines: default_header_lines(),
        }
    }
}

pub fn output_dir(output_folder: &Path, run_name: &str) -> PathBuf {
    output_folder
        .join(run_name)
        .join("Satellite_ActiveFires")
        .join("S3_FRP")
}

/// `S3A_SL_2_FRP____<...>.SEN3` + `FRP_MWIR1km_standard.csv` gives
/// `S3A_SL_2_FRP____<...>_FRP_MWIR1km_standard.csv`.
fn target_file_name(product: &Product, requested_file: &str) -> String {
    let stem = product.id.split('.').next().unwrap_or(&product.id);
    format!("{stem}_{requested_file}")
}

pub fn plan_tasks(
    listings: &[(Product, Vec<String>)],
    requested_file: &str,
    download_dir: &Path,
) -> Vec<DownloadTask> {
    listings
        .iter()
        .flat_map(|(product, entries)| {
            entries
                .iter()
                .filter(|entry| entry.contains(requested_file))
                .map(move |entry| {
                    let output = download_dir.join(target_file_name(product, requested_file));
                    DownloadTask::new(&product.id, entry, output)
                })
        })
        .collect()
}

fn csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    files.sort();
    Ok(files)
}

/// Read every FRP CSV of `dir`, keep the points within `bbox` and add the
/// `day_time` property (`day` plus `time` without seconds).
pub fn merge_csv_files(dir: &Path, bbox: &BoundingBox, header_lines: usize) -> Result<PointLayer> {
    let mut merged = PointLayer::default();
    for path in csv_files(dir)? {
        let reader = BufReader::new(File::open(&path)?);
        match PointLayer::from_csv(reader, header_lines, "lon(deg)", "lat(deg)") {
            Ok(mut layer) => {
                layer.retain_within(bbox);
                info!(path = %path.display(), points = layer.len(), "Subset FRP table");
                merged.append(layer);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Unable to read FRP table"),
        }
    }

    merged.derive_property("day_time", |p| {
        let day = property_text(p, "day")?;
        let time = property_text(p, "time")?;
        let hh_mm = time.get(..5)?;
        Some(JsonValue::from(format!("{day} {hh_mm}")))
    });
    Ok(merged)
}

fn layer_file_name(requested_file: &str) -> String {
    let stem = requested_file.split('.').next().unwrap_or(requested_file);
    format!("{stem}.geojson")
}

/// Download the FRP table of every product over the window and bounding box,
/// then write their merged subset. Returns the path of the written layer, if any.
pub async fn fetch_fire_radiative_power(
    store: &DataStore,
    config: &Sentinel3FrpConfig,
    window: &TimeWindow,
    bbox: &BoundingBox,
    download_dir: &Path,
    workers: usize,
) -> Result<Option<PathBuf>> {
    fs::create_dir_all(download_dir)?;

    let collection = store.collection(&config.collection);
    let products = collection.search(window, Some(bbox)).await?;
    info!(collection = %config.collection, count = products.len(), "Found products");

    let mut listings = Vec::with_capacity(products.len());
    for product in products {
        match collection.entries(&product).await {
            Ok(entries) => listings.push((product, entries)),
            Err(e) => error!(%product, error = %e, "Error related to the product"),
        }
    }

    let plan = DownloadPlan::build(plan_tasks(&listings, &config.requested_file, download_dir));
    plan.execute(&collection, workers).await;

    let merged = merge_csv_files(download_dir, bbox, config.header_lines)?;
    if merged.is_empty() {
        info!(dir = %download_dir.display(), "No FRP points within the bounding box");
        return Ok(None);
    }

    let path = download_dir.join(layer_file_name(&config.requested_file));
    merged
        .write_geojson(&path)
        .with_context(|| format!("Error writing {}", path.display()))?;
    info!(path = %path.display(), points = merged.len(), "Layer saved");
    Ok(Some(path))
}
