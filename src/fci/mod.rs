//! Download of MTG/FCI Level 1c chunk files from the EUMETSAT Data Store archive.
pub mod chunks;

use crate::bbox::BoundingBox;
use crate::download_plan::{entry_file_name, DownloadPlan, DownloadReport, DownloadTask};
use crate::entry_filter::EntrySelection;
use crate::eumetsat::{DataStore, Product};
use crate::window::TimeWindow;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// FCI L1c FDHSI and HRFI, 0 degree
pub const DEFAULT_COLLECTIONS: [&str; 2] = ["EO:EUM:DAT:0665", "EO:EUM:DAT:0662"];

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct FciConfig {
    #[serde(default = "default_collections")]
    pub collections: Vec<String>,
    /// Explicit entry patterns. When given they replace the chunk selection
    /// derived from the bounding box.
    #[serde(default)]
    pub coverage: Vec<String>,
}

fn default_collections() -> Vec<String> {
    DEFAULT_COLLECTIONS.iter().map(|c| c.to_string()).collect()
}

impl Default for FciConfig {
    fn default() -> Self {
        Self {
            collections: default_collections(),
            coverage: vec![],
        }
    }
}

pub fn output_dir(output_folder: &Path, run_name: &str) -> PathBuf {
    output_folder.join(run_name).join("fci_l1c_input_data")
}

/// Entry selection for a run: coverage patterns if configured, otherwise the
/// chunks covering `bbox`.
pub fn selection(config: &FciConfig, bbox: &BoundingBox) -> Result<EntrySelection> {
    if !config.coverage.is_empty() {
        return Ok(EntrySelection::coverage(&config.coverage)?);
    }
    let chunk_ids = chunks::chunks_for_bbox(bbox);
    if chunk_ids.is_empty() {
        return Err(anyhow!("Bounding box {bbox} is not visible on the FCI full disk"));
    }
    Ok(EntrySelection::Chunks(chunk_ids))
}

/// One task per selected entry of each product, saved under its file name.
pub fn plan_tasks(
    listings: &[(Product, Vec<String>)],
    selection: &EntrySelection,
    output_dir: &Path,
) -> Vec<DownloadTask> {
    listings
        .iter()
        .flat_map(|(product, entries)| {
            selection.filter(entries).into_iter().map(move |entry| {
                let output = output_dir.join(entry_file_name(&entry));
                DownloadTask::new(&product.id, &entry, output)
            })
        })
        .collect()
}

fn plan_file_name(collection: &str) -> String {
    format!("download_plan_{}.json", collection.replace(':', "-"))
}

/// Search each collection over the window and download the selected entries
/// of every product found. Product level failures are logged and skipped.
pub async fn download_from_archive(
    store: &DataStore,
    config: &FciConfig,
    window: &TimeWindow,
    bbox: &BoundingBox,
    output_dir: &Path,
    workers: usize,
) -> Result<DownloadReport> {
    let selection = selection(config, bbox)?;
    match &selection {
        EntrySelection::Chunks(ids) => info!(chunks = ?ids, "Will be retrieving chunks"),
        EntrySelection::Coverage(patterns) => {
            let patterns: Vec<&str> = patterns.iter().map(|p| p.as_str()).collect();
            info!(?patterns, "Will be retrieving coverage")
        }
    }
    std::fs::create_dir_all(output_dir)?;

    let mut report = DownloadReport::default();
    for collection_id in config.collections.iter() {
        let collection = store.collection(collection_id);
        let products = collection.search(window, None).await?;
        info!(collection = %collection_id, count = products.len(), "Found products");

        let mut listings = Vec::with_capacity(products.len());
        for product in products {
            info!(%product, "Product");
            match collection.entries(&product).await {
                Ok(entries) => listings.push((product, entries)),
                Err(e) => {
                    error!(%product, error = %e, "Error related to the product while listing its entries")
                }
            }
        }

        let plan = DownloadPlan::build(plan_tasks(&listings, &selection, output_dir));
        plan.write(output_dir.join(plan_file_name(collection_id)))?;
        if plan.is_empty() {
            info!(collection = %collection_id, "Nothing to download");
            continue;
        }

        let r = plan.execute(&collection, workers).await;
        report.completed += r.completed;
        report.failed += r.failed;
    }
    Ok(report)
}
