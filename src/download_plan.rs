use crate::error::DownloadError;
use anyhow::Result;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Body of a remote file, delivered in chunks.
pub type EntryStream = BoxStream<'static, Result<Bytes, DownloadError>>;

/// Anything that can stream the named entry of a product.
pub trait EntrySource {
    async fn open_entry(&self, product: &str, entry: &str) -> Result<EntryStream, DownloadError>;
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct DownloadTask {
    pub product: String,
    pub entry: String,
    pub output: PathBuf,
}

impl DownloadTask {
    pub fn new(product: &str, entry: &str, output: impl Into<PathBuf>) -> Self {
        DownloadTask {
            product: product.to_string(),
            entry: entry.to_string(),
            output: output.into(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadReport {
    pub completed: usize,
    pub failed: usize,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct DownloadPlan {
    tasks: Vec<DownloadTask>,
}

impl DownloadPlan {
    /// Drop tasks whose output already exists or is claimed by an earlier task,
    /// and put the rest oldest first. Providers list their products newest first.
    pub fn build(tasks: Vec<DownloadTask>) -> Self {
        let mut outputs = HashSet::new();
        let mut pending: Vec<DownloadTask> = tasks
            .into_iter()
            .filter(|task| {
                let first = outputs.insert(task.output.clone());
                if !first {
                    warn!(output = %task.output.display(), entry = %task.entry, "Duplicate output, skipping");
                }
                first
            })
            .filter(|task| {
                let exists = task.output.exists();
                if exists {
                    info!(output = %task.output.display(), "Output file already exists, skipping");
                }
                !exists
            })
            .collect();
        pending.reverse();
        Self { tasks: pending }
    }

    pub fn tasks(&self) -> &[DownloadTask] {
        &self.tasks
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let plan: Self = serde_json::from_str(&content)?;
        Ok(plan)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Run all tasks, one at a time when `workers <= 1`, otherwise with at most
    /// `workers` downloads in flight. Failed tasks are logged and counted.
    pub async fn execute(&self, source: &impl EntrySource, workers: usize) -> DownloadReport {
        info!(tasks = self.tasks.len(), workers, "Executing download plan");

        let outcomes: Vec<bool> = if workers <= 1 {
            let mut outcomes = Vec::with_capacity(self.tasks.len());
            for task in self.tasks.iter() {
                outcomes.push(run_task(source, task).await);
            }
            outcomes
        } else {
            stream::iter(self.tasks.iter())
                .map(|task| run_task(source, task))
                .buffer_unordered(workers)
                .collect::<Vec<bool>>()
                .await
        };

        let completed = outcomes.iter().filter(|ok| **ok).count();
        let report = DownloadReport {
            completed,
            failed: outcomes.len() - completed,
        };
        info!(
            completed = report.completed,
            failed = report.failed,
            "Download plan finished"
        );
        report
    }
}

/// Download one task, logging instead of propagating any failure.
pub async fn run_task(source: &impl EntrySource, task: &DownloadTask) -> bool {
    debug!(product = %task.product, entry = %task.entry, "Current task");
    match try_download(source, &task.product, &task.entry, &task.output).await {
        Ok(bytes) => {
            info!(output = %task.output.display(), bytes, "Download finished");
            true
        }
        Err(err @ DownloadError::Product { .. }) => {
            error!(product = %task.product, error = %err, "Error related to the product while trying to download it");
            false
        }
        Err(err @ DownloadError::Connection(_)) => {
            error!(entry = %task.entry, error = %err, "Error related to the connection");
            false
        }
        Err(err) => {
            error!(entry = %task.entry, kind = err.kind(), error = %err, "Unexpected error");
            false
        }
    }
}

/// Stream an entry to `<output>.partial` and move it into place once complete.
pub async fn try_download(
    source: &impl EntrySource,
    product: &str,
    entry: &str,
    output: &Path,
) -> Result<u64, DownloadError> {
    // Make parent directories as necessary
    if let Some(parent_dir) = output.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            fs::create_dir_all(parent_dir)?;
        }
    }

    let partial = partial_path(output);
    let result = stream_to_file(source, product, entry, &partial).await;
    match result {
        Ok(byte_count) => {
            // Rename the file to remove .partial suffix
            fs::rename(&partial, output)?;
            Ok(byte_count)
        }
        Err(err) => {
            if partial.exists() {
                if let Err(e) = fs::remove_file(&partial) {
                    warn!(path = %partial.display(), error = %e, "Unable to remove partial file");
                }
            }
            Err(err)
        }
    }
}

async fn stream_to_file(
    source: &impl EntrySource,
    product: &str,
    entry: &str,
    partial: &Path,
) -> Result<u64, DownloadError> {
    let mut body = source.open_entry(product, entry).await?;
    let mut partial_file = File::create(partial)?;

    let mut byte_count = 0_u64;
    while let Some(bytes) = body.next().await {
        let bytes = bytes?;
        partial_file.write_all(&bytes)?;
        byte_count += bytes.len() as u64;
    }
    partial_file.flush()?;
    Ok(byte_count)
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

/// Final path component of an entry name, which may carry a directory prefix.
pub fn entry_file_name(entry: &str) -> &str {
    entry.rsplit('/').next().unwrap_or(entry)
}
