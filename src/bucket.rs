use crate::download_plan::{DownloadPlan, DownloadReport, DownloadTask, EntrySource, EntryStream};
use crate::entry_filter::GlobPattern;
use crate::error::DownloadError;
use crate::s3::strip_x_id_get_object_param_from_uri;
use anyhow::Result;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::Client;
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct BucketConfig {
    /// Folder prefixes to search, e.g. "folder/subfolder/"
    pub prefixes: Vec<String>,
    /// Wildcard pattern on the object file name
    pub pattern: String,
    pub target_dir: PathBuf,
}

/// An S3 bucket whose objects are addressed by key.
pub struct Bucket {
    client: Client,
    name: String,
}

impl Bucket {
    pub fn new(client: Client, name: &str) -> Self {
        Self {
            client,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All object keys under `prefix`, across result pages.
    pub async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = vec![];
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.name)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(|k| k.to_string())),
            );
        }
        Ok(keys)
    }
}

impl EntrySource for Bucket {
    async fn open_entry(&self, _product: &str, entry: &str) -> Result<EntryStream, DownloadError> {
        let object = self
            .client
            .get_object()
            .bucket(&self.name)
            .key(entry)
            .customize()
            .map_request(strip_x_id_get_object_param_from_uri)
            .send()
            .await
            .map_err(|e| get_object_error(entry, e))?;

        let body = stream::try_unfold(object.body, |mut body| async move {
            match body.try_next().await {
                Ok(Some(bytes)) => Ok(Some((bytes, body))),
                Ok(None) => Ok(None),
                Err(e) => Err(DownloadError::Connection(e.to_string())),
            }
        });
        Ok(body.boxed())
    }
}

/// Transport failures are connection errors, answers of the store are about
/// the object itself.
fn get_object_error(key: &str, err: SdkError<GetObjectError, HttpResponse>) -> DownloadError {
    let message = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => DownloadError::Connection(message),
        SdkError::ServiceError(_) | SdkError::ResponseError(_) => DownloadError::product(key, message),
        _ => DownloadError::Request(message),
    }
}

pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

/// Tasks for the keys under `prefix` whose file name matches `pattern`, mirrored
/// below `target_dir` without the prefix.
pub fn plan_tasks(
    bucket: &str,
    keys: &[String],
    prefix: &str,
    pattern: &GlobPattern,
    target_dir: &Path,
) -> Vec<DownloadTask> {
    keys.iter()
        .filter(|key| !key.ends_with('/'))
        .filter(|key| {
            let file_name = key.rsplit('/').next().unwrap_or(key);
            pattern.matches(file_name)
        })
        .map(|key| {
            let relative = key.strip_prefix(prefix).unwrap_or(key);
            DownloadTask::new(bucket, key, target_dir.join(relative))
        })
        .collect()
}

pub async fn download_from_bucket(
    bucket: &Bucket,
    config: &BucketConfig,
    workers: usize,
) -> Result<DownloadReport> {
    let pattern = GlobPattern::new(&config.pattern)?;
    let mut report = DownloadReport::default();

    for prefix in config.prefixes.iter() {
        let prefix = normalize_prefix(prefix);
        info!(bucket = bucket.name(), %prefix, "Searching");

        let keys = bucket.list_keys(&prefix).await?;
        if keys.is_empty() {
            info!(%prefix, "No files found");
            continue;
        }

        let tasks = plan_tasks(bucket.name(), &keys, &prefix, &pattern, &config.target_dir);
        let r = DownloadPlan::build(tasks).execute(bucket, workers).await;
        report.completed += r.completed;
        report.failed += r.failed;
        info!(%prefix, "All files matching the file pattern processed");
    }
    Ok(report)
}
