//! Harmonized Landsat Sentinel-2 (HLS) surface reflectance from LP DAAC, found
//! through the Earthdata CMR-STAC catalog and downloaded band by band.
use crate::bbox::BoundingBox;
use crate::download_plan::{DownloadPlan, DownloadReport, DownloadTask};
use crate::http::HttpSource;
use crate::window::TimeWindow;
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use stac::{Item, ItemCollection};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const SEARCH_API: &str = "https://cmr.earthdata.nasa.gov/stac/LPCLOUD/search";

/// Items requested from the catalog in one search.
const SEARCH_LIMIT: usize = 250;

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct HlsConfig {
    #[serde(default = "default_search_api")]
    pub search_api: String,
    #[serde(default = "default_collections")]
    pub collections: Vec<String>,
    #[serde(default = "default_composites")]
    pub composites: Vec<Composite>,
}

/// Band triplet of a false color composite, per instrument.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Composite {
    pub name: String,
    pub sentinel2: Vec<String>,
    pub landsat89: Vec<String>,
}

impl Composite {
    pub fn bands(&self, instrument: Instrument) -> &[String] {
        match instrument {
            Instrument::Sentinel2 => &self.sentinel2,
            Instrument::Landsat89 => &self.landsat89,
        }
    }
}

fn default_search_api() -> String {
    SEARCH_API.to_string()
}

fn default_collections() -> Vec<String> {
    vec!["HLSL30_2.0".to_string(), "HLSS30_2.0".to_string()]
}

fn default_composites() -> Vec<Composite> {
    let bands = |b: [&str; 3]| b.iter().map(|s| s.to_string()).collect();
    vec![Composite {
        name: "SWIR-composite".to_string(),
        sentinel2: bands(["B12", "B8A", "B04"]),
        landsat89: bands(["B07", "B05", "B04"]),
    }]
}

impl Default for HlsConfig {
    fn default() -> Self {
        Self {
            search_api: default_search_api(),
            collections: default_collections(),
            composites: default_composites(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instrument {
    Sentinel2,
    Landsat89,
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instrument::Sentinel2 => write!(f, "Sentinel2"),
            Instrument::Landsat89 => write!(f, "Landsat89"),
        }
    }
}

/// An HLS granule, `HLS.<S30|L30>.<tile>.<yyyydddThhmmss>.v2.0`, and its band files.
#[derive(Debug, Clone)]
pub struct Granule {
    pub id: String,
    pub assets: BTreeMap<String, String>,
}

impl Granule {
    pub fn from_item(item: &Item) -> Self {
        let assets = item
            .assets
            .iter()
            .map(|(key, asset)| (key.to_string(), asset.href.to_string()))
            .collect();
        Self {
            id: item.id.clone(),
            assets,
        }
    }

    fn field(&self, index: usize) -> Option<&str> {
        self.id.split('.').nth(index)
    }

    pub fn instrument(&self) -> Option<Instrument> {
        match self.field(1)? {
            "S30" => Some(Instrument::Sentinel2),
            "L30" => Some(Instrument::Landsat89),
            _ => None,
        }
    }

    pub fn tile(&self) -> Option<&str> {
        self.field(2)
    }

    /// Acquisition as `YYYY-MM-DDThhmmss`, converted from the year and day of year.
    pub fn acquisition(&self) -> Option<String> {
        let (date, time) = self.field(3)?.split_once('T')?;
        let year: i32 = date.get(..4)?.parse().ok()?;
        let day_of_year: u32 = date.get(4..)?.parse().ok()?;
        let date = NaiveDate::from_yo_opt(year, day_of_year)?;
        Some(format!("{}T{}", date.format("%Y-%m-%d"), time))
    }
}

pub fn output_dir(output_folder: &Path, run_name: &str) -> PathBuf {
    output_folder
        .join(run_name)
        .join("Satellite_Imagery")
        .join("Landsat-Sentinel2")
}

/// Tasks fetching the bands of every composite for every recognised granule.
/// Granules of unknown instruments or lacking a band are logged and skipped.
pub fn plan_tasks(granules: &[Granule], composites: &[Composite], output_dir: &Path) -> Vec<DownloadTask> {
    let mut tasks = vec![];
    for composite in composites {
        info!(composite = %composite.name, "Generating composite");
        for granule in granules {
            let (Some(instrument), Some(tile), Some(acquisition)) =
                (granule.instrument(), granule.tile(), granule.acquisition())
            else {
                warn!(granule = %granule.id, "Did not recognise granule, skipping");
                continue;
            };

            let bands = composite.bands(instrument);
            let missing: Vec<&String> = bands
                .iter()
                .filter(|b| !granule.assets.contains_key(b.as_str()))
                .collect();
            if !missing.is_empty() {
                warn!(granule = %granule.id, ?missing, "Granule lacks composite bands, skipping");
                continue;
            }

            for band in bands {
                let file_name = format!(
                    "{acquisition}_{}_{instrument}_{tile}_{band}.tif",
                    composite.name
                );
                tasks.push(DownloadTask::new(
                    &granule.id,
                    &granule.assets[band.as_str()],
                    output_dir.join(file_name),
                ));
            }
        }
    }
    tasks
}

/// Where the next page of search results comes from, following the STAC API
/// paging links.
#[derive(Debug, Clone, PartialEq)]
enum PageRequest {
    Get(String),
    Post { href: String, body: JsonValue },
}

#[derive(Deserialize)]
struct PageLinks {
    #[serde(default)]
    links: Vec<PageLink>,
}

#[derive(Deserialize)]
struct PageLink {
    rel: String,
    href: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    body: Option<JsonMap<String, JsonValue>>,
    #[serde(default)]
    merge: bool,
}

/// Request for the page after `previous`, from its `next` link if any. POST
/// links carry their own body, merged over the previous one when asked to.
fn next_page(links: &[PageLink], previous: &PageRequest) -> Option<PageRequest> {
    let link = links.iter().find(|l| l.rel == "next")?;
    let is_post = link
        .method
        .as_deref()
        .is_some_and(|m| m.eq_ignore_ascii_case("POST"));
    if !is_post {
        return Some(PageRequest::Get(link.href.clone()));
    }

    let mut body = match (link.merge, previous) {
        (true, PageRequest::Post { body: JsonValue::Object(previous), .. }) => previous.clone(),
        _ => JsonMap::new(),
    };
    if let Some(extra) = &link.body {
        body.extend(extra.clone());
    }
    Some(PageRequest::Post {
        href: link.href.clone(),
        body: JsonValue::Object(body),
    })
}

/// Every granule matching the query, across result pages.
pub async fn search_granules(
    client: &reqwest::Client,
    config: &HlsConfig,
    window: &TimeWindow,
    bbox: &BoundingBox,
) -> Result<Vec<Granule>> {
    let bbox: [f64; 4] = (*bbox).into();
    let mut request = PageRequest::Post {
        href: config.search_api.clone(),
        body: serde_json::json!({
            "collections": config.collections,
            "bbox": bbox,
            "datetime": window.as_interval(),
            "limit": SEARCH_LIMIT,
        }),
    };

    let mut granules = vec![];
    loop {
        let builder = match &request {
            PageRequest::Get(href) => client.get(href),
            PageRequest::Post { href, body } => client.post(href).json(body),
        };
        let content = builder.send().await?.error_for_status()?.text().await?;
        let item_collection: ItemCollection = serde_json::from_str(&content)?;
        let page: PageLinks = serde_json::from_str(&content)?;

        if item_collection.items.is_empty() {
            break;
        }
        granules.extend(item_collection.items.iter().map(Granule::from_item));
        debug!(received = item_collection.items.len(), total = granules.len(), "Search page");

        match next_page(&page.links, &request) {
            Some(next) if next != request => request = next,
            _ => break,
        }
    }
    Ok(granules)
}

pub async fn fetch_composite_bands(
    config: &HlsConfig,
    token: &str,
    window: &TimeWindow,
    bbox: &BoundingBox,
    output_dir: &Path,
    workers: usize,
) -> Result<DownloadReport> {
    let client = reqwest::Client::new();
    let granules = search_granules(&client, config, window, bbox).await?;
    if granules.is_empty() {
        return Err(anyhow!("No results found for query"));
    }
    info!(results = granules.len(), "Found results for query");

    let plan = DownloadPlan::build(plan_tasks(&granules, &config.composites, output_dir));
    let report = plan.execute(&HttpSource::with_bearer(client, token), workers).await;
    info!("Processing has finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{self, Response, TestServer};
    use std::sync::{Arc, OnceLock};

    const BASE: &str = "https://data.lpdaac.earthdatacloud.nasa.gov/lp-prod-protected";

    fn granule(id: &str, bands: &[&str]) -> Granule {
        let collection = if id.contains(".S30.") { "HLSS30.020" } else { "HLSL30.020" };
        Granule {
            id: id.to_string(),
            assets: bands
                .iter()
                .map(|b| (b.to_string(), format!("{BASE}/{collection}/{id}/{id}.{b}.tif")))
                .collect(),
        }
    }

    fn item_json(id: &str) -> String {
        format!(
            r#"{{"type": "Feature", "stac_version": "1.0.0", "id": "{id}", "geometry": null,
                "properties": {{"datetime": "2024-09-15T11:21:21Z"}}, "links": [],
                "assets": {{"B04": {{"href": "{BASE}/{id}.B04.tif"}}}}}}"#
        )
    }

    fn page_json(ids: &[&str], links: &str) -> String {
        let items: Vec<String> = ids.iter().map(|id| item_json(id)).collect();
        format!(
            r#"{{"type": "FeatureCollection", "features": [{}], "links": [{links}]}}"#,
            items.join(",")
        )
    }

    fn links(json: &str) -> Vec<PageLink> {
        serde_json::from_str::<PageLinks>(json).unwrap().links
    }

    #[test]
    fn test_next_page_get_link() {
        let previous = PageRequest::Get("https://stac/search?page=1".to_string());
        let links = links(r#"{"links": [
            {"rel": "self", "href": "https://stac/search?page=1"},
            {"rel": "next", "href": "https://stac/search?page=2"}
        ]}"#);
        assert_eq!(
            next_page(&links, &previous),
            Some(PageRequest::Get("https://stac/search?page=2".to_string()))
        );
    }

    #[test]
    fn test_next_page_post_link_merges_body() {
        let previous = PageRequest::Post {
            href: "https://stac/search".to_string(),
            body: serde_json::json!({"collections": ["HLSS30_2.0"], "limit": 250}),
        };
        let merged = links(r#"{"links": [
            {"rel": "next", "href": "https://stac/search", "method": "POST", "body": {"page": 2}, "merge": true}
        ]}"#);
        assert_eq!(
            next_page(&merged, &previous),
            Some(PageRequest::Post {
                href: "https://stac/search".to_string(),
                body: serde_json::json!({"collections": ["HLSS30_2.0"], "limit": 250, "page": 2}),
            })
        );

        let replaced = links(r#"{"links": [
            {"rel": "next", "href": "https://stac/search", "method": "POST", "body": {"token": "abc"}}
        ]}"#);
        assert_eq!(
            next_page(&replaced, &previous),
            Some(PageRequest::Post {
                href: "https://stac/search".to_string(),
                body: serde_json::json!({"token": "abc"}),
            })
        );
    }

    #[test]
    fn test_next_page_last_page() {
        let previous = PageRequest::Get("https://stac/search".to_string());
        assert_eq!(next_page(&links(r#"{"links": []}"#), &previous), None);
        assert_eq!(next_page(&links("{}"), &previous), None);
    }

    #[tokio::test]
    async fn test_search_granules_reads_every_page() {
        let base = Arc::new(OnceLock::<String>::new());
        let next_href = base.clone();
        let server = TestServer::start(move |request| {
            let body: JsonValue = serde_json::from_str(&request.body).unwrap_or(JsonValue::Null);
            match body.get("page").and_then(|p| p.as_u64()) {
                None => {
                    let href = next_href.get().cloned().unwrap_or_default();
                    Response::json(page_json(
                        &["HLS.S30.T35TNF.2024260T091559.v2.0", "HLS.L30.T35TNF.2024260T085500.v2.0"],
                        &format!(
                            r#"{{"rel": "next", "href": "{href}/search", "method": "POST", "body": {{"page": 2}}, "merge": true}}"#
                        ),
                    ))
                }
                Some(2) => Response::json(page_json(&["HLS.S30.T35TNF.2024262T090601.v2.0"], "")),
                Some(_) => Response::json(page_json(&[], "")),
            }
        })
        .await;
        base.set(server.url().to_string()).unwrap();

        let config = HlsConfig {
            search_api: format!("{}/search", server.url()),
            ..HlsConfig::default()
        };
        let window = TimeWindow::parse("2024-09-16", "2024-09-18").unwrap();
        let bbox = BoundingBox::new(26.5, 41.7, 27.3, 42.3).unwrap();
        let granules = search_granules(&test_server::client(), &config, &window, &bbox)
            .await
            .unwrap();

        let ids: Vec<&str> = granules.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "HLS.S30.T35TNF.2024260T091559.v2.0",
                "HLS.L30.T35TNF.2024260T085500.v2.0",
                "HLS.S30.T35TNF.2024262T090601.v2.0"
            ]
        );
        assert!(granules[2].assets["B04"].ends_with(".B04.tif"));

        // the second request repeats the query with the page added
        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        let second: JsonValue = serde_json::from_str(&requests[1].body).unwrap();
        assert_eq!(second["page"], 2);
        assert_eq!(second["limit"], 250);
        assert_eq!(second["collections"][0], "HLSL30_2.0");
    }

    #[test]
    fn test_granule_fields() {
        let g = granule("HLS.S30.T29TNE.2024259T112121.v2.0", &[]);
        assert_eq!(g.instrument(), Some(Instrument::Sentinel2));
        assert_eq!(g.tile(), Some("T29TNE"));
        assert_eq!(g.acquisition().unwrap(), "2024-09-15T112121");

        let g = granule("HLS.L30.T29TNE.2024001T110000.v2.0", &[]);
        assert_eq!(g.instrument(), Some(Instrument::Landsat89));
        assert_eq!(g.acquisition().unwrap(), "2024-01-01T110000");

        assert!(granule("HLS.X30.T29TNE.2024001T110000.v2.0", &[]).instrument().is_none());
        assert!(granule("HLS.S30.T29TNE.2023366T110000.v2.0", &[]).acquisition().is_none());
    }

    #[test]
    fn test_plan_tasks() {
        let granules = vec![
            granule("HLS.S30.T29TNE.2024259T112121.v2.0", &["B04", "B8A", "B12", "Fmask"]),
            granule("HLS.L30.T29TNE.2024260T111500.v2.0", &["B04", "B05", "B07"]),
            granule("HLS.L30.T29TPE.2024260T111500.v2.0", &["B04", "B05"]),
            granule("HLS.X30.T29TPE.2024260T111500.v2.0", &["B04"]),
        ];
        let tasks = plan_tasks(&granules, &default_composites(), Path::new("/out"));

        assert_eq!(tasks.len(), 6);
        assert_eq!(
            tasks[0].output,
            PathBuf::from("/out/2024-09-15T112121_SWIR-composite_Sentinel2_T29TNE_B12.tif")
        );
        assert!(tasks[0].entry.ends_with(".B12.tif"));
        assert_eq!(tasks[3].product, "HLS.L30.T29TNE.2024260T111500.v2.0");
        assert!(tasks[3].output.ends_with("2024-09-16T111500_SWIR-composite_Landsat89_T29TNE_B07.tif"));
    }
}
