use super::token::AccessToken;
use crate::bbox::BoundingBox;
use crate::download_plan::{EntrySource, EntryStream};
use crate::error::DownloadError;
use crate::window::TimeWindow;
use anyhow::{anyhow, Context, Result};
use chrono::Duration;
use futures_util::{StreamExt, TryStreamExt};
use serde::Deserialize;
use std::fmt;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const API_URL: &str = "https://api.eumetsat.int";

const TOKEN_PATH: &str = "/token";
const SEARCH_PATH: &str = "/data/search-products/1.0.0/os";
const BROWSE_PATH: &str = "/data/browse/1.0.0/collections";
const DOWNLOAD_PATH: &str = "/data/download/1.0.0/collections";

/// Products requested per search page.
const PAGE_SIZE: usize = 100;

/// Tokens this close to expiry are renewed before use.
const REFRESH_MARGIN_SECONDS: i64 = 60;

/// Client of the EUMETSAT Data Store.
pub struct DataStore {
    client: reqwest::Client,
    api_url: String,
    key: String,
    secret: String,
    token: RwLock<AccessToken>,
}

impl DataStore {
    /// Authenticate against the API rooted at `api_url`.
    pub async fn connect(
        client: reqwest::Client,
        api_url: &str,
        key: &str,
        secret: &str,
    ) -> Result<Self> {
        let api_url = api_url.trim_end_matches('/').to_string();
        let token =
            AccessToken::request(&client, &format!("{api_url}{TOKEN_PATH}"), key, secret).await?;
        Ok(Self {
            client,
            api_url,
            key: key.to_string(),
            secret: secret.to_string(),
            token: RwLock::new(token),
        })
    }

    pub async fn from_credentials(key: &str, secret: &str) -> Result<Self> {
        Self::connect(reqwest::Client::new(), API_URL, key, secret).await
    }

    pub fn collection(&self, id: &str) -> Collection<'_> {
        Collection {
            store: self,
            id: id.to_string(),
        }
    }

    /// Current bearer token, renewed once it is about to expire.
    pub async fn bearer(&self) -> Result<String> {
        let margin = Duration::seconds(REFRESH_MARGIN_SECONDS);
        {
            let token = self.token.read().await;
            if !token.expires_within(margin) {
                return Ok(token.as_str().to_string());
            }
        }

        let mut token = self.token.write().await;
        // another task may have renewed it while we waited
        if token.expires_within(margin) {
            info!(expired = %token.expiration(), "Renewing EUMETSAT access token");
            *token = AccessToken::request(
                &self.client,
                &self.url(TOKEN_PATH),
                &self.key,
                &self.secret,
            )
            .await?;
        }
        Ok(token.as_str().to_string())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }
}

/// A Data Store collection, e.g. `EO:EUM:DAT:0665`.
pub struct Collection<'a> {
    store: &'a DataStore,
    id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub collection: String,
    pub id: String,
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[derive(Deserialize)]
struct SearchPage {
    #[serde(default)]
    properties: SearchProperties,
    #[serde(default)]
    features: Vec<SearchFeature>,
}

#[derive(Deserialize, Default)]
struct SearchProperties {
    #[serde(rename = "totalResults", default)]
    total_results: usize,
}

#[derive(Deserialize)]
struct SearchFeature {
    id: String,
}

#[derive(Deserialize)]
struct BrowseProduct {
    properties: BrowseProperties,
}

#[derive(Deserialize)]
struct BrowseProperties {
    links: BrowseLinks,
}

#[derive(Deserialize)]
struct BrowseLinks {
    #[serde(rename = "sip-entries", default)]
    sip_entries: Vec<Link>,
}

#[derive(Deserialize)]
struct Link {
    title: String,
}

impl Collection<'_> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Products of the collection sensed within `window` (and intersecting
    /// `bbox`, if given), newest first as the Data Store lists them.
    pub async fn search(
        &self,
        window: &TimeWindow,
        bbox: Option<&BoundingBox>,
    ) -> Result<Vec<Product>> {
        let mut products: Vec<Product> = vec![];
        let mut start = Some(0);
        while let Some(si) = start {
            let mut query: Vec<(&str, String)> = vec![
                ("format", "json".to_string()),
                ("pi", self.id.clone()),
                ("dtstart", window.start_rfc3339()),
                ("dtend", window.end_rfc3339()),
                ("si", si.to_string()),
                ("c", PAGE_SIZE.to_string()),
            ];
            if let Some(bbox) = bbox {
                query.push(("bbox", bbox.as_query()));
            }

            let content = self
                .store
                .client
                .get(self.store.url(SEARCH_PATH))
                .bearer_auth(self.store.bearer().await?)
                .query(&query)
                .send()
                .await?
                .error_for_status()
                .with_context(|| format!("Error searching collection '{}'", self.id))?
                .text()
                .await?;

            let (total, page) = parse_search_page(&self.id, &content)?;
            debug!(collection = %self.id, total, received = page.len(), "Search page");
            let received = page.len();
            products.extend(page);
            start = next_start(products.len(), received, total);
        }
        info!(collection = %self.id, found = products.len(), "Product search finished");
        Ok(products)
    }

    /// Names of the files making up a product.
    pub async fn entries(&self, product: &Product) -> Result<Vec<String>> {
        let url = format!(
            "{}/{}/products/{}",
            self.store.url(BROWSE_PATH),
            encode(&product.collection),
            encode(&product.id)
        );
        let content = self
            .store
            .client
            .get(url)
            .bearer_auth(self.store.bearer().await?)
            .query(&[("format", "json")])
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("Error reading metadata of product '{product}'"))?
            .text()
            .await?;
        parse_entries(&content)
    }
}

impl EntrySource for Collection<'_> {
    async fn open_entry(&self, product: &str, entry: &str) -> Result<EntryStream, DownloadError> {
        let url = format!(
            "{}/{}/products/{}/entry",
            self.store.url(DOWNLOAD_PATH),
            encode(&self.id),
            encode(product)
        );
        let bearer = self
            .store
            .bearer()
            .await
            .map_err(|e| DownloadError::Request(format!("access token renewal failed: {e:#}")))?;
        let response = self
            .store
            .client
            .get(url)
            .bearer_auth(bearer)
            .query(&[("name", entry)])
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(product, e))?
            .error_for_status()
            .map_err(|e| DownloadError::from_reqwest(product, e))?;

        let product = product.to_string();
        Ok(response
            .bytes_stream()
            .map_err(move |e| DownloadError::from_reqwest(&product, e))
            .boxed())
    }
}

/// Start index of the next search page, or `None` once every result is in or
/// the Data Store stops returning any.
fn next_start(collected: usize, received: usize, total: usize) -> Option<usize> {
    if received == 0 || collected >= total {
        None
    } else {
        Some(collected)
    }
}

fn encode(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

fn parse_search_page(collection: &str, content: &str) -> Result<(usize, Vec<Product>)> {
    let page: SearchPage = serde_json::from_str(content)
        .map_err(|e| anyhow!("Unexpected search response for '{collection}': {e}"))?;
    let products = page
        .features
        .into_iter()
        .map(|f| Product {
            collection: collection.to_string(),
            id: f.id,
        })
        .collect();
    Ok((page.properties.total_results, products))
}

fn parse_entries(content: &str) -> Result<Vec<String>> {
    let product: BrowseProduct = serde_json::from_str(content)?;
    Ok(product
        .properties
        .links
        .sip_entries
        .into_iter()
        .map(|link| link.title)
        .collect())
}
