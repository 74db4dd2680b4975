use crate::download_plan::{EntrySource, EntryStream};
use crate::error::DownloadError;
use futures_util::{StreamExt, TryStreamExt};

/// Downloads of entries that are plain URLs, optionally authorised with a
/// bearer token (Earthdata Login).
pub struct HttpSource {
    client: reqwest::Client,
    bearer: Option<String>,
}

impl HttpSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            bearer: None,
        }
    }

    pub fn with_bearer(client: reqwest::Client, token: &str) -> Self {
        Self {
            client,
            bearer: Some(token.to_string()),
        }
    }
}

impl EntrySource for HttpSource {
    async fn open_entry(&self, product: &str, entry: &str) -> Result<EntryStream, DownloadError> {
        let mut request = self.client.get(entry);
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }
        let response = request
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{self, Response, TestServer};

    #[tokio::test]
    async fn test_bearer_and_status_classification() {
        let server = TestServer::start(|request| match request.header("authorization") {
            Some("Bearer edl-token") if request.path() == "/B04.tif" => {
                Response::status(200, "image/tiff", "tiff")
            }
            Some(_) => Response::status(404, "text/plain", "not found"),
            None => Response::status(401, "text/plain", "login required"),
        })
        .await;

        let source = HttpSource::with_bearer(test_server::client(), "edl-token");
        let mut body = source
            .open_entry("G", &format!("{}/B04.tif", server.url()))
            .await
            .unwrap();
        assert_eq!(body.next().await.unwrap().unwrap().as_ref(), b"tiff");

        let err = source
            .open_entry("G", &format!("{}/B05.tif", server.url()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), "product");

        let anonymous = HttpSource::new(test_server::client());
        let err = anonymous
            .open_entry("G", &format!("{}/B04.tif", server.url()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), "product");
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_connection_error() {
        let url = test_server::closed_url().await;
        let source = HttpSource::new(test_server::client());
        let err = source
            .open_entry("G", &format!("{url}/B04.tif"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), "connection");
    }
}
