use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::info;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Bearer token of the EUMETSAT API, obtained with the consumer key/secret pair.
#[derive(Clone)]
pub struct AccessToken {
    value: String,
    expiration: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: &str, expiration: DateTime<Utc>) -> Self {
        Self {
            value: value.to_string(),
            expiration,
        }
    }

    pub async fn request(
        client: &reqwest::Client,
        token_url: &str,
        key: &str,
        secret: &str,
    ) -> Result<Self> {
        let response: TokenResponse = client
            .post(token_url)
            .basic_auth(key, Some(secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?
            .error_for_status()
            .context("Error when requesting an access token from the EUMETSAT API")?
            .json()
            .await?;

        let token = Self {
            value: response.access_token,
            expiration: Utc::now() + Duration::seconds(response.expires_in),
        };
        info!(expires = %token.expiration, "Obtained EUMETSAT access token");
        Ok(token)
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }

    /// Whether the token is expired or will be within `margin`.
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expiration - Utc::now() <= margin
    }
}

impl std::fmt::Debug for AccessToken {
    // keep the secret out of logs
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}
