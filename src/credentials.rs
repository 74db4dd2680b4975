use crate::error::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Provider secrets, read from a TOML file kept out of version control.
/// Each pipeline only asks for the keys it needs.
#[derive(Deserialize, Default)]
pub struct Credentials {
    /// https://firms.modaps.eosdis.nasa.gov/api/map_key
    firms_map_key: Option<String>,
    /// Earthdata Login user token
    earthdata_token: Option<String>,
    /// https://api.eumetsat.int/api-key/
    eumdac_consumer_key: Option<String>,
    eumdac_consumer_secret: Option<String>,
    s3_endpoint: Option<String>,
    s3_access_key: Option<String>,
    s3_secret_key: Option<String>,
    s3_bucket_name: Option<String>,
    /// Named AWS profile used instead of the static S3 keys
    s3_profile: Option<String>,
}

fn require<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingCredential(name))
}

impl Credentials {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn firms_map_key(&self) -> Result<&str, ConfigError> {
        require(&self.firms_map_key, "firms_map_key")
    }

    pub fn earthdata_token(&self) -> Result<&str, ConfigError> {
        require(&self.earthdata_token, "earthdata_token")
    }

    pub fn eumdac_consumer(&self) -> Result<(&str, &str), ConfigError> {
        Ok((
            require(&self.eumdac_consumer_key, "eumdac_consumer_key")?,
            require(&self.eumdac_consumer_secret, "eumdac_consumer_secret")?,
        ))
    }

    pub fn s3_bucket_name(&self) -> Result<&str, ConfigError> {
        require(&self.s3_bucket_name, "s3_bucket_name")
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.s3_endpoint.as_deref()
    }

    pub fn s3_keys(&self) -> Result<(&str, &str), ConfigError> {
        Ok((
            require(&self.s3_access_key, "s3_access_key")?,
            require(&self.s3_secret_key, "s3_secret_key")?,
        ))
    }

    pub fn s3_profile(&self) -> Option<&str> {
        self.s3_profile.as_deref()
    }
}
