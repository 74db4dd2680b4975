use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapError {
    #[error("Unable to clone request")]
    Clone,

    #[error("Unable to set request uri {0}")]
    Uri(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid bounding box: {0}")]
    BoundingBox(String),

    #[error("Invalid time '{value}', expected YYYY-MM-DDTHH:MM:SS or YYYY-MM-DD")]
    Time { value: String },

    #[error("Time window ends before it starts: {start} > {end}")]
    TimeWindow { start: String, end: String },

    #[error("Missing credential '{0}' in credentials file")]
    MissingCredential(&'static str),

    #[error("Missing '[{0}]' section in run configuration")]
    MissingSection(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Failure of a single remote file download. The dispatcher logs these by
/// variant and moves on to the next task.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("request error: {0}")]
    Request(String),

    #[error("product '{product}': {message}")]
    Product { product: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    pub fn product(product: &str, message: impl std::fmt::Display) -> Self {
        DownloadError::Product {
            product: product.to_string(),
            message: message.to_string(),
        }
    }

    /// Classify a transport level error. Status errors are attributed to the
    /// product, since the endpoint answered but refused the entry.
    pub fn from_reqwest(product: &str, err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            DownloadError::Connection(err.to_string())
        } else if err.is_status() {
            DownloadError::product(product, err)
        } else {
            DownloadError::Request(err.to_string())
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DownloadError::Connection(_) => "connection",
            DownloadError::Request(_) => "request",
            DownloadError::Product { .. } => "product",
            DownloadError::Io(_) => "io",
        }
    }
}

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("Invalid pattern '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
