#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP fetch error: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Vendor not found: {0}")]
    VendorNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
