use std::time::Duration;

use reqwest::Client;

use crate::error::Result;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP fetcher for vendor ICS feeds
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vendor-availability/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Fetch the raw feed body. Bytes are handed to the parser unmodified.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!(url, "Fetching calendar feed");

        let response = self.client.get(url).send().await?;
        let body = response.error_for_status()?.bytes().await?;

        tracing::debug!(url, bytes = body.len(), "Fetched calendar feed");
        Ok(body.to_vec())
    }
}
