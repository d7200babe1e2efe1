/// HTTP fetcher. GETs script sources for downloads and update checks.
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use plugdeck_core::Fetcher;
use plugdeck_logging::redact_url;
use reqwest::Client;
use tracing::debug;

const USER_AGENT: &str = concat!("plugdeck/", env!("CARGO_PKG_VERSION"));

pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http })
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    /// Non-2xx responses are errors, like network failures.
    async fn fetch(&self, url: &str) -> Result<String> {
        debug!(url = %redact_url(url), "Fetching script source");
        let body = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}
