use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::LocatorSection;

use super::error::{LocateError, LocateResult};

/// Retrieves the HTML of a page. Transport concerns (proxying, headers,
/// timeouts) live behind this seam.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> LocateResult<String>;
}

/// Fetches pages through a scraping proxy that takes the target as a query
/// parameter: `GET {endpoint}?api_key=..&url=..`.
#[derive(Debug, Clone)]
pub struct ProxyPageFetcher {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl ProxyPageFetcher {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> LocateResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &LocatorSection) -> LocateResult<Self> {
        Self::new(
            config.proxy_endpoint.clone(),
            config.api_key.clone(),
            &config.user_agent,
            config.timeout(),
        )
    }
}

#[async_trait]
impl PageFetcher for ProxyPageFetcher {
    async fn fetch(&self, url: &str) -> LocateResult<String> {
        debug!(endpoint = %self.endpoint, target = %url, "fetching page through proxy");
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("api_key", self.api_key.as_str()), ("url", url)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LocateError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }
}
