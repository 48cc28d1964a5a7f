use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT_LANGUAGE, USER_AGENT};
use std::time::Duration;

use super::{DESKTOP_USER_AGENT, PageFetcher, RawPage, checked_page, classify_status};
use crate::error::FetchError;

/// Plain HTTP fetcher.
///
/// Cheaper than a browser session but more likely to be challenged. Useful
/// for marketplaces or mirrors that serve static markup.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<RawPage, FetchError> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, DESKTOP_USER_AGENT)
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        if let Some(kind) = classify_status(status) {
            return Err(FetchError::new(kind, format!("HTTP {} for {}", status, url)));
        }

        let final_url = response.url().to_string();
        let html = response.text().await.map_err(classify_reqwest_error)?;

        checked_page(html, final_url)
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::timeout(e.to_string())
    } else if e.is_connect() || e.is_request() || e.is_body() {
        FetchError::network(e.to_string())
    } else {
        FetchError::unknown(e.to_string())
    }
}
