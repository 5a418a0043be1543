use async_trait::async_trait;
use std::time::{Duration, Instant};

use crate::config::FetcherConfig;
use crate::{AppError, Result};

/// Network access for one target page. No retries: a failed target is picked
/// up again by the next cycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .user_agent(config.user_agent.clone())
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let start_time = Instant::now();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::network(url, describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::network(url, format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::network(url, describe(&e)))?;

        tracing::debug!(
            url,
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(body)
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}
