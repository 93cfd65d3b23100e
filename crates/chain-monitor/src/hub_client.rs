//! HTTP client for the hub's broadcast endpoint — write-authoritative for
//! units, per `spec.md` §4.4/§6. Retry policy mirrors [`crate::explorer_client::ExplorerClient`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use wallet_coord_core::traits::HubClient as HubClientTrait;

use crate::error::{MonitorError, Result};
use crate::explorer_client::RetryConfig;

#[derive(Clone)]
pub struct HubClient {
    base_url: String,
    http: reqwest::Client,
    retry_config: RetryConfig,
}

impl HubClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_retry_config(base_url, RetryConfig::default())
    }

    pub fn with_retry_config(base_url: impl Into<String>, retry_config: RetryConfig) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::builder().timeout(Duration::from_secs(30)).build().unwrap_or_default(),
            retry_config,
        }
    }

    async fn retry_request<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        let mut delay_ms = self.retry_config.initial_delay_ms;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;
                    if !e.is_retryable() || attempt >= self.retry_config.max_retries {
                        return Err(e);
                    }
                    debug!("hub submit failed (attempt {attempt}/{}), retrying in {delay_ms}ms: {e}", self.retry_config.max_retries);
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = ((delay_ms as f64) * self.retry_config.backoff_multiplier) as u64;
                    delay_ms = delay_ms.min(self.retry_config.max_delay_ms);
                }
            }
        }
    }
}

#[async_trait]
impl HubClientTrait for HubClient {
    async fn broadcast_joint(&self, joint: &[u8]) -> wallet_coord_core::error::Result<()> {
        let url = format!("{}/broadcast", self.base_url);
        let body = joint.to_vec();

        self.retry_request(|| async {
            let resp = self.http.post(&url).body(body.clone()).send().await?;
            let status = resp.status();
            if !status.is_success() {
                let message = resp.text().await.unwrap_or_default();
                return Err(MonitorError::NodeApi { endpoint: url.clone(), status: status.as_u16(), message });
            }
            Ok(())
        })
        .await
        .map_err(|e| wallet_coord_core::error::Error::Storage(anyhow::anyhow!(e)))
    }
}
