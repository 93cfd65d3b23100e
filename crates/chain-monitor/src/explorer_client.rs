//! HTTP client for the ledger explorer: read-authoritative over UTXOs,
//! balances, history and activity (`spec.md` §4.6, §6), plus the two
//! cursor-paged event feeds the monitor polls (`new_joint`,
//! `mci_became_stable`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use wallet_coord_core::traits::{Balance, Explorer, ExplorerUtxo, HistoryEntry, LedgerTransaction};

use crate::error::{MonitorError, Result};
use crate::models::events::{AssetCandidateRecord, EventPage, NewJointRecord, StableUnitRecord};

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Clone)]
pub struct ExplorerClient {
    base_url: String,
    http: reqwest::Client,
    retry_config: RetryConfig,
}

#[derive(Debug, Deserialize)]
struct WireUtxo {
    unit: String,
    message_index: u32,
    output_index: u32,
    address: String,
    amount: u64,
    asset: Option<String>,
    stable: bool,
    time: DateTime<Utc>,
}

fn decode_unit(field: &str, hex_unit: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_unit).map_err(|_| MonitorError::MissingField {
        field: field.to_string(),
        context: "unit is not valid hex".to_string(),
    })?;
    bytes.try_into().map_err(|_| MonitorError::MissingField {
        field: field.to_string(),
        context: "unit must be exactly 32 bytes".to_string(),
    })
}

impl TryFrom<WireUtxo> for ExplorerUtxo {
    type Error = MonitorError;

    fn try_from(w: WireUtxo) -> Result<Self> {
        Ok(ExplorerUtxo {
            utxo: wallet_coord_core::model::proposal::UtxoRef {
                unit: decode_unit("unit", &w.unit)?,
                message_index: w.message_index,
                output_index: w.output_index,
            },
            address: w.address,
            amount: w.amount,
            asset: w.asset,
            stable: w.stable,
            time: w.time,
        })
    }
}

impl ExplorerClient {
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
                        match e.log_level() {
                            tracing::Level::ERROR => tracing::error!("request failed after {attempt} attempts: {e}"),
                            tracing::Level::WARN => tracing::warn!("request failed after {attempt} attempts: {e}"),
                            _ => tracing::info!("request failed after {attempt} attempts: {e}"),
                        }
                        return Err(e);
                    }
                    debug!("request failed (attempt {attempt}/{}), retrying in {delay_ms}ms: {e}", self.retry_config.max_retries);
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = ((delay_ms as f64) * self.retry_config.backoff_multiplier) as u64;
                    delay_ms = delay_ms.min(self.retry_config.max_delay_ms);
                }
            }
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path_and_query: &str) -> Result<T> {
        let url = format!("{}{path_and_query}", self.base_url);
        self.retry_request(|| async {
            let resp = self.http.get(&url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                let message = resp.text().await.unwrap_or_default();
                return Err(MonitorError::NodeApi {
                    endpoint: url.clone(),
                    status: status.as_u16(),
                    message,
                });
            }
            Ok(resp.json::<T>().await?)
        })
        .await
    }

    /// Polls the `new_joint` feed (`spec.md` §4.6) starting after `cursor`.
    pub async fn poll_new_joints(&self, cursor: Option<&str>, limit: u32) -> Result<EventPage<NewJointRecord>> {
        let mut qs = format!("/events/new_joints?limit={limit}");
        if let Some(c) = cursor {
            qs.push_str("&after=");
            qs.push_str(c);
        }
        self.get_json(&qs).await
    }

    /// Polls the `mci_became_stable` feed.
    pub async fn poll_stable_units(&self, cursor: Option<&str>, limit: u32) -> Result<EventPage<StableUnitRecord>> {
        let mut qs = format!("/events/stable_units?limit={limit}");
        if let Some(c) = cursor {
            qs.push_str("&after=");
            qs.push_str(c);
        }
        self.get_json(&qs).await
    }

    /// Polls the trusted asset-registry feed the monitor ingests via
    /// `wallet_coord_core::chain_pipeline::asset_registry`.
    pub async fn poll_asset_candidates(&self, cursor: Option<&str>, limit: u32) -> Result<EventPage<AssetCandidateRecord>> {
        let mut qs = format!("/events/asset_registry?limit={limit}");
        if let Some(c) = cursor {
            qs.push_str("&after=");
            qs.push_str(c);
        }
        self.get_json(&qs).await
    }
}

#[async_trait]
impl Explorer for ExplorerClient {
    async fn get_utxos(&self, addresses: &[String], asset: Option<&str>) -> wallet_coord_core::error::Result<Vec<ExplorerUtxo>> {
        let addr_list = addresses.join(",");
        let mut qs = format!("/utxos?addresses={addr_list}");
        if let Some(a) = asset {
            qs.push_str("&asset=");
            qs.push_str(a);
        }
        let wire: Vec<WireUtxo> = self.get_json(&qs).await.map_err(engine_err)?;
        wire.into_iter().map(|w| ExplorerUtxo::try_from(w).map_err(engine_err)).collect()
    }

    async fn get_balance(&self, addresses: &[String], asset: Option<&str>) -> wallet_coord_core::error::Result<Balance> {
        let addr_list = addresses.join(",");
        let mut qs = format!("/balance?addresses={addr_list}");
        if let Some(a) = asset {
            qs.push_str("&asset=");
            qs.push_str(a);
        }
        #[derive(Deserialize)]
        struct WireBalance {
            stable: u64,
            pending: u64,
            stable_outputs_count: u32,
            pending_outputs_count: u32,
        }
        let w: WireBalance = self.get_json(&qs).await.map_err(engine_err)?;
        Ok(Balance {
            stable: w.stable,
            pending: w.pending,
            stable_outputs_count: w.stable_outputs_count,
            pending_outputs_count: w.pending_outputs_count,
        })
    }

    async fn get_tx_history(
        &self,
        addresses: &[String],
        asset: Option<&str>,
        limit: u32,
        last_row_id: Option<i64>,
    ) -> wallet_coord_core::error::Result<Vec<HistoryEntry>> {
        let addr_list = addresses.join(",");
        let mut qs = format!("/txhistory?addresses={addr_list}&limit={limit}");
        if let Some(a) = asset {
            qs.push_str("&asset=");
            qs.push_str(a);
        }
        if let Some(r) = last_row_id {
            qs.push_str(&format!("&last_row_id={r}"));
        }
        #[derive(Deserialize)]
        struct WireHistoryEntry {
            unit: String,
            row_id: i64,
            amount: i64,
            time: DateTime<Utc>,
        }
        let wire: Vec<WireHistoryEntry> = self.get_json(&qs).await.map_err(engine_err)?;
        wire.into_iter()
            .map(|w| {
                Ok(HistoryEntry {
                    unit: decode_unit("unit", &w.unit).map_err(engine_err)?,
                    row_id: w.row_id,
                    amount: w.amount,
                    time: w.time,
                })
            })
            .collect()
    }

    async fn get_address_activity(&self, address: &str) -> wallet_coord_core::error::Result<bool> {
        #[derive(Deserialize)]
        struct Activity {
            has_activity: bool,
        }
        let a: Activity = self.get_json(&format!("/addresses/{address}/activity")).await.map_err(engine_err)?;
        Ok(a.has_activity)
    }

    async fn get_transaction(&self, unit: [u8; 32]) -> wallet_coord_core::error::Result<Option<LedgerTransaction>> {
        #[derive(Deserialize)]
        struct WireTx {
            unit: String,
            stable: bool,
        }
        let path = format!("/transactions/{}", hex::encode(unit));
        let resp = self.http.get(format!("{}{path}", self.base_url)).send().await.map_err(|e| engine_err(MonitorError::from(e)))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(engine_err(MonitorError::NodeApi {
                endpoint: path,
                status: resp.status().as_u16(),
                message: resp.text().await.unwrap_or_default(),
            }));
        }
        let wire: WireTx = resp.json().await.map_err(|e| engine_err(MonitorError::from(e)))?;
        let unit = decode_unit("unit", &wire.unit).map_err(engine_err)?;
        Ok(Some(LedgerTransaction { unit, stable: wire.stable }))
    }
}

fn engine_err(e: MonitorError) -> wallet_coord_core::error::Error {
    wallet_coord_core::error::Error::Storage(anyhow::anyhow!(e))
}
