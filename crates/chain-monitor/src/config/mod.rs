use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Ledger-explorer base URL (env: `EXPLORER_URL`).
    pub explorer_url: String,

    /// Hub base URL, used for broadcast-by-third-party reconciliation
    /// probes (env: `HUB_URL`).
    pub hub_url: String,

    /// Postgres connection string (env: `DATABASE_URL`).
    pub database_url: String,

    /// How often to poll the explorer's event feeds (env:
    /// `POLL_INTERVAL_SECS`).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Max records requested per event page (env: `EVENT_PAGE_LIMIT`).
    #[serde(default = "default_event_page_limit")]
    pub event_page_limit: u32,

    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_event_page_limit() -> u32 {
    200
}

fn default_max_connections() -> u32 {
    5
}

impl MonitorConfig {
    pub fn load() -> std::result::Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;
        cfg.try_deserialize()
    }
}
