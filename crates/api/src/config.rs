//! Environment-sourced settings for the HTTP server binary, loaded with the
//! `config` crate the same way `chain-monitor`'s `MonitorConfig` is.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Postgres connection string (env: `DATABASE_URL`).
    pub database_url: String,

    /// Ledger-explorer base URL (env: `EXPLORER_URL`), the same
    /// `chain-monitor` adapter talks to.
    pub explorer_url: String,

    /// Hub base URL for broadcasting signed joints (env: `HUB_URL`).
    pub hub_url: String,

    /// Bind address (env: `API_HOST`).
    #[serde(default = "default_host")]
    pub api_host: String,

    /// Bind port (env: `API_PORT`).
    #[serde(default = "default_port")]
    pub api_port: u16,

    /// Whether to send permissive CORS headers (env: `ENABLE_CORS`).
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub db_min_connections: u32,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3232
}

fn default_true() -> bool {
    true
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

impl ServerSettings {
    pub fn load() -> std::result::Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;
        cfg.try_deserialize()
    }
}
