//! Maps `sqlx` failures onto `wallet_coord_core::Error` so the engine never
//! sees a database-specific type.

use wallet_coord_core::Error;

/// Wraps a raw `sqlx::Error` as the engine's opaque storage failure.
pub fn map_sqlx(err: sqlx::Error) -> Error {
    Error::Storage(anyhow::Error::new(err))
}

#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    #[error("failed to connect to postgres at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("migration failed: {0}")]
    Migrate(String),
}
