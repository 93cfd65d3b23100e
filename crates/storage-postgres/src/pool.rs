//! Connection pool setup and migrations, mirroring the teacher's
//! `db::connection::Database`.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::error::ConnectError;

pub struct PostgresStorage {
    pub(crate) pool: PgPool,
}

impl PostgresStorage {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, ConnectError> {
        info!(url = %database_url, "connecting to postgres");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|source| ConnectError::Connect {
                url: database_url.to_string(),
                source,
            })?;
        info!("postgres connection pool established");
        Ok(Self { pool })
    }

    /// Wraps an already-constructed pool, for callers (tests, embedding
    /// services) that manage their own `PgPool` lifecycle.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the schema migration in order. Runtime-checked, plain-text
    /// SQL files, not the `sqlx::query!` compile-time macro, so building
    /// this crate never requires a live database.
    pub async fn migrate(&self) -> Result<(), ConnectError> {
        info!("running wallet-coordination schema migration");
        let migration = include_str!("../migrations/0001_init.sql");
        sqlx::query(migration)
            .execute(&self.pool)
            .await
            .map_err(|e| ConnectError::Migrate(e.to_string()))?;
        info!("schema migration complete");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
