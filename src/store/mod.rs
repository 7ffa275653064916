/// Durable state: tokens, wallets, wallet-token trades, signals, trades,
/// positions, clusters, cluster members, agent decisions, daily stats.
///
/// Single-writer access over an embedded SQLite database (WAL journal
/// mode so readers aren't blocked by writers), in the manner of this
/// codebase's `database/models.rs` `BadgerDatabase`. Every method here
/// commits before returning; `upsert_*` collapses on the `(mint)` /
/// `(address)` unique keys.
mod agent;
mod clusters;
mod migrations;
mod positions;
mod signals;
mod tokens;
mod trades;
mod wallets;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("schema violated: {0}")]
    SchemaViolation(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = std::path::Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{database_path}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        migrations::run_migrations(&pool).await?;

        tracing::info!(path = database_path, "store connected");
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn connect_in_memory() -> Self {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
