//! Observation store contract and its backends.
//!
//! Every backend implements [`ObservationStore`] and [`ObservationQuery`]
//! against the statements rendered by [`crate::query::sql`]. The service picks
//! one implementation at startup via [`connect`] and shares it as
//! `Arc<dyn WeatherStore>`.

pub mod blocking;
pub mod postgres;
pub mod sqlite;
pub mod worker;

use crate::config::{BackendKind, StorageConfig};
use crate::observation::Observation;
use crate::query::{HourlyAverage, HourlyQuery, RangeQuery, Statistics};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use blocking::BlockingSqliteStore;
pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

/// Single error type surfaced by every store and query operation.
///
/// The message carries backend detail and is meant for logs only.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend unreachable, pool exhausted or authentication refused
    #[error("storage connection error: {0}")]
    Connection(String),

    /// Table or column missing/mismatched. Re-running `initialize()` fixes it.
    #[error("storage schema error: {0}")]
    Schema(String),

    /// Any other backend failure, e.g. a constraint unrelated to the key
    #[error("storage backend error: {0}")]
    Backend(String),

    /// The blocking worker pool is gone (shut down or a worker panicked)
    #[error("storage worker unavailable")]
    WorkerUnavailable,
}

impl StorageError {
    /// Short label used in metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Schema(_) => "schema",
            Self::Backend(_) => "backend",
            Self::WorkerUnavailable => "worker_unavailable",
        }
    }
}

const SCHEMA_MARKERS: [&str; 3] = ["no such table", "no such column", "has no column"];

fn looks_like_schema_problem(message: &str) -> bool {
    let lower = message.to_lowercase();
    SCHEMA_MARKERS.iter().any(|marker| lower.contains(marker))
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Configuration(_) => Self::Connection(err.to_string()),
            sqlx::Error::ColumnNotFound(_) => Self::Schema(err.to_string()),
            sqlx::Error::Database(db) => {
                // 42P01 undefined_table, 42703 undefined_column, 28xxx auth
                match db.code().as_deref() {
                    Some("42P01") | Some("42703") => Self::Schema(err.to_string()),
                    Some(code) if code.starts_with("28") => Self::Connection(err.to_string()),
                    _ if looks_like_schema_problem(db.message()) => Self::Schema(err.to_string()),
                    _ => Self::Backend(err.to_string()),
                }
            }
            _ => Self::Backend(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    rusqlite::ErrorCode::CannotOpen
                        | rusqlite::ErrorCode::NotADatabase
                        | rusqlite::ErrorCode::PermissionDenied
                ) =>
            {
                Self::Connection(err.to_string())
            }
            _ if looks_like_schema_problem(&err.to_string()) => Self::Schema(err.to_string()),
            rusqlite::Error::InvalidColumnName(_) => Self::Schema(err.to_string()),
            _ => Self::Backend(err.to_string()),
        }
    }
}

/// Write side of the contract.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Backend family, for logs and metrics
    fn backend(&self) -> BackendKind;

    /// Ensure table and indexes exist. Idempotent and safe to call any time.
    async fn initialize(&self) -> Result<(), StorageError>;

    /// Upsert every record by `(district, date)`, replacing whole rows.
    ///
    /// An empty batch returns `Ok(0)` without touching the backend. On error
    /// the caller must treat the batch as possibly partially applied.
    async fn append_batch(&self, records: &[Observation]) -> Result<usize, StorageError>;
}

/// Read side of the contract. Semantics are identical for every backend.
#[async_trait]
pub trait ObservationQuery: Send + Sync {
    /// Newest first. Non-positive or absent limit means 100.
    async fn latest(&self, limit: Option<i64>) -> Result<Vec<Observation>, StorageError>;

    /// `latest` for one district, matched case-insensitively.
    async fn by_district(
        &self,
        name: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Observation>, StorageError>;

    /// Oldest first with inclusive bounds.
    async fn range(&self, query: &RangeQuery) -> Result<Vec<Observation>, StorageError>;

    /// Hourly means, ascending by bucket, without gap filling.
    async fn hourly_average(&self, query: &HourlyQuery) -> Result<Vec<HourlyAverage>, StorageError>;

    /// Summary over the whole dataset.
    async fn statistics(&self) -> Result<Statistics, StorageError>;
}

/// A full backend: writes and reads.
pub trait WeatherStore: ObservationStore + ObservationQuery {}

impl<T: ObservationStore + ObservationQuery> WeatherStore for T {}

/// Open the backend named in configuration. Does not run `initialize()`.
pub async fn connect(config: &StorageConfig) -> Result<Arc<dyn WeatherStore>, StorageError> {
    let store: Arc<dyn WeatherStore> = match config.backend {
        BackendKind::Sqlite => Arc::new(SqliteStore::connect(config).await?),
        BackendKind::SqliteBlocking => {
            let config = config.clone();
            let store = tokio::task::spawn_blocking(move || BlockingSqliteStore::open(&config))
                .await
                .map_err(|_| StorageError::WorkerUnavailable)??;
            Arc::new(store)
        }
        BackendKind::Postgres | BackendKind::Timescale => {
            Arc::new(PostgresStore::connect(config).await?)
        }
    };

    tracing::info!(backend = %config.backend, "Observation store opened");
    Ok(store)
}
