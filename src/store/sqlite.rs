//! Embedded SQLite backend on the async sqlx driver.
//!
//! Timestamps are stored as canonical text, which orders lexically in time
//! and makes `substr(date, 1, 13)` the hour bucket.

use super::{ObservationQuery, ObservationStore, StorageError};
use crate::config::{BackendKind, StorageConfig};
use crate::observation::{Observation, ObservedAt};
use crate::query::sql::{self, Param, SqlDialect, Statement};
use crate::query::{HourlyAverage, HourlyQuery, RangeQuery, Statistics};
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{Row, Sqlite};
use std::path::Path;
use std::time::Duration;

const DIALECT: SqlDialect = SqlDialect::Sqlite;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Build a lazily connecting pool on `storage.sqlite_path`.
    ///
    /// No connection is opened until the first operation.
    pub async fn connect(config: &StorageConfig) -> Result<Self, StorageError> {
        ensure_parent_dir(&config.sqlite_path).await?;

        let options = SqliteConnectOptions::new()
            .filename(&config.sqlite_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .pragma("synchronous", "NORMAL");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect_lazy_with(options);

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_observations(&self, statement: Statement) -> Result<Vec<Observation>, StorageError> {
        let rows = bind_params(sqlx::query(&statement.sql), &statement.params)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(observation_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::from)
    }
}

async fn ensure_parent_dir(path: &Path) -> Result<(), StorageError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| StorageError::Connection(format!("cannot create {}: {err}", parent.display()))),
        _ => Ok(()),
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[Param],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            Param::Text(text) => query.bind(text.clone()),
            Param::Time(at) => query.bind(at.to_canonical()),
            Param::Int(n) => query.bind(*n),
        };
    }
    query
}

fn observation_from_row(row: &SqliteRow) -> Result<Observation, sqlx::Error> {
    let date: String = row.try_get("date")?;
    Ok(Observation {
        district: row.try_get("district")?,
        timestamp: ObservedAt::parse_lenient(&date),
        temperature: row.try_get("temp")?,
        humidity: row.try_get("humidity")?,
        wind_speed: row.try_get("wind_speed")?,
    })
}

#[async_trait]
impl ObservationStore for SqliteStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        for ddl in DIALECT.schema() {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        tracing::debug!("SQLite schema ensured");
        Ok(())
    }

    async fn append_batch(&self, records: &[Observation]) -> Result<usize, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }

        let upsert = DIALECT.upsert_row();
        let mut tx = self.pool.begin().await?;

        for obs in records {
            sqlx::query(&upsert)
                .bind(obs.district.as_str())
                .bind(obs.timestamp.to_canonical())
                .bind(obs.temperature)
                .bind(obs.humidity)
                .bind(obs.wind_speed)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(records.len())
    }
}

#[async_trait]
impl ObservationQuery for SqliteStore {
    async fn latest(&self, limit: Option<i64>) -> Result<Vec<Observation>, StorageError> {
        self.fetch_observations(sql::latest(DIALECT, limit)).await
    }

    async fn by_district(
        &self,
        name: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Observation>, StorageError> {
        self.fetch_observations(sql::by_district(DIALECT, name, limit))
            .await
    }

    async fn range(&self, query: &RangeQuery) -> Result<Vec<Observation>, StorageError> {
        self.fetch_observations(sql::range(DIALECT, query)).await
    }

    async fn hourly_average(&self, query: &HourlyQuery) -> Result<Vec<HourlyAverage>, StorageError> {
        let statement = sql::hourly_average(DIALECT, query);
        let rows = bind_params(sqlx::query(&statement.sql), &statement.params)
            .fetch_all(&self.pool)
            .await?;

        let mut buckets = Vec::with_capacity(rows.len());
        for row in rows {
            buckets.push(HourlyAverage {
                hour: row.try_get("hour")?,
                avg_temp: row.try_get("avg_temp")?,
                avg_humidity: row.try_get("avg_humidity")?,
                avg_wind_speed: row.try_get("avg_wind_speed")?,
            });
        }
        Ok(buckets)
    }

    async fn statistics(&self) -> Result<Statistics, StorageError> {
        let statement = sql::statistics(DIALECT);
        let row = sqlx::query(&statement.sql).fetch_one(&self.pool).await?;

        let mut values = [None; 9];
        for (slot, column) in values.iter_mut().zip(Statistics::COLUMNS) {
            *slot = row.try_get::<Option<f64>, _>(column)?;
        }
        Ok(Statistics::from_columns(values))
    }
}
