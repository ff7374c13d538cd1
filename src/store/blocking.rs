//! Embedded SQLite backend on the blocking rusqlite client.
//!
//! Every call is shipped to a [`WorkerPool`] of dedicated threads, each with
//! its own connection to the same database file. Storage layout is identical
//! to [`super::SqliteStore`], so the two embedded backends can open each
//! other's files.

use super::worker::WorkerPool;
use super::{ObservationQuery, ObservationStore, StorageError};
use crate::config::{BackendKind, StorageConfig};
use crate::observation::{Observation, ObservedAt};
use crate::query::sql::{self, Param, SqlDialect, Statement};
use crate::query::{HourlyAverage, HourlyQuery, RangeQuery, Statistics};
use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OpenFlags, Row};
use std::path::Path;
use std::time::Duration;

const DIALECT: SqlDialect = SqlDialect::Sqlite;

/// Pending jobs allowed per worker before submitters wait
const QUEUE_DEPTH_PER_WORKER: usize = 64;

pub struct BlockingSqliteStore {
    workers: WorkerPool<Connection>,
}

impl BlockingSqliteStore {
    /// Open `storage.blocking_workers` connections and start the pool.
    ///
    /// Blocking: call from `spawn_blocking` or before the runtime starts.
    pub fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        let path = config.sqlite_path.as_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                StorageError::Connection(format!("cannot create {}: {err}", parent.display()))
            })?;
        }

        let size = config.blocking_workers.max(1);
        let connections = (0..size)
            .map(|_| open_connection(path))
            .collect::<Result<Vec<_>, _>>()?;

        let workers = WorkerPool::start("sqlite-worker", connections, size * QUEUE_DEPTH_PER_WORKER)?;
        Ok(Self { workers })
    }

    async fn fetch_observations(&self, statement: Statement) -> Result<Vec<Observation>, StorageError> {
        self.workers
            .run(move |conn| {
                let mut stmt = conn.prepare_cached(&statement.sql)?;
                let rows = stmt.query_map(params_from_iter(to_values(&statement.params)), observation_from_row)?;
                rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
            })
            .await
    }
}

fn open_connection(path: &Path) -> Result<Connection, StorageError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)?;
    conn.busy_timeout(Duration::from_secs(30))?;
    // journal_mode answers with a row
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

fn to_values(params: &[Param]) -> Vec<Value> {
    params
        .iter()
        .map(|param| match param {
            Param::Text(text) => Value::Text(text.clone()),
            Param::Time(at) => Value::Text(at.to_canonical()),
            Param::Int(n) => Value::Integer(*n),
        })
        .collect()
}

fn observation_from_row(row: &Row<'_>) -> rusqlite::Result<Observation> {
    let date: String = row.get("date")?;
    Ok(Observation {
        district: row.get("district")?,
        timestamp: ObservedAt::parse_lenient(&date),
        temperature: row.get("temp")?,
        humidity: row.get("humidity")?,
        wind_speed: row.get("wind_speed")?,
    })
}

#[async_trait]
impl ObservationStore for BlockingSqliteStore {
    fn backend(&self) -> BackendKind {
        BackendKind::SqliteBlocking
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        self.workers
            .run(|conn| {
                for ddl in DIALECT.schema() {
                    conn.execute_batch(ddl)?;
                }
                Ok(())
            })
            .await
    }

    async fn append_batch(&self, records: &[Observation]) -> Result<usize, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }

        let records = records.to_vec();
        self.workers
            .run(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare_cached(&DIALECT.upsert_row())?;
                    for obs in &records {
                        stmt.execute(rusqlite::params![
                            obs.district,
                            obs.timestamp.to_canonical(),
                            obs.temperature,
                            obs.humidity,
                            obs.wind_speed,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(records.len())
            })
            .await
    }
}

#[async_trait]
impl ObservationQuery for BlockingSqliteStore {
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
        self.workers
            .run(move |conn| {
                let mut stmt = conn.prepare_cached(&statement.sql)?;
                let rows = stmt.query_map(params_from_iter(to_values(&statement.params)), |row| {
                    Ok(HourlyAverage {
                        hour: row.get("hour")?,
                        avg_temp: row.get("avg_temp")?,
                        avg_humidity: row.get("avg_humidity")?,
                        avg_wind_speed: row.get("avg_wind_speed")?,
                    })
                })?;
                rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
            })
            .await
    }

    async fn statistics(&self) -> Result<Statistics, StorageError> {
        let statement = sql::statistics(DIALECT);
        self.workers
            .run(move |conn| {
                let values = conn.query_row(&statement.sql, [], |row| {
                    let mut values = [None; 9];
                    for (index, slot) in values.iter_mut().enumerate() {
                        *slot = row.get::<_, Option<f64>>(index)?;
                    }
                    Ok(values)
                })?;
                Ok(Statistics::from_columns(values))
            })
            .await
    }
}
