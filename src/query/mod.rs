//! Query shapes shared by every backend.
//!
//! The engine exposes five shapes: `latest`, `by_district`, `range`,
//! `hourly_average` and `statistics`. Backends never interpret these
//! themselves; they execute the statements produced by [`sql`], which keeps
//! the semantics identical across SQLite, Postgres and TimescaleDB.

pub mod sql;

use crate::observation::ObservedAt;
use serde::{Deserialize, Serialize};

/// Row cap applied to `latest`/`by_district` when the caller gives none.
pub const DEFAULT_LATEST_LIMIT: i64 = 100;

/// Resolve a caller-supplied limit for the descending shapes.
pub fn latest_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(n) if n > 0 => n,
        _ => DEFAULT_LATEST_LIMIT,
    }
}

/// Filter for ascending range scans. Both bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeQuery {
    pub start: Option<ObservedAt>,
    pub end: Option<ObservedAt>,
    /// Case-insensitive membership. Empty means no district filter.
    pub districts: Vec<String>,
    /// Non-positive or absent means unbounded.
    pub limit: Option<i64>,
}

impl RangeQuery {
    pub fn effective_limit(&self) -> Option<i64> {
        self.limit.filter(|n| *n > 0)
    }
}

/// Filter for hourly aggregation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HourlyQuery {
    pub start: Option<ObservedAt>,
    pub end: Option<ObservedAt>,
    pub district: Option<String>,
}

/// One hour bucket. `hour` is the first 13 characters of the canonical
/// timestamp, e.g. `2024-01-01T10`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyAverage {
    pub hour: String,
    pub avg_temp: Option<f64>,
    pub avg_humidity: Option<f64>,
    pub avg_wind_speed: Option<f64>,
}

/// Whole-dataset summary. Every field is `None` on an empty store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub avg_temp: Option<f64>,
    pub avg_humidity: Option<f64>,
    pub avg_wind_speed: Option<f64>,
    pub max_temp: Option<f64>,
    pub min_temp: Option<f64>,
    pub max_humidity: Option<f64>,
    pub min_humidity: Option<f64>,
    pub max_wind_speed: Option<f64>,
    pub min_wind_speed: Option<f64>,
}

impl Statistics {
    /// Column order used by the statistics statement.
    pub const COLUMNS: [&'static str; 9] = [
        "avg_temp",
        "avg_humidity",
        "avg_wind_speed",
        "max_temp",
        "min_temp",
        "max_humidity",
        "min_humidity",
        "max_wind_speed",
        "min_wind_speed",
    ];

    /// Build from values in [`Statistics::COLUMNS`] order.
    pub fn from_columns(values: [Option<f64>; 9]) -> Self {
        let [avg_temp, avg_humidity, avg_wind_speed, max_temp, min_temp, max_humidity, min_humidity, max_wind_speed, min_wind_speed] =
            values;
        Self {
            avg_temp,
            avg_humidity,
            avg_wind_speed,
            max_temp,
            min_temp,
            max_humidity,
            min_humidity,
            max_wind_speed,
            min_wind_speed,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
