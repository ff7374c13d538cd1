//! SQL statement planner.
//!
//! Renders every query shape and the schema for one [`SqlDialect`]. Only
//! placeholders and the hour-bucket expression differ between dialects; the
//! filter logic, ordering and limits are written once here.

use super::{latest_limit, HourlyQuery, RangeQuery};
use crate::observation::ObservedAt;

pub const TABLE: &str = "weather";
pub const COLUMNS: &str = "district, date, temp, humidity, wind_speed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Sqlite,
    Postgres,
    Timescale,
}

/// Bound parameter. Backends decide how a timestamp is encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Text(String),
    Time(ObservedAt),
    Int(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
}

impl SqlDialect {
    fn placeholder(self, index: usize) -> String {
        match self {
            SqlDialect::Sqlite => "?".to_string(),
            SqlDialect::Postgres | SqlDialect::Timescale => format!("${index}"),
        }
    }

    /// Expression truncating `date` to `YYYY-MM-DDTHH`.
    fn hour_bucket(self) -> &'static str {
        match self {
            SqlDialect::Sqlite => "substr(date, 1, 13)",
            SqlDialect::Postgres => "to_char(date, 'YYYY-MM-DD\"T\"HH24')",
            SqlDialect::Timescale => {
                "to_char(time_bucket(INTERVAL '1 hour', date), 'YYYY-MM-DD\"T\"HH24')"
            }
        }
    }

    /// Idempotent DDL, executed in order by `initialize()`.
    pub fn schema(self) -> Vec<&'static str> {
        match self {
            SqlDialect::Sqlite => vec![
                "CREATE TABLE IF NOT EXISTS weather (
                    district TEXT NOT NULL,
                    date TEXT NOT NULL,
                    temp REAL,
                    humidity REAL,
                    wind_speed REAL,
                    PRIMARY KEY (district, date)
                )",
                "CREATE INDEX IF NOT EXISTS idx_weather_date ON weather (date DESC)",
            ],
            SqlDialect::Postgres => vec![PG_TABLE, PG_INDEX],
            SqlDialect::Timescale => vec![
                "CREATE EXTENSION IF NOT EXISTS timescaledb",
                PG_TABLE,
                "SELECT create_hypertable('weather', 'date', if_not_exists => TRUE, migrate_data => TRUE)",
                PG_INDEX,
            ],
        }
    }

    /// Single-row upsert with five placeholders in [`COLUMNS`] order.
    pub fn upsert_row(self) -> String {
        let values = (1..=5)
            .map(|i| self.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} VALUES ({}) {}", UPSERT_HEAD, values, UPSERT_TAIL)
    }
}

const PG_TABLE: &str = "CREATE TABLE IF NOT EXISTS weather (
    district TEXT NOT NULL,
    date TIMESTAMP NOT NULL,
    temp DOUBLE PRECISION,
    humidity DOUBLE PRECISION,
    wind_speed DOUBLE PRECISION,
    PRIMARY KEY (district, date)
)";

const PG_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_weather_date ON weather (date DESC)";

/// Leading part of an upsert, before the VALUES list.
pub const UPSERT_HEAD: &str = "INSERT INTO weather (district, date, temp, humidity, wind_speed)";

/// Conflict clause. The whole row is replaced on an identical key.
pub const UPSERT_TAIL: &str = "ON CONFLICT (district, date) DO UPDATE SET \
    temp = excluded.temp, humidity = excluded.humidity, wind_speed = excluded.wind_speed";

struct Planner {
    dialect: SqlDialect,
    conditions: Vec<String>,
    params: Vec<Param>,
}

impl Planner {
    fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            conditions: Vec::new(),
            params: Vec::new(),
        }
    }

    fn bind(&mut self, param: Param) -> String {
        self.params.push(param);
        self.dialect.placeholder(self.params.len())
    }

    fn time_bounds(&mut self, start: Option<ObservedAt>, end: Option<ObservedAt>) {
        if let Some(start) = start {
            let p = self.bind(Param::Time(start));
            self.conditions.push(format!("date >= {p}"));
        }
        if let Some(end) = end {
            let p = self.bind(Param::Time(end));
            self.conditions.push(format!("date <= {p}"));
        }
    }

    fn district(&mut self, name: &str) {
        let p = self.bind(Param::Text(name.to_string()));
        self.conditions.push(format!("LOWER(district) = LOWER({p})"));
    }

    fn districts(&mut self, names: &[String]) {
        match names {
            [] => {}
            [single] => self.district(single),
            many => {
                let placeholders = many
                    .iter()
                    .map(|name| format!("LOWER({})", self.bind(Param::Text(name.clone()))))
                    .collect::<Vec<_>>()
                    .join(", ");
                self.conditions
                    .push(format!("LOWER(district) IN ({placeholders})"));
            }
        }
    }

    fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    fn limit(&mut self, limit: i64) -> String {
        let p = self.bind(Param::Int(limit));
        format!(" LIMIT {p}")
    }

    fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            params: self.params,
        }
    }
}

/// Newest first, at most `limit` rows (default 100).
pub fn latest(dialect: SqlDialect, limit: Option<i64>) -> Statement {
    descending(dialect, None, limit)
}

/// `latest`, restricted to one district (case-insensitive).
pub fn by_district(dialect: SqlDialect, name: &str, limit: Option<i64>) -> Statement {
    descending(dialect, Some(name), limit)
}

fn descending(dialect: SqlDialect, district: Option<&str>, limit: Option<i64>) -> Statement {
    let mut planner = Planner::new(dialect);
    if let Some(name) = district {
        planner.district(name);
    }
    let filter = planner.where_clause();
    let limit = planner.limit(latest_limit(limit));
    let sql = format!("SELECT {COLUMNS} FROM {TABLE}{filter} ORDER BY date DESC, district{limit}");
    planner.finish(sql)
}

/// Oldest first, inclusive bounds, optional district set and limit.
pub fn range(dialect: SqlDialect, query: &RangeQuery) -> Statement {
    let mut planner = Planner::new(dialect);
    planner.time_bounds(query.start, query.end);
    planner.districts(&query.districts);
    let filter = planner.where_clause();
    let limit = query
        .effective_limit()
        .map(|n| planner.limit(n))
        .unwrap_or_default();
    let sql = format!("SELECT {COLUMNS} FROM {TABLE}{filter} ORDER BY date, district{limit}");
    planner.finish(sql)
}

/// Per-hour means; empty hours produce no row.
pub fn hourly_average(dialect: SqlDialect, query: &HourlyQuery) -> Statement {
    let mut planner = Planner::new(dialect);
    planner.time_bounds(query.start, query.end);
    if let Some(name) = &query.district {
        planner.district(name);
    }
    let filter = planner.where_clause();
    let sql = format!(
        "SELECT {} AS hour, AVG(temp) AS avg_temp, AVG(humidity) AS avg_humidity, \
         AVG(wind_speed) AS avg_wind_speed FROM {TABLE}{filter} GROUP BY hour ORDER BY hour",
        dialect.hour_bucket()
    );
    planner.finish(sql)
}

/// Nine-column summary over the whole table.
pub fn statistics(dialect: SqlDialect) -> Statement {
    Planner::new(dialect).finish(format!(
        "SELECT AVG(temp) AS avg_temp, AVG(humidity) AS avg_humidity, AVG(wind_speed) AS avg_wind_speed, \
         MAX(temp) AS max_temp, MIN(temp) AS min_temp, \
         MAX(humidity) AS max_humidity, MIN(humidity) AS min_humidity, \
         MAX(wind_speed) AS max_wind_speed, MIN(wind_speed) AS min_wind_speed \
         FROM {TABLE}"
    ))
}
