use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Storage backend family, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Embedded SQLite through the async sqlx driver
    #[default]
    Sqlite,
    /// Embedded SQLite through rusqlite on dedicated worker threads
    SqliteBlocking,
    Postgres,
    Timescale,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sqlite => "sqlite",
            Self::SqliteBlocking => "sqlite-blocking",
            Self::Postgres => "postgres",
            Self::Timescale => "timescale",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// Database file for the embedded backends
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
    /// Connection URL for postgres/timescale
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_seconds")]
    pub acquire_timeout_seconds: u64,
    /// Worker threads for the blocking backend
    #[serde(default = "default_blocking_workers")]
    pub blocking_workers: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            sqlite_path: default_sqlite_path(),
            database_url: None,
            max_connections: default_max_connections(),
            acquire_timeout_seconds: default_acquire_timeout_seconds(),
            blocking_workers: default_blocking_workers(),
        }
    }
}

/// Counting strategy for the rate limiter, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitStrategy {
    /// In-process bounded cache
    #[default]
    Local,
    /// Redis counter shared between processes
    Shared,
}

impl fmt::Display for RateLimitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Shared => f.write_str("shared"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default)]
    pub strategy: RateLimitStrategy,
    /// Maximum tracked clients for the local strategy
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub redis_url: Option<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
            strategy: RateLimitStrategy::default(),
            capacity: default_capacity(),
            redis_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Accepted `X-API-Key` values. Empty disables authentication.
    #[serde(default)]
    pub api_keys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("weather.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_seconds() -> u64 {
    30
}

fn default_blocking_workers() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_max_requests() -> u64 {
    100
}

fn default_window_seconds() -> u64 {
    60
}

fn default_capacity() -> usize {
    10_000
}

/// Load configuration from an optional TOML file, overridden by environment
/// variables such as `WEATHER_STORAGE__BACKEND` (`__` separates sections).
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    load_with_env(path, environment())
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("WEATHER")
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("auth.api_keys")
        .try_parsing(true)
}

fn load_with_env(path: &Path, env: config::Environment) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(env)
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    match cfg.storage.backend {
        BackendKind::Postgres | BackendKind::Timescale => {
            if cfg.storage.database_url.as_deref().unwrap_or("").is_empty() {
                anyhow::bail!(
                    "storage.database_url is required for the {} backend",
                    cfg.storage.backend
                );
            }
        }
        BackendKind::Sqlite | BackendKind::SqliteBlocking => {
            if cfg.storage.sqlite_path.as_os_str().is_empty() {
                anyhow::bail!("storage.sqlite_path cannot be empty");
            }
        }
    }

    if cfg.storage.max_connections == 0 {
        anyhow::bail!("storage.max_connections must be greater than 0");
    }

    if cfg.storage.backend == BackendKind::SqliteBlocking && cfg.storage.blocking_workers == 0 {
        anyhow::bail!("storage.blocking_workers must be greater than 0");
    }

    if cfg.rate_limit.enabled {
        if cfg.rate_limit.max_requests == 0 {
            anyhow::bail!("rate_limit.max_requests must be greater than 0");
        }
        if cfg.rate_limit.window_seconds == 0 {
            anyhow::bail!("rate_limit.window_seconds must be greater than 0");
        }
        match cfg.rate_limit.strategy {
            RateLimitStrategy::Local if cfg.rate_limit.capacity == 0 => {
                anyhow::bail!("rate_limit.capacity must be greater than 0");
            }
            RateLimitStrategy::Shared
                if cfg.rate_limit.redis_url.as_deref().unwrap_or("").is_empty() =>
            {
                anyhow::bail!("rate_limit.redis_url is required for the shared strategy");
            }
            _ => {}
        }
    }

    if cfg.auth.api_keys.iter().any(|key| key.trim().is_empty()) {
        anyhow::bail!("auth.api_keys cannot contain empty keys");
    }

    if !matches!(cfg.server.log_format.as_str(), "text" | "json") {
        anyhow::bail!("server.log_format must be \"text\" or \"json\"");
    }

    Ok(())
}
