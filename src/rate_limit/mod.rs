//! Fixed-window request limiting per client.
//!
//! A [`RateLimiter`] is built once at startup from [`RateLimitConfig`] and
//! handed to [`middleware::enforce`] as router state. The counting strategy
//! behind it is fixed for the life of the process.

pub mod local;
pub mod middleware;
pub mod shared;

pub use local::LocalCounter;
pub use shared::SharedCounter;

use crate::config::{RateLimitConfig, RateLimitStrategy};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Forward the request; `count` is the client's tally in this window.
    Admit { count: u64 },
    /// The ceiling is reached; drop the request.
    Reject,
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit { .. })
    }
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The counter store could not be reached or answered garbage.
    #[error("rate limit backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for RateLimitError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// A per-client counter over fixed windows.
///
/// `hit` is a conditional increment: a client already at `max` is rejected
/// without moving its count, so concurrent requests can never be admitted
/// past the ceiling.
#[async_trait]
pub trait WindowCounter: Send + Sync {
    fn strategy(&self) -> RateLimitStrategy;

    async fn hit(&self, client: &str, max: u64, window: Duration) -> Result<Decision, RateLimitError>;
}

#[derive(Clone)]
pub struct RateLimiter {
    counter: Arc<dyn WindowCounter>,
    max_requests: u64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(counter: Arc<dyn WindowCounter>, max_requests: u64, window: Duration) -> Self {
        Self {
            counter,
            max_requests,
            window,
        }
    }

    /// Build the limiter described by `config`, or `None` when disabled.
    ///
    /// The local strategy also starts its expiry sweep on the current
    /// runtime. The shared strategy connects to Redis here, so an unreachable
    /// server fails startup.
    pub async fn from_config(config: &RateLimitConfig) -> Result<Option<Self>, RateLimitError> {
        if !config.enabled {
            return Ok(None);
        }

        let window = Duration::from_secs(config.window_seconds);
        let counter: Arc<dyn WindowCounter> = match config.strategy {
            RateLimitStrategy::Local => {
                let local = Arc::new(LocalCounter::new(config.capacity));
                tokio::spawn(Arc::clone(&local).sweep_loop(window));
                local
            }
            RateLimitStrategy::Shared => {
                let url = config.redis_url.as_deref().ok_or_else(|| {
                    RateLimitError::Backend("rate_limit.redis_url is not set".to_string())
                })?;
                Arc::new(SharedCounter::connect(url).await?)
            }
        };

        tracing::info!(
            strategy = %counter.strategy(),
            max_requests = config.max_requests,
            window_seconds = config.window_seconds,
            "Rate limiter enabled"
        );

        Ok(Some(Self::new(counter, config.max_requests, window)))
    }

    pub fn strategy(&self) -> RateLimitStrategy {
        self.counter.strategy()
    }

    /// Count one request from `client`.
    pub async fn check(&self, client: &str) -> Result<Decision, RateLimitError> {
        self.counter
            .hit(client, self.max_requests, self.window)
            .await
    }
}
