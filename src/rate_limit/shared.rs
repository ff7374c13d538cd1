//! Redis-backed counter shared by every instance behind a load balancer.

use super::{Decision, RateLimitError, WindowCounter};
use crate::config::RateLimitStrategy;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use std::time::Duration;

const KEY_PREFIX: &str = "rl:";

/// Compare, increment and arm the expiry in one server-side step.
///
/// Returns the new count, or -1 when the ceiling was already reached. The
/// expiry is attached only when the window opens, so it is never refreshed.
const HIT_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current >= tonumber(ARGV[1]) then
  return -1
end
current = redis.call('INCR', KEYS[1])
if current == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return current
"#;

pub struct SharedCounter {
    conn: ConnectionManager,
    script: Script,
}

impl SharedCounter {
    /// Open a managed connection to `url`. Reconnects happen inside the
    /// manager; a server that is down at call time surfaces as
    /// [`RateLimitError::Backend`].
    pub async fn connect(url: &str) -> Result<Self, RateLimitError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            script: Script::new(HIT_SCRIPT),
        })
    }

    fn key(client: &str) -> String {
        format!("{KEY_PREFIX}{client}")
    }
}

#[async_trait]
impl WindowCounter for SharedCounter {
    fn strategy(&self) -> RateLimitStrategy {
        RateLimitStrategy::Shared
    }

    async fn hit(&self, client: &str, max: u64, window: Duration) -> Result<Decision, RateLimitError> {
        let mut conn = self.conn.clone();
        let window_ms = window.as_millis().max(1) as u64;

        let count: i64 = self
            .script
            .key(Self::key(client))
            .arg(max)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;

        if count < 0 {
            Ok(Decision::Reject)
        } else {
            Ok(Decision::Admit { count: count as u64 })
        }
    }
}
