//! In-process counter for single-instance deployments.

use super::{Decision, RateLimitError, WindowCounter};
use crate::config::RateLimitStrategy;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Fraction of the table evicted at once when no window has expired.
const EVICTION_DIVISOR: usize = 16;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    started: Instant,
}

impl Window {
    fn expired(&self, now: Instant, length: Duration) -> bool {
        now.duration_since(self.started) >= length
    }
}

/// Bounded per-client window table.
///
/// The shard lock held by `DashMap::entry` makes each compare-and-increment
/// atomic for its key. When a new client arrives at capacity, expired windows
/// are dropped first, then the oldest sixteenth of the table, so a flood of
/// distinct clients pays for a full scan only once per batch. The capacity
/// check and the insert are not one step: concurrent new clients can overshoot
/// it by the number in flight.
pub struct LocalCounter {
    windows: DashMap<String, Window>,
    capacity: usize,
}

impl LocalCounter {
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Number of clients currently tracked
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Periodically drop windows that have run out.
    pub async fn sweep_loop(self: std::sync::Arc<Self>, window: Duration) {
        let mut interval = tokio::time::interval(window);

        loop {
            interval.tick().await;

            let before = self.windows.len();
            self.sweep(Instant::now(), window);
            let removed = before.saturating_sub(self.windows.len());
            if removed > 0 {
                tracing::debug!(removed, remaining = self.windows.len(), "Swept expired rate limit windows");
            }
        }
    }

    fn sweep(&self, now: Instant, window: Duration) {
        self.windows.retain(|_, entry| !entry.expired(now, window));
    }

    fn make_room(&self, now: Instant, window: Duration) {
        self.sweep(now, window);
        if self.windows.len() < self.capacity {
            return;
        }

        let mut by_age: Vec<(Instant, String)> = self
            .windows
            .iter()
            .map(|entry| (entry.value().started, entry.key().clone()))
            .collect();

        let batch = (self.capacity / EVICTION_DIVISOR).clamp(1, by_age.len().max(1));
        if by_age.len() > batch {
            by_age.select_nth_unstable(batch - 1);
            by_age.truncate(batch);
        }

        for (_, key) in by_age {
            self.windows.remove(&key);
        }
        tracing::debug!(evicted = batch, capacity = self.capacity, "Rate limit table full");
    }
}

#[async_trait]
impl WindowCounter for LocalCounter {
    fn strategy(&self) -> RateLimitStrategy {
        RateLimitStrategy::Local
    }

    async fn hit(&self, client: &str, max: u64, window: Duration) -> Result<Decision, RateLimitError> {
        let now = Instant::now();

        if !self.windows.contains_key(client) && self.windows.len() >= self.capacity {
            self.make_room(now, window);
        }

        let mut entry = self
            .windows
            .entry(client.to_string())
            .or_insert(Window { count: 0, started: now });

        if entry.expired(now, window) {
            *entry = Window { count: 0, started: now };
        }

        if entry.count >= max {
            return Ok(Decision::Reject);
        }

        entry.count += 1;
        Ok(Decision::Admit { count: entry.count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_then_reset_after_window() {
        let counter = LocalCounter::new(10_000);

        for expected in 1..=100 {
            let decision = counter.hit("1.2.3.4", 100, WINDOW).await.unwrap();
            assert_eq!(decision, Decision::Admit { count: expected });
        }
        assert_eq!(counter.hit("1.2.3.4", 100, WINDOW).await.unwrap(), Decision::Reject);

        tokio::time::advance(WINDOW).await;

        assert_eq!(
            counter.hit("1.2.3.4", 100, WINDOW).await.unwrap(),
            Decision::Admit { count: 1 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_does_not_slide() {
        let counter = LocalCounter::new(16);
        counter.hit("c", 2, WINDOW).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        counter.hit("c", 2, WINDOW).await.unwrap();
        assert_eq!(counter.hit("c", 2, WINDOW).await.unwrap(), Decision::Reject);

        // Anchored at the first hit, not the latest
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(counter.hit("c", 2, WINDOW).await.unwrap().is_admitted());
    }

    #[tokio::test]
    async fn test_clients_are_counted_separately() {
        let counter = LocalCounter::new(16);
        assert!(counter.hit("a", 1, WINDOW).await.unwrap().is_admitted());
        assert!(counter.hit("b", 1, WINDOW).await.unwrap().is_admitted());
        assert_eq!(counter.hit("a", 1, WINDOW).await.unwrap(), Decision::Reject);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest_window() {
        let counter = LocalCounter::new(2);
        counter.hit("first", 1, WINDOW).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        counter.hit("second", 1, WINDOW).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        counter.hit("third", 1, WINDOW).await.unwrap();

        assert_eq!(counter.len(), 2);
        // "first" was evicted, so it starts over
        assert!(counter.hit("first", 1, WINDOW).await.unwrap().is_admitted());
        assert_eq!(counter.hit("third", 1, WINDOW).await.unwrap(), Decision::Reject);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_table_evicts_a_batch_of_oldest() {
        let counter = LocalCounter::new(32);
        for i in 0..32 {
            counter.hit(&format!("c{i}"), 1, WINDOW).await.unwrap();
            tokio::time::advance(Duration::from_millis(10)).await;
        }

        // Two oldest go at once, leaving room for the next client too
        counter.hit("n1", 1, WINDOW).await.unwrap();
        assert_eq!(counter.len(), 31);
        counter.hit("n2", 1, WINDOW).await.unwrap();
        assert_eq!(counter.len(), 32);

        // "c0" was evicted, so it starts over
        assert!(counter.hit("c0", 1, WINDOW).await.unwrap().is_admitted());
        assert_eq!(counter.hit("c4", 1, WINDOW).await.unwrap(), Decision::Reject);
        assert_eq!(counter.hit("c31", 1, WINDOW).await.unwrap(), Decision::Reject);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_prefers_expired_windows() {
        let counter = LocalCounter::new(2);
        counter.hit("stale", 1, Duration::from_secs(5)).await.unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        counter.hit("fresh", 1, Duration::from_secs(5)).await.unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;

        counter.hit("new", 1, Duration::from_secs(5)).await.unwrap();
        assert_eq!(counter.len(), 2);
        assert_eq!(
            counter.hit("fresh", 1, Duration::from_secs(5)).await.unwrap(),
            Decision::Reject
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_loop_drops_expired_windows() {
        let counter = Arc::new(LocalCounter::new(16));
        counter.hit("a", 5, WINDOW).await.unwrap();
        counter.hit("b", 5, WINDOW).await.unwrap();

        let sweeper = tokio::spawn(Arc::clone(&counter).sweep_loop(WINDOW));
        tokio::time::sleep(WINDOW + Duration::from_secs(1)).await;

        assert!(counter.is_empty());
        sweeper.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_hits_never_pass_ceiling() {
        let counter = Arc::new(LocalCounter::new(16));
        let mut handles = Vec::new();
        for _ in 0..200 {
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                counter.hit("same", 50, WINDOW).await.unwrap().is_admitted()
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 50);
    }
}
