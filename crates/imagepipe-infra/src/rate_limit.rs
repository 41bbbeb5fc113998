//! Per-caller sliding-window rate limiting
//!
//! Each caller key owns a window of admission timestamps. A request is admitted when fewer
//! than `limit` admissions happened within the trailing window. Keys are spread over shards,
//! each behind its own async mutex, so checks for the same caller are serialized while
//! unrelated callers rarely contend.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const DEFAULT_SHARDS: usize = 16;
const DEFAULT_MAX_KEYS_PER_SHARD: usize = 10_000;

#[derive(Debug, Default)]
struct SlidingWindow {
    admitted: VecDeque<Instant>,
}

impl SlidingWindow {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.admitted.front() {
            if now.duration_since(oldest) >= window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }

    fn try_admit(&mut self, now: Instant, limit: u32, window: Duration) -> Result<u32, Duration> {
        self.prune(now, window);

        if (self.admitted.len() as u32) < limit {
            self.admitted.push_back(now);
            Ok(limit - self.admitted.len() as u32)
        } else {
            // Full window: the caller may retry once the oldest admission ages out.
            let retry_after = self
                .admitted
                .front()
                .map(|oldest| (*oldest + window).saturating_duration_since(now))
                .unwrap_or(window);
            Err(retry_after)
        }
    }

    fn last_seen(&self) -> Option<Instant> {
        self.admitted.back().copied()
    }
}

/// Sharded sliding-window rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    shards: Vec<Arc<Mutex<HashMap<String, SlidingWindow>>>>,
    limit: u32,
    window: Duration,
    max_keys_per_shard: usize,
}

impl RateLimiter {
    /// Limiter admitting `limit_per_minute` requests per caller in any 60s window
    pub fn new(limit_per_minute: u32) -> Self {
        Self::with_shards(limit_per_minute, DEFAULT_SHARDS)
    }

    pub fn with_shards(limit_per_minute: u32, shard_count: usize) -> Self {
        Self::with_window(limit_per_minute, Duration::from_secs(60), shard_count)
    }

    pub fn with_window(limit: u32, window: Duration, shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let shards = (0..shard_count)
            .map(|_| Arc::new(Mutex::new(HashMap::new())))
            .collect();
        Self {
            shards,
            limit,
            window,
            max_keys_per_shard: DEFAULT_MAX_KEYS_PER_SHARD,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    /// Record one request for `key`.
    ///
    /// Returns the remaining allowance on admission, or how long until the next request
    /// would be admitted.
    pub async fn check_rate_limit(&self, key: &str) -> Result<u32, Duration> {
        let shard_index = self.shard_index(key);
        let mut windows = self.shards[shard_index].lock().await;
        let now = Instant::now();

        if windows.len() >= self.max_keys_per_shard && !windows.contains_key(key) {
            let window = self.window;
            windows.retain(|_, w| {
                w.prune(now, window);
                !w.admitted.is_empty()
            });

            if windows.len() >= self.max_keys_per_shard {
                let oldest_key = windows
                    .iter()
                    .min_by_key(|(_, w)| w.last_seen())
                    .map(|(k, _)| k.clone());
                if let Some(key_to_remove) = oldest_key {
                    windows.remove(&key_to_remove);
                    tracing::debug!(
                        shard_index = shard_index,
                        remaining_keys = windows.len(),
                        "Evicted least recently seen rate limit window"
                    );
                }
            }
        }

        windows
            .entry(key.to_string())
            .or_default()
            .try_admit(now, self.limit, self.window)
    }

    /// Drop windows with no admissions inside the trailing window
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut total_cleaned = 0;

        for shard in &self.shards {
            let mut windows = shard.lock().await;
            let before = windows.len();
            windows.retain(|_, w| {
                w.prune(now, self.window);
                !w.admitted.is_empty()
            });
            total_cleaned += before - windows.len();
        }

        if total_cleaned > 0 {
            tracing::debug!(
                windows_cleaned = total_cleaned,
                "Cleaned up expired rate limit windows"
            );
        }
        total_cleaned
    }

    /// Periodically run [`RateLimiter::cleanup_expired`] until the task is aborted
    pub fn spawn_cleanup(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.cleanup_expired().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_twenty_first_request_is_rejected() {
        let limiter = RateLimiter::new(20);

        for i in 0..20 {
            let remaining = limiter.check_rate_limit("caller-a").await.unwrap();
            assert_eq!(remaining, 19 - i);
        }

        let retry_after = limiter.check_rate_limit("caller-a").await.unwrap_err();
        assert!(retry_after <= Duration::from_secs(60));
        assert!(retry_after > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callers_are_independent() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check_rate_limit("a").await.is_ok());
        assert!(limiter.check_rate_limit("a").await.is_err());
        assert!(limiter.check_rate_limit("b").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(2);

        limiter.check_rate_limit("a").await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        limiter.check_rate_limit("a").await.unwrap();

        // Oldest admission is 30s old: 30s to wait.
        let retry_after = limiter.check_rate_limit("a").await.unwrap_err();
        assert_eq!(retry_after, Duration::from_secs(30));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.check_rate_limit("a").await.is_ok());
        assert!(limiter.check_rate_limit("a").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_checks_admit_exactly_limit() {
        let limiter = Arc::new(RateLimiter::with_shards(20, 4));

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.check_rate_limit("shared").await.is_ok() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_removes_idle_windows() {
        let limiter = RateLimiter::new(5);
        limiter.check_rate_limit("a").await.unwrap();
        limiter.check_rate_limit("b").await.unwrap();

        assert_eq!(limiter.cleanup_expired().await, 0);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.cleanup_expired().await, 2);
    }
}
