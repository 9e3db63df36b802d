//! Per-caller request rate limiting.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Result of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Pluggable limiter keyed by caller (usually the peer address).
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, key: &str) -> RateDecision;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    count: u32,
}

impl Window {
    fn allow(&mut self, now: Instant, max: u32, window: Duration) -> RateDecision {
        if now.saturating_duration_since(self.start) >= window {
            self.start = now;
            self.count = 0;
        }

        if self.count >= max {
            let retry_after = window.saturating_sub(now.saturating_duration_since(self.start));
            return RateDecision::Limited { retry_after };
        }

        self.count = self.count.saturating_add(1);
        RateDecision::Allowed {
            remaining: max - self.count,
        }
    }
}

/// Fixed window per key, held in process memory.
#[derive(Debug)]
pub struct MemoryRateLimiter {
    max_per_window: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl MemoryRateLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    async fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut windows = self.windows.lock().await;

        // Prune expired windows once the table gets large.
        if windows.len() > 1024 {
            let window = self.window;
            windows.retain(|_, w| now.saturating_duration_since(w.start) < window);
        }

        windows
            .entry(key.to_string())
            .or_insert(Window { start: now, count: 0 })
            .allow(now, self.max_per_window, self.window)
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_window() {
        let limiter = MemoryRateLimiter::new(2, Duration::from_secs(60));
        let t0 = Instant::now();

        assert_eq!(
            limiter.check_at("1.2.3.4", t0).await,
            RateDecision::Allowed { remaining: 1 }
        );
        assert!(limiter
            .check_at("1.2.3.4", t0 + Duration::from_secs(1))
            .await
            .is_allowed());
        assert_eq!(
            limiter.check_at("1.2.3.4", t0 + Duration::from_secs(20)).await,
            RateDecision::Limited {
                retry_after: Duration::from_secs(40)
            }
        );
        assert!(limiter
            .check_at("1.2.3.4", t0 + Duration::from_secs(60))
            .await
            .is_allowed());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = MemoryRateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(limiter.check_at("a", t0).await.is_allowed());
        assert!(!limiter.check_at("a", t0).await.is_allowed());
        assert!(limiter.check_at("b", t0).await.is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_with_clock() {
        let limiter = MemoryRateLimiter::new(1, Duration::from_secs(60));

        assert!(limiter.check("a").await.is_allowed());
        assert!(!limiter.check("a").await.is_allowed());
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.check("a").await.is_allowed());
    }
}
