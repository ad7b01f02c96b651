use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sliding window in-memory rate limiter (pod local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), enabled }
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window {
                entry.pop_front();
            } else {
                break;
            }
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }
}

/// Per-category limits from env. Auth is strict, news reads are lenient.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub auth_limit: usize,
    pub auth_window: Duration,
    pub news_read_limit: usize,
    pub news_read_window: Duration,
    pub write_limit: usize,
    pub write_window: Duration,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize {
            std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        }
        fn dur_env(name: &str, default: u64) -> Duration {
            Duration::from_secs(std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default))
        }
        Self {
            auth_limit: usize_env("RL_AUTH_LIMIT", 10),
            auth_window: dur_env("RL_AUTH_WINDOW", 60),
            news_read_limit: usize_env("RL_NEWS_LIMIT", 300),
            news_read_window: dur_env("RL_NEWS_WINDOW", 60),
            write_limit: usize_env("RL_WRITE_LIMIT", 60),
            write_window: dur_env("RL_WRITE_WINDOW", 60),
        }
    }
}

/// High level guard used by handlers.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self {
        Self { limiter, cfg }
    }
    pub fn allow_auth(&self, ip: &str) -> bool {
        self.limiter.check(&format!("auth:{ip}"), self.cfg.auth_limit, self.cfg.auth_window)
    }
    pub fn allow_news_read(&self, ip: &str) -> bool {
        self.limiter.check(&format!("news:{ip}"), self.cfg.news_read_limit, self.cfg.news_read_window)
    }
    pub fn allow_write(&self, ip: &str) -> bool {
        self.limiter.check(&format!("write:{ip}"), self.cfg.write_limit, self.cfg.write_window)
    }
}
