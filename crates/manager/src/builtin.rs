//! Built-in cache and rate limit drivers

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use weir_protocol::{Cache, Error, RateLimit, Result};

/// An in-memory key/value cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.entries
            .lock()
            .get(key)
            .cloned()
            .ok_or(Error::KeyNotFound)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn add(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut entries = self.entries.lock();
        if entries.contains_key(key) {
            return Err(Error::KeyAlreadyExists);
        }
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// A token-window rate limit local to this process
///
/// Grants up to `count` accesses per `interval`; further accesses are told
/// how long to wait until the window resets.
#[derive(Debug)]
pub struct LocalRateLimit {
    count: u64,
    interval: Duration,
    state: Mutex<WindowState>,
}

#[derive(Debug)]
struct WindowState {
    remaining: u64,
    reset_at: Instant,
}

impl LocalRateLimit {
    /// Create a rate limit of `count` accesses per `interval`
    pub fn new(count: u64, interval: Duration) -> Self {
        Self {
            count,
            interval,
            state: Mutex::new(WindowState {
                remaining: count,
                reset_at: Instant::now() + interval,
            }),
        }
    }
}

#[async_trait]
impl RateLimit for LocalRateLimit {
    async fn access(&self) -> Result<Duration> {
        let mut state = self.state.lock();
        let now = Instant::now();
        if now >= state.reset_at {
            state.remaining = self.count;
            state.reset_at = now + self.interval;
        }
        if state.remaining > 0 {
            state.remaining -= 1;
            return Ok(Duration::ZERO);
        }
        Ok(state.reset_at.saturating_duration_since(now))
    }
}
