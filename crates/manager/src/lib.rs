//! Weir Manager - process-wide named resources
//!
//! The manager maps names to shared instances of caches, conditions, rate
//! limits, and processors, constructed once from validated configuration.
//! It also tracks **pipes**: named in-process transaction channels that let
//! an inproc output feed an inproc input within the same process.
//!
//! Lookups for absent resources return stable per-class sentinels
//! (`Error::CacheNotFound`, ...), so callers can distinguish a missing
//! resource from a failing one.
//!
//! The resource maps are read-only after construction; pipe bind/unbind is
//! guarded by a single lock.

mod builtin;
mod config;

pub use builtin::{LocalRateLimit, MemoryCache};
pub use config::{
    CacheConfig, ConditionConfig, ManagerConfig, ProcessorConfig, RateLimitConfig,
};

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error as ThisError;

use weir_protocol::{Cache, Condition, Error, Processor, RateLimit, TransactionSender};

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;

/// Errors raised while constructing a manager from configuration
#[derive(Debug, ThisError)]
pub enum BuildError {
    /// A resource named an unknown driver type
    #[error("resource '{name}': unknown type '{kind}'")]
    UnknownType { name: String, kind: String },

    /// A resource failed to construct from its configuration
    #[error("resource '{name}': {reason}")]
    BadConfig { name: String, reason: String },
}

/// Process-wide registry of named resources
pub struct Manager {
    caches: HashMap<String, Arc<dyn Cache>>,
    conditions: HashMap<String, Arc<dyn Condition>>,
    rate_limits: HashMap<String, Arc<dyn RateLimit>>,
    processors: HashMap<String, Arc<dyn Processor>>,
    pipes: Mutex<HashMap<String, TransactionSender>>,
}

impl Manager {
    /// Construct a manager from validated configuration, failing fast on
    /// unknown types or misconfiguration
    pub fn new(config: ManagerConfig) -> Result<Self, BuildError> {
        let mut caches: HashMap<String, Arc<dyn Cache>> = HashMap::new();
        for (name, conf) in config.caches {
            caches.insert(name.clone(), config::build_cache(&name, conf)?);
        }

        let mut conditions: HashMap<String, Arc<dyn Condition>> = HashMap::new();
        for (name, conf) in config.conditions {
            conditions.insert(name.clone(), config::build_condition(&name, conf)?);
        }

        let mut rate_limits: HashMap<String, Arc<dyn RateLimit>> = HashMap::new();
        for (name, conf) in config.rate_limits {
            rate_limits.insert(name.clone(), config::build_rate_limit(&name, conf)?);
        }

        let mut processors: HashMap<String, Arc<dyn Processor>> = HashMap::new();
        for (name, conf) in config.processors {
            processors.insert(name.clone(), config::build_processor(&name, conf)?);
        }

        Ok(Self {
            caches,
            conditions,
            rate_limits,
            processors,
            pipes: Mutex::new(HashMap::new()),
        })
    }

    /// A manager holding no resources
    pub fn empty() -> Self {
        Self {
            caches: HashMap::new(),
            conditions: HashMap::new(),
            rate_limits: HashMap::new(),
            processors: HashMap::new(),
            pipes: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a named cache
    pub fn get_cache(&self, name: &str) -> Result<Arc<dyn Cache>, Error> {
        self.caches.get(name).cloned().ok_or(Error::CacheNotFound)
    }

    /// Fetch a named condition
    pub fn get_condition(&self, name: &str) -> Result<Arc<dyn Condition>, Error> {
        self.conditions
            .get(name)
            .cloned()
            .ok_or(Error::ConditionNotFound)
    }

    /// Fetch a named rate limit
    pub fn get_rate_limit(&self, name: &str) -> Result<Arc<dyn RateLimit>, Error> {
        self.rate_limits
            .get(name)
            .cloned()
            .ok_or(Error::RateLimitNotFound)
    }

    /// Fetch a named processor
    pub fn get_processor(&self, name: &str) -> Result<Arc<dyn Processor>, Error> {
        self.processors
            .get(name)
            .cloned()
            .ok_or(Error::ProcessorNotFound)
    }

    /// Fetch the send end of a named pipe
    pub fn get_pipe(&self, name: &str) -> Result<TransactionSender, Error> {
        self.pipes
            .lock()
            .get(name)
            .cloned()
            .ok_or(Error::PipeNotFound)
    }

    /// Bind a pipe name to a transaction channel, replacing any existing
    /// binding
    pub fn set_pipe(&self, name: &str, pipe: TransactionSender) {
        tracing::debug!(pipe = name, "registering pipe");
        self.pipes.lock().insert(name.to_string(), pipe);
    }

    /// Unbind a pipe only when the current binding is the given channel.
    ///
    /// A stale unset (after the name has been re-bound to a fresh channel)
    /// is a no-op, so a shutting-down component cannot race a replacement.
    pub fn unset_pipe(&self, name: &str, pipe: &TransactionSender) {
        let mut pipes = self.pipes.lock();
        if pipes.get(name).is_some_and(|bound| bound.same_channel(pipe)) {
            tracing::debug!(pipe = name, "unregistering pipe");
            pipes.remove(name);
        }
    }
}
