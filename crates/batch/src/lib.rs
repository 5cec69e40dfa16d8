//! Weir Batch - batching policy engine
//!
//! A [`Policy`] accumulates parts and reports when a batch is due. Any of the
//! configured triggers fires the batch:
//!
//! - `count`: the accumulated part count reaches a threshold
//! - `byte_size`: the cumulative payload size reaches a threshold
//! - `period`: time since the last flush exceeds a duration
//! - `check`: a condition matches the most recently added part
//!
//! After firing, an ordered list of post-processors runs on the batch; their
//! output is what is actually emitted. A processor may split the batch, so
//! [`Policy::flush_any`] exposes the multi-batch form while [`Policy::flush`]
//! returns a single merged batch.
//!
//! The policy is not internally shared: each batcher owns its instance.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use weir_protocol::component::execute_all;
use weir_protocol::{Batch, Condition, Part, Processor};

#[cfg(test)]
#[path = "policy_test.rs"]
mod tests;

/// Configuration for a batching policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Fire when at least this many parts have accumulated (0 disables)
    pub count: usize,

    /// Fire when cumulative payload bytes reach this size (0 disables)
    pub byte_size: usize,

    /// Fire when this much time has passed since the last flush
    /// (milliseconds, 0 disables)
    pub period_ms: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            count: 1,
            byte_size: 0,
            period_ms: 0,
        }
    }
}

impl PolicyConfig {
    /// Whether this policy would pass every part straight through, making a
    /// wrapping batcher redundant
    pub fn is_noop(&self) -> bool {
        self.count <= 1 && self.byte_size == 0 && self.period_ms == 0
    }

    /// Whether any trigger is configured
    pub fn has_trigger(&self) -> bool {
        self.count > 0 || self.byte_size > 0 || self.period_ms > 0
    }
}

/// Errors raised while constructing a policy
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// No trigger is configured and no condition was supplied; the policy
    /// would accumulate forever.
    #[error("batch policy requires at least one trigger")]
    NoTriggers,
}

/// A batching policy: accumulates parts, fires on any configured trigger
pub struct Policy {
    count: usize,
    byte_size: usize,
    period: Option<Duration>,
    check: Option<Arc<dyn Condition>>,
    processors: Vec<Arc<dyn Processor>>,

    parts: Vec<Part>,
    size_tally: usize,
    triggered: bool,
    last_batch: Instant,
}

impl Policy {
    /// Construct a policy from configuration plus an optional firing
    /// condition and post-flush processors
    pub fn new(
        config: PolicyConfig,
        check: Option<Arc<dyn Condition>>,
        processors: Vec<Arc<dyn Processor>>,
    ) -> Result<Self, PolicyError> {
        if !config.has_trigger() && check.is_none() {
            return Err(PolicyError::NoTriggers);
        }
        Ok(Self {
            count: config.count,
            byte_size: config.byte_size,
            period: (config.period_ms > 0).then(|| Duration::from_millis(config.period_ms)),
            check,
            processors,
            parts: Vec::new(),
            size_tally: 0,
            triggered: false,
            last_batch: Instant::now(),
        })
    }

    /// Add a part, returning true when the batch is now due
    pub fn add(&mut self, part: Part) -> bool {
        self.size_tally += part.data().len();

        if let Some(check) = &self.check {
            if !self.triggered {
                let probe = Batch::from_parts(vec![part.clone()]);
                self.triggered = check.check(&probe);
            }
        }
        self.parts.push(part);

        if self.count > 0 && self.parts.len() >= self.count {
            self.triggered = true;
        }
        if self.byte_size > 0 && self.size_tally >= self.byte_size {
            self.triggered = true;
        }
        if let Some(period) = self.period {
            if self.last_batch.elapsed() >= period {
                self.triggered = true;
            }
        }
        self.triggered
    }

    /// The number of parts currently accumulated
    pub fn count(&self) -> usize {
        self.parts.len()
    }

    /// Time remaining before the period trigger fires, or `None` when no
    /// period is configured. Zero means the batch is overdue.
    pub fn until_next(&self) -> Option<Duration> {
        let period = self.period?;
        Some(period.saturating_sub(self.last_batch.elapsed()))
    }

    /// Flush the accumulated parts through the post-processors, merging the
    /// result into a single batch. Returns `None` when nothing is pending or
    /// the processors dropped everything.
    pub fn flush(&mut self) -> Option<Batch> {
        let batches = self.flush_any();
        let mut merged = Batch::new();
        for batch in batches {
            for part in batch {
                merged.push(part);
            }
        }
        if merged.is_empty() {
            return None;
        }
        Some(merged)
    }

    /// Flush the accumulated parts through the post-processors, preserving
    /// any splits the processors made
    pub fn flush_any(&mut self) -> Vec<Batch> {
        self.triggered = false;
        self.size_tally = 0;
        self.last_batch = Instant::now();

        if self.parts.is_empty() {
            return Vec::new();
        }
        let batch = Batch::from_parts(std::mem::take(&mut self.parts));

        if self.processors.is_empty() {
            return vec![batch];
        }
        let (batches, response) = execute_all(&self.processors, vec![batch]);
        if batches.is_empty() {
            if let Some(response) = response {
                if let Some(err) = response.err() {
                    tracing::error!(error = %err, "batch post-processors failed");
                }
            }
        }
        batches
    }
}
