//! Common types shared across inputs

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the reader wrapper
///
/// Shared behind an `Arc` so a handle stays valid after the reader's
/// background task takes over.
#[derive(Debug, Default)]
pub struct ReaderMetrics {
    /// Connection attempts that succeeded
    connections: AtomicU64,

    /// Connection attempts that failed
    connection_errors: AtomicU64,

    /// Batches read and forwarded downstream
    batches_received: AtomicU64,

    /// Parts read and forwarded downstream
    parts_received: AtomicU64,

    /// Read attempts that failed
    read_errors: AtomicU64,

    /// Acknowledgements forwarded to the driver
    acks_forwarded: AtomicU64,

    /// Negative acknowledgements forwarded to the driver
    nacks_forwarded: AtomicU64,
}

impl ReaderMetrics {
    /// Create a zeroed metrics instance
    pub const fn new() -> Self {
        Self {
            connections: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            batches_received: AtomicU64::new(0),
            parts_received: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            acks_forwarded: AtomicU64::new(0),
            nacks_forwarded: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_batch(&self, parts: u64) {
        self.batches_received.fetch_add(1, Ordering::Relaxed);
        self.parts_received.fetch_add(parts, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_ack(&self, success: bool) {
        if success {
            self.acks_forwarded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.nacks_forwarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get a point-in-time snapshot of all counters
    pub fn snapshot(&self) -> ReaderMetricsSnapshot {
        ReaderMetricsSnapshot {
            connections: self.connections.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            batches_received: self.batches_received.load(Ordering::Relaxed),
            parts_received: self.parts_received.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            acks_forwarded: self.acks_forwarded.load(Ordering::Relaxed),
            nacks_forwarded: self.nacks_forwarded.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of reader counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderMetricsSnapshot {
    pub connections: u64,
    pub connection_errors: u64,
    pub batches_received: u64,
    pub parts_received: u64,
    pub read_errors: u64,
    pub acks_forwarded: u64,
    pub nacks_forwarded: u64,
}
