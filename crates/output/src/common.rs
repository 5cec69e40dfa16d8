//! Common types shared across outputs

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the writer wrapper
///
/// Shared behind an `Arc` so a handle stays valid after the workers take
/// over the driver.
#[derive(Debug, Default)]
pub struct WriterMetrics {
    /// Connection attempts that succeeded
    connections: AtomicU64,

    /// Connection attempts that failed
    connection_errors: AtomicU64,

    /// Batches written successfully
    batches_written: AtomicU64,

    /// Parts written successfully
    parts_written: AtomicU64,

    /// Payload bytes written successfully
    bytes_written: AtomicU64,

    /// Writes that failed terminally (answered with a nack)
    write_errors: AtomicU64,

    /// Writes retried after a lost connection
    write_retries: AtomicU64,
}

impl WriterMetrics {
    /// Create a zeroed metrics instance
    pub const fn new() -> Self {
        Self {
            connections: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            batches_written: AtomicU64::new(0),
            parts_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            write_retries: AtomicU64::new(0),
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
    pub(crate) fn record_write(&self, parts: u64, bytes: u64) {
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.parts_written.fetch_add(parts, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_write_retry(&self) {
        self.write_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot of all counters
    pub fn snapshot(&self) -> WriterMetricsSnapshot {
        WriterMetricsSnapshot {
            connections: self.connections.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            parts_written: self.parts_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            write_retries: self.write_retries.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of writer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterMetricsSnapshot {
    pub connections: u64,
    pub connection_errors: u64,
    pub batches_written: u64,
    pub parts_written: u64,
    pub bytes_written: u64,
    pub write_errors: u64,
    pub write_retries: u64,
}
