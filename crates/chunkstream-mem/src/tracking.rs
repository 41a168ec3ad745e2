//! Lightweight pool counters.
//!
//! Relaxed atomics only; the numbers are advisory and never used for
//! correctness decisions.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Default)]
pub struct PoolStats {
    takes: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    returns: AtomicU64,
    rejected: AtomicU64,
    outstanding_bytes: AtomicUsize,
    peak_outstanding_bytes: AtomicUsize,
}

/// Point-in-time copy of [`PoolStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatsSnapshot {
    pub takes: u64,
    /// Takes served from a retained buffer.
    pub hits: u64,
    /// Takes that had to allocate.
    pub misses: u64,
    pub returns: u64,
    /// Give-backs refused because the buffer came from elsewhere.
    pub rejected: u64,
    pub outstanding_bytes: usize,
    pub peak_outstanding_bytes: usize,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_take(&self, bytes: usize, reused: bool) {
        self.takes.fetch_add(1, Ordering::Relaxed);
        if reused {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        let now = self.outstanding_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.peak_outstanding_bytes.fetch_max(now, Ordering::Relaxed);
        tracing::trace!(bytes, reused, outstanding = now, "pool take");
    }

    pub(crate) fn record_return(&self, bytes: usize) {
        self.returns.fetch_add(1, Ordering::Relaxed);
        self.release_outstanding(bytes);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// A taken buffer that will never come back (dropped by its holder).
    pub(crate) fn release_outstanding(&self, bytes: usize) {
        let _ = self
            .outstanding_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                Some(cur.saturating_sub(bytes))
            });
    }

    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            takes: self.takes.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            outstanding_bytes: self.outstanding_bytes.load(Ordering::Relaxed),
            peak_outstanding_bytes: self.peak_outstanding_bytes.load(Ordering::Relaxed),
        }
    }
}
