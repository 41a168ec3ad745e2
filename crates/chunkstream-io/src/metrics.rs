//! Per-writer counters.
//!
//! Relaxed atomics, bumped on the hot path and read only for diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Default)]
pub(crate) struct WriterStats {
    bytes_accepted: AtomicU64,
    flushes_issued: AtomicU64,
    bytes_flushed: AtomicU64,
    flushes_inline: AtomicU64,
    flushes_queued: AtomicU64,
    flushes_completed: AtomicU64,
    chunks_allocated: AtomicU64,
    stalls: AtomicU64,
    parks: AtomicU64,
}

/// Point-in-time copy of a writer's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterStatsSnapshot {
    /// Bytes copied into chunks.
    pub bytes_accepted: u64,
    pub flushes_issued: u64,
    pub bytes_flushed: u64,
    /// Flushes the sink completed before `start_write` returned.
    pub flushes_inline: u64,
    pub flushes_queued: u64,
    pub flushes_completed: u64,
    pub chunks_allocated: u64,
    /// Times a blocking write waited for a chunk.
    pub stalls: u64,
    /// Times an asynchronous write parked waiting for a chunk.
    pub parks: u64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl WriterStats {
    pub(crate) fn record_accepted(&self, bytes: usize) {
        bump(&self.bytes_accepted, bytes as u64);
    }

    pub(crate) fn record_flush_issued(&self, bytes: usize, inline: bool) {
        bump(&self.flushes_issued, 1);
        bump(&self.bytes_flushed, bytes as u64);
        if inline {
            bump(&self.flushes_inline, 1);
        } else {
            bump(&self.flushes_queued, 1);
        }
    }

    pub(crate) fn record_flush_completed(&self) {
        bump(&self.flushes_completed, 1);
    }

    pub(crate) fn record_chunk_allocated(&self) {
        bump(&self.chunks_allocated, 1);
    }

    pub(crate) fn record_stall(&self) {
        bump(&self.stalls, 1);
    }

    pub(crate) fn record_park(&self) {
        bump(&self.parks, 1);
    }

    pub(crate) fn snapshot(&self) -> WriterStatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        WriterStatsSnapshot {
            bytes_accepted: load(&self.bytes_accepted),
            flushes_issued: load(&self.flushes_issued),
            bytes_flushed: load(&self.bytes_flushed),
            flushes_inline: load(&self.flushes_inline),
            flushes_queued: load(&self.flushes_queued),
            flushes_completed: load(&self.flushes_completed),
            chunks_allocated: load(&self.chunks_allocated),
            stalls: load(&self.stalls),
            parks: load(&self.parks),
        }
    }
}
