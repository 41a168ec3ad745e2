//! Reusable byte buffers.
//!
//! A [`BufferPool`] hands out [`PooledBuf`]s at least as large as requested
//! and takes them back for reuse. Buffers remember which pool produced them so
//! a pool can refuse storage it does not own instead of silently adopting it.

use std::fmt;
use std::ops::{Deref, DerefMut};

use chunkstream_core::budget::{BudgetGuard, MemoryBudget};
use chunkstream_core::config::PoolConfig;
use chunkstream_core::id::PoolId;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::guard::{BudgetGuardImpl, MemoryBudgetImpl};
use crate::tracking::{PoolStats, PoolStatsSnapshot};

/// Contract every pool used for chunk storage must satisfy.
pub trait BufferPool: Send + Sync {
    fn id(&self) -> PoolId;

    /// Return a buffer whose length is at least `min_size`. A zero-sized
    /// request yields an empty buffer.
    fn take(&self, min_size: usize) -> Result<PooledBuf>;

    /// Make `buf` eligible for reuse. Empty buffers are ignored; buffers from
    /// another pool (or from no pool) are dropped and reported as
    /// [`Error::ForeignBuffer`].
    fn give_back(&self, buf: PooledBuf) -> Result<()>;

    /// Drop every retained buffer. Later takes allocate fresh storage.
    fn clear(&self);
}

/// Owned byte buffer, optionally tied to a pool and a budget guard.
pub struct PooledBuf {
    buf: Vec<u8>,
    origin: Option<PoolId>,
    guard: Option<BudgetGuardImpl>,
}

impl PooledBuf {
    /// Zeroed heap buffer that belongs to no pool.
    pub fn unpooled(len: usize) -> Self {
        Self {
            buf: vec![0u8; len],
            origin: None,
            guard: None,
        }
    }

    fn empty(origin: PoolId) -> Self {
        Self {
            buf: Vec::new(),
            origin: Some(origin),
            guard: None,
        }
    }

    pub fn origin(&self) -> Option<PoolId> {
        self.origin
    }

    /// Bytes charged against the owning pool's budget, if it has one.
    pub fn accounted_bytes(&self) -> usize {
        self.guard.as_ref().map_or(0, |g| g.bytes())
    }

    /// Detach the storage. Budget bytes are released immediately.
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

impl Deref for PooledBuf {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl fmt::Debug for PooledBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuf")
            .field("len", &self.buf.len())
            .field("origin", &self.origin)
            .field("accounted", &self.accounted_bytes())
            .finish()
    }
}

/// Power-of-two bucketed pool.
///
/// Requests up to `max_pooled_size` are rounded up to the next power of two
/// (at least `min_bucket_size`) and served from that bucket's idle list.
/// Larger requests are allocated exactly and dropped on return.
pub struct BucketedPool {
    id: PoolId,
    config: PoolConfig,
    min_shift: u32,
    buckets: Box<[Mutex<Vec<PooledBuf>>]>,
    budget: Option<MemoryBudgetImpl>,
    stats: PoolStats,
}

impl BucketedPool {
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let min_shift = config.min_bucket_size.trailing_zeros();
        let max_shift = config.max_pooled_size.next_power_of_two().trailing_zeros();
        let buckets = (min_shift..=max_shift)
            .map(|_| Mutex::new(Vec::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let budget = config.budget_bytes.map(MemoryBudgetImpl::new);

        let pool = Self {
            id: PoolId::next(),
            config,
            min_shift,
            buckets,
            budget,
            stats: PoolStats::new(),
        };
        tracing::debug!(
            pool = %pool.id,
            buckets = pool.buckets.len(),
            budget = ?pool.config.budget_bytes,
            "buffer pool created"
        );
        Ok(pool)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn budget(&self) -> Option<&MemoryBudgetImpl> {
        self.budget.as_ref()
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of idle buffers across all buckets.
    pub fn retained_buffers(&self) -> usize {
        self.buckets.iter().map(|b| b.lock().len()).sum()
    }

    pub fn retained_bytes(&self) -> usize {
        self.buckets
            .iter()
            .map(|b| b.lock().iter().map(|buf| buf.len()).sum::<usize>())
            .sum()
    }

    /// Bucket index and rounded size for a request, or `None` if unpooled.
    fn bucket_for(&self, size: usize) -> Option<(usize, usize)> {
        if size > self.config.max_pooled_size {
            return None;
        }
        let rounded = self.config.charged_size(size);
        let index = (rounded.trailing_zeros() - self.min_shift) as usize;
        Some((index, rounded))
    }

    fn charge(&self, len: usize) -> Result<Option<BudgetGuardImpl>> {
        let Some(budget) = &self.budget else {
            return Ok(None);
        };
        if let Some(guard) = budget.try_acquire(len, "pool") {
            return Ok(Some(guard));
        }

        // Idle buffers hold budget too; give it back and retry once.
        self.clear();
        budget
            .try_acquire(len, "pool")
            .map(Some)
            .ok_or_else(|| Error::BudgetExceeded {
                tag: "pool",
                requested: len,
                capacity: budget.capacity_bytes(),
                used: budget.used_bytes(),
            })
    }

    fn allocate(&self, len: usize) -> Result<PooledBuf> {
        let guard = self.charge(len)?;
        self.stats.record_take(len, false);
        Ok(PooledBuf {
            buf: vec![0u8; len],
            origin: Some(self.id),
            guard,
        })
    }
}

impl BufferPool for BucketedPool {
    fn id(&self) -> PoolId {
        self.id
    }

    fn take(&self, min_size: usize) -> Result<PooledBuf> {
        if min_size == 0 {
            return Ok(PooledBuf::empty(self.id));
        }

        match self.bucket_for(min_size) {
            Some((index, size)) => {
                if let Some(buf) = self.buckets[index].lock().pop() {
                    self.stats.record_take(size, true);
                    return Ok(buf);
                }
                self.allocate(size)
            }
            None => self.allocate(min_size),
        }
    }

    fn give_back(&self, buf: PooledBuf) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        if buf.origin != Some(self.id) {
            self.stats.record_rejected();
            tracing::warn!(
                pool = %self.id,
                origin = ?buf.origin,
                len = buf.len(),
                "refusing buffer from another pool"
            );
            return Err(Error::ForeignBuffer {
                pool: self.id,
                origin: buf.origin,
                len: buf.len(),
            });
        }

        self.stats.record_return(buf.len());
        if let Some((index, size)) = self.bucket_for(buf.len()) {
            if size == buf.len() {
                let mut bucket = self.buckets[index].lock();
                if bucket.len() < self.config.max_retained_per_bucket {
                    bucket.push(buf);
                }
            }
        }
        Ok(())
    }

    fn clear(&self) {
        let mut freed = 0usize;
        for bucket in self.buckets.iter() {
            let drained: Vec<PooledBuf> = std::mem::take(&mut *bucket.lock());
            freed += drained.len();
        }
        tracing::debug!(pool = %self.id, freed, "buffer pool cleared");
    }
}

impl fmt::Debug for BucketedPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketedPool")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("budget", &self.budget)
            .finish()
    }
}
