#![forbid(unsafe_code)]
//! chunkstream-mem: hard byte budgeting and the reusable buffer pool.
//!
//! Chunk storage for writers flows through a [`BufferPool`]. The bundled
//! [`BucketedPool`] rounds requests up to power-of-two buckets, keeps a
//! bounded number of idle buffers per bucket, and can be capped by a
//! [`MemoryBudgetImpl`] so that outstanding plus retained bytes never exceed
//! a hard ceiling.

pub mod error;
pub mod global;
pub mod guard;
pub mod pool;
pub mod tracking;

pub use error::{Error, Result};
pub use global::shared_pool;
pub use guard::{BudgetGuardImpl, MemoryBudgetImpl};
pub use pool::{BucketedPool, BufferPool, PooledBuf};
pub use tracking::{PoolStats, PoolStatsSnapshot};
