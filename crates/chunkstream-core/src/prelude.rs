//! Convenient re-exports for downstream crates.

pub use crate::budget::{BudgetGuard, MemoryBudget};
pub use crate::config::{PoolConfig, WriterConfig};
pub use crate::error::{Error, Result};
pub use crate::id::{ChunkId, PoolId, WriterId};
