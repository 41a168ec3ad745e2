//! Process-wide default pool.
//!
//! Writers never reach for this implicitly; callers opt in by passing
//! `shared_pool()` where a pool is expected.

use std::sync::Arc;

use chunkstream_core::config::PoolConfig;
use once_cell::sync::OnceCell;

use crate::pool::BucketedPool;

static SHARED_POOL: OnceCell<Arc<BucketedPool>> = OnceCell::new();

/// The shared pool, built from `PoolConfig::from_env()` on first use.
///
/// An invalid environment configuration falls back to `PoolConfig::default()`.
pub fn shared_pool() -> Arc<BucketedPool> {
    SHARED_POOL
        .get_or_init(|| {
            let cfg = PoolConfig::from_env();
            let pool = BucketedPool::new(cfg).or_else(|e| {
                tracing::warn!(error = %e, "invalid pool environment; using defaults");
                BucketedPool::new(PoolConfig::default())
            });
            match pool {
                Ok(pool) => Arc::new(pool),
                // Defaults always validate.
                Err(e) => unreachable!("default pool config rejected: {e}"),
            }
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BufferPool;

    #[test]
    fn test_shared_pool_is_a_singleton() {
        let a = shared_pool();
        let b = shared_pool();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.id(), b.id());
    }
}
