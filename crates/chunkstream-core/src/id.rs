//! Strongly-typed identifiers used across the workspace.
//!
//! Ids are diagnostics handles: they show up in log fields and error messages
//! and never stand in for ownership.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! new_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(v: u64) -> Self {
                Self(v)
            }
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

new_id!(WriterId);
new_id!(ChunkId);
new_id!(PoolId);

static NEXT_WRITER: AtomicU64 = AtomicU64::new(1);
static NEXT_POOL: AtomicU64 = AtomicU64::new(1);

impl WriterId {
    /// Process-unique id for a new writer.
    pub fn next() -> Self {
        Self(NEXT_WRITER.fetch_add(1, Ordering::Relaxed))
    }
}

impl PoolId {
    /// Process-unique id for a new pool.
    pub fn next() -> Self {
        Self(NEXT_POOL.fetch_add(1, Ordering::Relaxed))
    }
}

impl ChunkId {
    /// Chunk ids are slot indices within one writer's ring.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn from_index(index: usize) -> Self {
        Self(index as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_display() {
        let a = WriterId::next();
        let b = WriterId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("WriterId("));

        let c = ChunkId::from_index(3);
        assert_eq!(c.index(), 3);
        assert_eq!(c.to_string(), "ChunkId(3)");
    }
}
