//! Abstract memory budget interfaces.
//!
//! The concrete implementation lives in `chunkstream-mem`. Only the traits
//! live here so anything can name a budget without pulling in the pool.

/// A guard returned by a memory budget when bytes are acquired.
///
/// Must release its bytes on drop and be `Send` so pooled buffers carrying a
/// guard can cross to sink worker threads.
pub trait BudgetGuard: Send {
    /// Number of bytes currently accounted for by this guard.
    fn bytes(&self) -> usize;
    /// Debug tag for tracing.
    fn tag(&self) -> &'static str {
        "guard"
    }
}

/// A handle enforcing a byte cap.
///
/// Callers ask before allocating. `None` means the allocation must not happen.
pub trait MemoryBudget: Send + Sync + 'static {
    type Guard: BudgetGuard;

    /// Attempt to acquire `bytes` from the live budget. Returns a guard on success.
    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard>;

    /// Total configured capacity (bytes).
    fn capacity_bytes(&self) -> usize;

    /// Approximate currently used bytes (advisory; not a correctness API).
    fn used_bytes(&self) -> usize;
}
