use chunkstream_core::id::PoolId;
use thiserror::Error;

/// Result type local to chunkstream-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("memory budget exceeded for tag '{tag}': requested {requested} bytes, capacity {capacity}, used {used}")]
    BudgetExceeded {
        tag: &'static str,
        requested: usize,
        capacity: usize,
        used: usize,
    },

    #[error("buffer of {len} bytes does not belong to {pool} (origin: {origin:?})")]
    ForeignBuffer {
        pool: PoolId,
        origin: Option<PoolId>,
        len: usize,
    },

    #[error("pool configuration: {0}")]
    Config(String),
}

impl From<chunkstream_core::Error> for Error {
    fn from(e: chunkstream_core::Error) -> Self {
        Error::Config(e.to_string())
    }
}
