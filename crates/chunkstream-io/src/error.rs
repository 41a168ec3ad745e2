use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Result type local to chunkstream-io.
pub type Result<T> = std::result::Result<T, Error>;

/// Writer errors.
///
/// Cloneable because a sink failure is sticky: the same error is handed to
/// every caller after it is first observed.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("sink write failed: {0}")]
    Sink(Arc<io::Error>),

    #[error("an asynchronous write is already in progress on this writer")]
    WriterBusy,

    #[error("writer is closed")]
    Closed,

    #[error("operation not supported on a write-only stream: {0}")]
    Unsupported(&'static str),

    #[error("buffer pool: {0}")]
    Pool(#[from] chunkstream_mem::Error),

    #[error("invalid writer configuration: {0}")]
    Config(String),

    #[error("internal invariant failed: {0}")]
    Invariant(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Sink(Arc::new(err))
    }
}

impl From<chunkstream_core::Error> for Error {
    fn from(err: chunkstream_core::Error) -> Self {
        match err {
            chunkstream_core::Error::Config(msg) => Error::Config(msg),
            chunkstream_core::Error::Invariant(msg) => Error::Invariant(msg),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::Sink(inner) => inner.kind(),
            Error::WriterBusy => io::ErrorKind::WouldBlock,
            Error::Closed => io::ErrorKind::BrokenPipe,
            Error::Unsupported(_) => io::ErrorKind::Unsupported,
            Error::Config(_) => io::ErrorKind::InvalidInput,
            Error::Pool(_) => io::ErrorKind::OutOfMemory,
            Error::Invariant(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
