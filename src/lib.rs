#![forbid(unsafe_code)]
//! chunkstream: pooled, segmented, flow-controlled output streams.
//!
//! This crate re-exports the workspace pieces under one name:
//!
//! - [`chunkstream_core`]: configuration, ids and budget traits,
//! - [`chunkstream_mem`]: the buffer pool and byte budgets,
//! - [`chunkstream_io`]: the writer and bundled sinks.
//!
//! ```
//! use std::sync::Arc;
//!
//! use chunkstream::{shared_pool, BufferPool, MemorySink, SegmentedAsyncWriter, WriterConfig};
//!
//! let sink = MemorySink::new();
//! let pool: Arc<dyn BufferPool> = shared_pool();
//! let writer = SegmentedAsyncWriter::with_pool(sink.clone(), WriterConfig::default(), pool)?;
//! writer.write(b"hello")?;
//! writer.close()?;
//! assert_eq!(sink.contents(), b"hello");
//! # Ok::<(), chunkstream::Error>(())
//! ```

pub use chunkstream_core;
pub use chunkstream_io;
pub use chunkstream_mem;

pub use chunkstream_core::{PoolConfig, WriterConfig};
pub use chunkstream_io::{
    Error, MemorySink, PendingWrite, Result, SegmentedAsyncWriter, Sink, ThreadedSink,
    WriteStatus, WriterStatsSnapshot,
};
pub use chunkstream_mem::{shared_pool, BucketedPool, BufferPool, PooledBuf};

/// Everything a typical caller needs in one import.
pub mod prelude {
    pub use chunkstream_core::prelude::{
        BudgetGuard, ChunkId, MemoryBudget, PoolConfig, PoolId, WriterConfig, WriterId,
    };
    pub use chunkstream_io::{
        MemorySink, PendingWrite, SegmentedAsyncWriter, Sink, ThreadedSink, WriteStatus,
    };
    pub use chunkstream_mem::{shared_pool, BucketedPool, BufferPool, MemoryBudgetImpl, PooledBuf};
}
