//! Fixed-capacity staging buffer.
//!
//! A chunk accumulates bytes until it is full (or explicitly flushed), then
//! travels to the sink inside a [`PendingWrite`] and comes back through the
//! completion callback. While the write is pending the chunk is owned by the
//! `PendingWrite`, so nothing can fill it.

use std::io;

use chunkstream_core::id::{ChunkId, WriterId};
use chunkstream_mem::{BufferPool, PooledBuf};

use crate::error::{Error, Result};
use crate::sink::{CompletionFn, PendingWrite, Sink, WriteStatus};

/// Outcome of [`Chunk::flush_async`].
pub(crate) enum Flush {
    /// Nothing buffered; the chunk is handed straight back.
    Skipped(Chunk),
    Issued(WriteStatus),
}

pub(crate) struct Chunk {
    id: ChunkId,
    owner: WriterId,
    storage: PooledBuf,
    capacity: usize,
    fill: usize,
    write_pending: bool,
    error: Option<Error>,
}

impl Chunk {
    /// Acquire `capacity` bytes of storage from `pool`, or from the heap when
    /// there is no pool.
    pub(crate) fn new(
        id: ChunkId,
        owner: WriterId,
        capacity: usize,
        pool: Option<&dyn BufferPool>,
    ) -> Result<Self> {
        let storage = match pool {
            Some(pool) => pool.take(capacity)?,
            None => PooledBuf::unpooled(capacity),
        };
        if storage.len() < capacity {
            return Err(Error::Invariant(format!(
                "pool returned {} bytes for a {} byte chunk",
                storage.len(),
                capacity
            )));
        }
        Ok(Self {
            id,
            owner,
            storage,
            capacity,
            fill: 0,
            write_pending: false,
            error: None,
        })
    }

    pub(crate) fn id(&self) -> ChunkId {
        self.id
    }

    pub(crate) fn owner(&self) -> WriterId {
        self.owner
    }

    pub(crate) fn len(&self) -> usize {
        self.fill
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.fill == 0
    }

    pub(crate) fn free_bytes(&self) -> usize {
        self.capacity - self.fill
    }

    pub(crate) fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub(crate) fn filled(&self, len: usize) -> &[u8] {
        &self.storage[..len]
    }

    /// Append `src`. Panics if `src` exceeds `free_bytes()`.
    pub(crate) fn copy_in(&mut self, src: &[u8]) {
        debug_assert!(!self.write_pending, "filling a chunk with a write pending");
        let end = self.fill + src.len();
        assert!(end <= self.capacity, "chunk overflow");
        self.storage[self.fill..end].copy_from_slice(src);
        self.fill = end;
    }

    /// Mark the chunk as handed to the sink; returns the byte count to write.
    pub(crate) fn begin_flush(&mut self) -> usize {
        debug_assert!(!self.write_pending, "double flush of one chunk");
        let len = self.fill;
        self.fill = 0;
        self.write_pending = true;
        len
    }

    /// Record a write outcome. The first failure sticks for the chunk's life.
    pub(crate) fn finish_flush(&mut self, result: io::Result<()>) {
        self.write_pending = false;
        if let Err(err) = result {
            if self.error.is_none() {
                self.error = Some(Error::from(err));
            }
        }
    }

    /// Hand the buffered bytes to `sink`. An empty chunk completes immediately
    /// without I/O.
    pub(crate) fn flush_async(mut self, sink: &dyn Sink, on_complete: CompletionFn) -> Flush {
        if self.is_empty() {
            return Flush::Skipped(self);
        }
        let len = self.begin_flush();
        Flush::Issued(sink.start_write(PendingWrite::new(self, len, on_complete)))
    }

    pub(crate) fn into_storage(self) -> PooledBuf {
        self.storage
    }
}
