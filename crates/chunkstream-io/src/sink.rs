//! The contract between a writer and the underlying byte sink.
//!
//! A writer hands each full chunk to [`Sink::start_write`] as a
//! [`PendingWrite`]. The sink writes `data()` and then calls
//! [`PendingWrite::complete`] exactly once, either before returning
//! (inline) or later from any thread.

use std::fmt;
use std::io;
use std::sync::Arc;

use chunkstream_core::id::{ChunkId, WriterId};

use crate::chunk::Chunk;

/// How a sink accepted a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// The write was completed before `start_write` returned.
    Completed,
    /// The write will be completed later.
    Queued,
}

/// A byte sink that accepts one chunk write at a time per call.
///
/// Writes from one writer arrive in stream order and must reach the sink's
/// destination in that order. Implementations must not call back into the
/// writer from `start_write` other than through [`PendingWrite::complete`].
pub trait Sink: Send + Sync + 'static {
    fn start_write(&self, write: PendingWrite) -> WriteStatus;

    /// Flush and release the destination. Called once, by the writer's
    /// `close`, after every write has been started.
    fn close(&self) -> io::Result<()>;
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn start_write(&self, write: PendingWrite) -> WriteStatus {
        (**self).start_write(write)
    }

    fn close(&self) -> io::Result<()> {
        (**self).close()
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn start_write(&self, write: PendingWrite) -> WriteStatus {
        (**self).start_write(write)
    }

    fn close(&self) -> io::Result<()> {
        (**self).close()
    }
}

pub(crate) type CompletionFn = Box<dyn FnOnce(Chunk) + Send>;

/// One chunk's worth of bytes on its way to a sink.
///
/// Dropping a `PendingWrite` without completing it completes it with a
/// `BrokenPipe` error, so a sink that loses a write fails the stream instead
/// of hanging it.
pub struct PendingWrite {
    chunk: Option<Chunk>,
    len: usize,
    on_complete: Option<CompletionFn>,
}

impl PendingWrite {
    pub(crate) fn new(chunk: Chunk, len: usize, on_complete: CompletionFn) -> Self {
        Self {
            chunk: Some(chunk),
            len,
            on_complete: Some(on_complete),
        }
    }

    /// The bytes to write.
    pub fn data(&self) -> &[u8] {
        match &self.chunk {
            Some(chunk) => chunk.filled(self.len),
            None => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn writer(&self) -> Option<WriterId> {
        self.chunk.as_ref().map(Chunk::owner)
    }

    pub fn chunk_id(&self) -> Option<ChunkId> {
        self.chunk.as_ref().map(Chunk::id)
    }

    /// Report the outcome of the write and hand the chunk back to its writer.
    pub fn complete(mut self, result: io::Result<()>) {
        self.finish(result);
    }

    fn finish(&mut self, result: io::Result<()>) {
        let (Some(mut chunk), Some(on_complete)) = (self.chunk.take(), self.on_complete.take())
        else {
            return;
        };
        if let Err(err) = &result {
            tracing::warn!(
                writer = %chunk.owner(),
                chunk = %chunk.id(),
                len = self.len,
                error = %err,
                "sink write failed"
            );
        }
        chunk.finish_flush(result);
        on_complete(chunk);
    }
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        if self.chunk.is_some() {
            self.finish(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "pending write dropped without completion",
            )));
        }
    }
}

impl fmt::Debug for PendingWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingWrite")
            .field("writer", &self.writer())
            .field("chunk", &self.chunk_id())
            .field("len", &self.len)
            .finish()
    }
}
