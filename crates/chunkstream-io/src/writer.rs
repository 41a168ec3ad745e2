//! Segmented, flow-controlled output stream.
//!
//! Bytes are copied into fixed-size chunks. A chunk is handed to the sink as
//! soon as it is full, and the producer moves on to the next available chunk.
//! At most `max_chunks` chunks ever exist, so a slow sink throttles the
//! producer instead of letting buffered data grow:
//!
//! - blocking [`write`](SegmentedAsyncWriter::write) waits for a completion,
//! - [`begin_write`](SegmentedAsyncWriter::begin_write) parks the operation in
//!   the ring and the completion that frees a chunk resumes it.
//!
//! Lock order is `fill_lock` then the ring lock. Completions take only the
//! ring lock (and `fill_lock` when resuming a parked operation, which they
//! own exclusively at that point), so a sink may complete inline.

use std::io::SeekFrom;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use bytes::{Buf, Bytes};
use chunkstream_core::config::WriterConfig;
use chunkstream_core::id::{ChunkId, WriterId};
use chunkstream_mem::BufferPool;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::chunk::{Chunk, Flush};
use crate::error::{Error, Result};
use crate::metrics::{WriterStats, WriterStatsSnapshot};
use crate::ring::ChunkRing;
use crate::sink::{CompletionFn, Sink, WriteStatus};

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

type Continuation = Box<dyn FnOnce(Result<()>) + Send>;

/// An asynchronous write that has not finished copying its input.
struct AsyncWriteOp {
    data: Bytes,
    continuation: Continuation,
    /// Not yet run; must re-check the writer state under `fill_lock`.
    fresh: bool,
}

enum Fill {
    Done(Result<()>),
    NeedChunk,
}

struct Inner {
    id: WriterId,
    config: WriterConfig,
    sink: Box<dyn Sink>,
    pool: Option<Arc<dyn BufferPool>>,
    ring: ChunkRing<AsyncWriteOp>,
    fill_lock: Mutex<()>,
    /// 1 between a successful `begin_write` and its `end_write`.
    async_in_progress: AtomicUsize,
    state: AtomicU8,
    stats: WriterStats,
    this: Weak<Inner>,
}

/// Write-only stream that stages bytes in pooled chunks and flushes them to a
/// [`Sink`] with bounded memory.
///
/// All methods take `&self`; one producer at a time is expected, and an
/// outstanding asynchronous write makes other writes fail with
/// [`Error::WriterBusy`].
pub struct SegmentedAsyncWriter {
    inner: Arc<Inner>,
}

impl SegmentedAsyncWriter {
    /// Writer with heap-allocated chunk storage.
    pub fn new<S: Sink>(sink: S, config: WriterConfig) -> Result<Self> {
        Self::build(Box::new(sink), config, None)
    }

    /// Writer whose chunk storage is taken from, and returned to, `pool`.
    pub fn with_pool<S: Sink>(
        sink: S,
        config: WriterConfig,
        pool: Arc<dyn BufferPool>,
    ) -> Result<Self> {
        Self::build(Box::new(sink), config, Some(pool))
    }

    fn build(
        sink: Box<dyn Sink>,
        config: WriterConfig,
        pool: Option<Arc<dyn BufferPool>>,
    ) -> Result<Self> {
        config.validate()?;
        let inner = Arc::new_cyclic(|this| Inner {
            id: WriterId::next(),
            ring: ChunkRing::new(config.max_chunks),
            config,
            sink,
            pool,
            fill_lock: Mutex::new(()),
            async_in_progress: AtomicUsize::new(0),
            state: AtomicU8::new(OPEN),
            stats: WriterStats::default(),
            this: this.clone(),
        });
        // The first chunk is preloaded so the common path never allocates.
        inner.try_grow()?;
        debug!(
            writer = %inner.id,
            chunk_size = inner.config.chunk_size,
            max_chunks = inner.config.max_chunks,
            pooled = inner.pool.is_some(),
            "writer opened"
        );
        Ok(Self { inner })
    }

    pub fn id(&self) -> WriterId {
        self.inner.id
    }

    pub fn config(&self) -> &WriterConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> WriterStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Chunks allocated so far. Never exceeds `max_chunks`.
    pub fn registered_chunks(&self) -> usize {
        self.inner.ring.registered()
    }

    /// Bytes sitting in the current chunk, not yet handed to the sink.
    pub fn buffered_len(&self) -> usize {
        self.inner.ring.current().map_or(0, |c| c.len())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) != OPEN
    }

    pub fn can_write(&self) -> bool {
        !self.is_closed()
    }

    pub fn can_read(&self) -> bool {
        false
    }

    pub fn can_seek(&self) -> bool {
        false
    }

    /// Copy `buf` into the stream, blocking while every chunk is in flight.
    ///
    /// Returns once all of `buf` has been copied; bytes may still be buffered.
    /// Fails with the sink's error once any write has failed.
    pub fn write(&self, buf: &[u8]) -> Result<()> {
        let inner = &self.inner;
        inner.ensure_open()?;
        inner.ring.check()?;
        if buf.is_empty() {
            return Ok(());
        }
        inner.ensure_not_async_busy()?;

        let _fill = inner.fill_lock.lock();
        inner.ensure_open()?;
        inner.ensure_not_async_busy()?;
        inner.write_blocking(buf)
    }

    /// Start copying `data` without blocking.
    ///
    /// `continuation` runs exactly once when the copy finishes or fails, on
    /// this thread if the copy finishes immediately ([`WriteStatus::Completed`])
    /// or on a sink completion thread otherwise ([`WriteStatus::Queued`]).
    /// Every successful `begin_write` must be paired with [`end_write`].
    ///
    /// On `Err` the operation never started and `continuation` is dropped.
    ///
    /// [`end_write`]: SegmentedAsyncWriter::end_write
    pub fn begin_write<F>(&self, data: impl Into<Bytes>, continuation: F) -> Result<WriteStatus>
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let inner = &self.inner;
        inner.ensure_open()?;
        if inner
            .async_in_progress
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::WriterBusy);
        }
        if let Err(err) = inner.ring.check() {
            inner.async_in_progress.store(0, Ordering::Release);
            return Err(err);
        }

        let op = AsyncWriteOp {
            data: data.into(),
            continuation: Box::new(continuation),
            fresh: true,
        };
        inner.ring.begin_async_op();
        Ok(inner.run_async(op))
    }

    /// Wait for the outstanding asynchronous write and release the busy
    /// guard. Reports the sticky sink error if one has been recorded.
    pub fn end_write(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.async_in_progress.load(Ordering::Acquire) == 0 {
            return Err(Error::Invariant(
                "end_write without a matching begin_write".into(),
            ));
        }
        inner.ring.wait_async_idle();
        inner.async_in_progress.store(0, Ordering::Release);
        inner.ring.check()
    }

    /// `begin_write` + `end_write` as a future.
    pub async fn write_async(&self, data: impl Into<Bytes>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.begin_write(data, move |result| {
            let _ = tx.send(result);
        })?;
        let completed = rx
            .await
            .unwrap_or_else(|_| Err(Error::Invariant("write continuation dropped".into())));
        let ended = self.end_write();
        completed.and(ended)
    }

    /// Hand the current chunk to the sink and wait for that write.
    pub fn flush(&self) -> Result<()> {
        let inner = &self.inner;
        inner.ensure_open()?;
        inner.ensure_not_async_busy()?;

        let _fill = inner.fill_lock.lock();
        inner.ensure_open()?;
        inner.ensure_not_async_busy()?;
        inner.ring.check()?;
        if let Some(id) = inner.flush_head() {
            inner.ring.wait_for_write_complete(id)?;
        }
        inner.ring.check()
    }

    /// Flush buffered bytes, close the sink, wait for every write and return
    /// chunk storage to the pool. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }

    pub fn read(&self, _buf: &mut [u8]) -> Result<usize> {
        Err(Error::Unsupported("read"))
    }

    pub fn seek(&self, _pos: SeekFrom) -> Result<u64> {
        Err(Error::Unsupported("seek"))
    }

    pub fn position(&self) -> Result<u64> {
        Err(Error::Unsupported("position"))
    }

    pub fn set_position(&self, _pos: u64) -> Result<()> {
        Err(Error::Unsupported("set_position"))
    }

    pub fn set_len(&self, _len: u64) -> Result<()> {
        Err(Error::Unsupported("set_len"))
    }
}

impl Drop for SegmentedAsyncWriter {
    fn drop(&mut self) {
        if self.inner.state.load(Ordering::Acquire) == OPEN {
            if let Err(err) = self.inner.close() {
                warn!(writer = %self.inner.id, error = %err, "close on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for SegmentedAsyncWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentedAsyncWriter")
            .field("id", &self.inner.id)
            .field("config", &self.inner.config)
            .field("registered_chunks", &self.inner.ring.registered())
            .field("available_chunks", &self.inner.ring.available())
            .field("in_flight", &self.inner.ring.in_flight())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Inner {
    fn is_open(&self) -> bool {
        self.state.load(Ordering::Acquire) == OPEN
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::Closed)
        }
    }

    fn ensure_not_async_busy(&self) -> Result<()> {
        if self.async_in_progress.load(Ordering::Acquire) != 0 {
            return Err(Error::WriterBusy);
        }
        Ok(())
    }

    /// Register one more chunk if the ring has room. `Ok(false)` at capacity,
    /// or when the pool refuses storage and a registered chunk can be waited
    /// for instead.
    fn try_grow(&self) -> Result<bool> {
        let registered = self.ring.registered();
        if registered >= self.ring.capacity() {
            return Ok(false);
        }
        let chunk = match Chunk::new(
            ChunkId::from_index(registered),
            self.id,
            self.config.chunk_size,
            self.pool.as_deref(),
        ) {
            Ok(chunk) => chunk,
            // Part of the caller's buffer may already be accepted; every
            // registered chunk comes back from the sink, so wait for one.
            Err(Error::Pool(err)) if registered > 0 => {
                debug!(
                    writer = %self.id,
                    chunks = registered,
                    error = %err,
                    "pool refused a chunk; reusing registered chunks"
                );
                return Ok(false);
            }
            Err(err) => return Err(err),
        };
        self.ring.add(chunk)?;
        self.stats.record_chunk_allocated();
        debug!(writer = %self.id, chunks = registered + 1, "chunk allocated");
        Ok(true)
    }

    /// Copy as much of `src` as fits into the current chunk, flushing it if it
    /// fills up. `None` if no chunk is available.
    ///
    /// Only the producer, under `fill_lock`, takes the head, so the copy runs
    /// with the ring unlocked and completions are never held up by it.
    fn fill_current(&self, src: &[u8]) -> Option<usize> {
        let mut chunk = self.ring.dequeue()?;
        let copied = chunk.free_bytes().min(src.len());
        debug_assert!(copied > 0 || src.is_empty(), "current chunk is full");
        chunk.copy_in(&src[..copied]);
        let full = chunk.free_bytes() == 0;
        self.ring.restore_head(chunk);
        self.stats.record_accepted(copied);
        if full {
            self.flush_head();
        }
        Some(copied)
    }

    /// Caller holds `fill_lock`.
    fn write_blocking(&self, mut rest: &[u8]) -> Result<()> {
        while !rest.is_empty() {
            self.ring.check()?;
            match self.fill_current(rest) {
                Some(n) => rest = &rest[n..],
                None => {
                    if !self.try_grow()? {
                        self.stats.record_stall();
                        trace!(writer = %self.id, "all chunks in flight; waiting");
                        self.ring.wait_for_any()?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Caller holds `fill_lock`. Never blocks.
    fn fill_nonblocking(&self, data: &mut Bytes) -> Fill {
        loop {
            if let Err(err) = self.ring.check() {
                return Fill::Done(Err(err));
            }
            if data.is_empty() {
                return Fill::Done(Ok(()));
            }
            match self.fill_current(data) {
                Some(n) => data.advance(n),
                None => match self.try_grow() {
                    Ok(true) => {}
                    Ok(false) => return Fill::NeedChunk,
                    Err(err) => return Fill::Done(Err(err)),
                },
            }
        }
    }

    /// Drive `op` until it finishes or parks in the ring.
    fn run_async(&self, mut op: AsyncWriteOp) -> WriteStatus {
        let fill = self.fill_lock.lock();
        if op.fresh && !self.is_open() {
            drop(fill);
            self.finish_async(op, Err(Error::Closed));
            return WriteStatus::Completed;
        }
        op.fresh = false;

        loop {
            match self.fill_nonblocking(&mut op.data) {
                Fill::Done(result) => {
                    drop(fill);
                    self.finish_async(op, result);
                    return WriteStatus::Completed;
                }
                Fill::NeedChunk => match self.ring.try_mark_pending_completion(op) {
                    Ok(()) => {
                        self.stats.record_park();
                        trace!(writer = %self.id, "asynchronous write parked");
                        return WriteStatus::Queued;
                    }
                    // A completion slipped in; keep going.
                    Err(returned) => op = returned,
                },
            }
        }
    }

    fn finish_async(&self, op: AsyncWriteOp, result: Result<()>) {
        self.ring.finish_async_op();
        (op.continuation)(result);
    }

    fn completion(&self) -> CompletionFn {
        let this = self.this.clone();
        Box::new(move |chunk| match this.upgrade() {
            Some(inner) => inner.on_flush_complete(chunk),
            None => trace!(chunk = %chunk.id(), "writer gone; dropping chunk"),
        })
    }

    /// Hand the head chunk to the sink if it holds data.
    fn flush_head(&self) -> Option<ChunkId> {
        let chunk = self.ring.dequeue_for_flush()?;
        let id = chunk.id();
        let len = chunk.len();
        trace!(writer = %self.id, chunk = %id, len, "flush issued");
        match chunk.flush_async(self.sink.as_ref(), self.completion()) {
            Flush::Issued(status) => {
                self.stats
                    .record_flush_issued(len, status == WriteStatus::Completed);
            }
            Flush::Skipped(chunk) => self.ring.enqueue(chunk),
        }
        Some(id)
    }

    fn on_flush_complete(&self, chunk: Chunk) {
        self.stats.record_flush_completed();
        self.ring.enqueue(chunk);
        if let Some(op) = self.ring.try_claim_pending_completion() {
            trace!(writer = %self.id, "resuming parked write");
            self.run_async(op);
        }
    }

    fn close(&self) -> Result<()> {
        if self
            .state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let fill = loop {
            let guard = self.fill_lock.lock();
            if self.ring.async_idle() {
                break guard;
            }
            drop(guard);
            self.ring.wait_async_idle();
        };

        if self.ring.check().is_ok() {
            self.flush_head();
        }

        let mut result = Ok(());
        if let Err(err) = self.sink.close() {
            warn!(writer = %self.id, error = %err, "sink close failed");
            result = Err(Error::from(err));
        }

        self.ring.drain_wait_all();
        self.release_chunks();
        self.state.store(CLOSED, Ordering::Release);
        drop(fill);

        let stats = self.stats.snapshot();
        debug!(
            writer = %self.id,
            bytes = stats.bytes_accepted,
            flushes = stats.flushes_issued,
            stalls = stats.stalls,
            "writer closed"
        );

        self.ring.check().and(result)
    }

    fn release_chunks(&self) {
        debug_assert_eq!(self.ring.in_flight(), 0, "tearing down with writes in flight");
        while let Some(chunk) = self.ring.dequeue() {
            let id = chunk.id();
            let storage = chunk.into_storage();
            if let Some(pool) = &self.pool {
                if let Err(err) = pool.give_back(storage) {
                    warn!(writer = %self.id, chunk = %id, error = %err, "chunk storage not returned");
                }
            }
        }
    }
}
