//! Shared test sinks.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chunkstream::{PendingWrite, Sink, WriteStatus};
use parking_lot::Mutex;

#[derive(Default)]
struct ManualState {
    pending: VecDeque<PendingWrite>,
    written: Vec<u8>,
    sizes: Vec<usize>,
    closed: bool,
}

/// Sink that queues every write until the test completes it.
///
/// `close` completes whatever is still queued, successfully.
#[derive(Clone, Default)]
pub struct ManualSink {
    state: Arc<Mutex<ManualState>>,
}

impl ManualSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    pub fn write_sizes(&self) -> Vec<usize> {
        self.state.lock().sizes.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Data of every queued write, oldest first.
    pub fn pending_data(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .pending
            .iter()
            .map(|w| w.data().to_vec())
            .collect()
    }

    /// Complete the oldest queued write successfully. Returns false if none.
    pub fn complete_next(&self) -> bool {
        self.finish_next(Ok(()))
    }

    /// Fail the oldest queued write. Returns false if none.
    pub fn fail_next(&self, kind: io::ErrorKind, msg: &str) -> bool {
        self.finish_next(Err(io::Error::new(kind, msg.to_string())))
    }

    pub fn complete_all(&self) {
        while self.complete_next() {}
    }

    /// Block until at least `n` writes are queued.
    pub fn wait_pending(&self, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.pending() < n {
            assert!(Instant::now() < deadline, "timed out waiting for {n} queued writes");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn finish_next(&self, result: io::Result<()>) -> bool {
        // Completion may start another write on this sink; never hold the lock.
        let write = {
            let mut st = self.state.lock();
            let Some(write) = st.pending.pop_front() else {
                return false;
            };
            if result.is_ok() {
                st.written.extend_from_slice(write.data());
                st.sizes.push(write.len());
            }
            write
        };
        write.complete(result);
        true
    }
}

impl Sink for ManualSink {
    fn start_write(&self, write: PendingWrite) -> WriteStatus {
        self.state.lock().pending.push_back(write);
        WriteStatus::Queued
    }

    fn close(&self) -> io::Result<()> {
        self.state.lock().closed = true;
        self.complete_all();
        Ok(())
    }
}

/// `Write` target whose bytes stay observable after it is moved into a sink.
#[derive(Clone, Default)]
pub struct SharedBuf {
    inner: Arc<Mutex<Vec<u8>>>,
    flushes: Arc<Mutex<usize>>,
}

impl SharedBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().clone()
    }

    pub fn flush_count(&self) -> usize {
        *self.flushes.lock()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        *self.flushes.lock() += 1;
        Ok(())
    }
}

/// `Write` target that accepts `limit` bytes and then fails every call.
pub struct FailAfter {
    pub limit: usize,
    pub written: SharedBuf,
}

impl Write for FailAfter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let so_far = self.written.contents().len();
        if so_far >= self.limit {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset"));
        }
        let n = buf.len().min(self.limit - so_far);
        self.written.write(&buf[..n])
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
