//! In-memory sink for tests.
//!
//! Completes every write inline and keeps the bytes plus the size of each
//! write so callers can check chunk boundaries.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::sink::{PendingWrite, Sink, WriteStatus};

#[derive(Default)]
struct MemoryState {
    data: Vec<u8>,
    writes: Vec<usize>,
    close_calls: usize,
}

/// Thread-safe in-memory sink. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, in order.
    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().data.clone()
    }

    /// Length of every write, in order.
    pub fn write_sizes(&self) -> Vec<usize> {
        self.state.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().writes.len()
    }

    pub fn len(&self) -> usize {
        self.state.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().close_calls > 0
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().close_calls
    }

    /// Drop recorded bytes and write sizes.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.data.clear();
        state.writes.clear();
    }
}

impl Sink for MemorySink {
    fn start_write(&self, write: PendingWrite) -> WriteStatus {
        let result = {
            let mut state = self.state.lock();
            if state.close_calls > 0 {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "memory sink is closed"))
            } else {
                state.data.extend_from_slice(write.data());
                state.writes.push(write.len());
                Ok(())
            }
        };
        write.complete(result);
        WriteStatus::Completed
    }

    fn close(&self) -> io::Result<()> {
        self.state.lock().close_calls += 1;
        Ok(())
    }
}
