//! Sink that writes on a dedicated thread.
//!
//! Writes are queued on an unbounded tokio channel and drained in order by a
//! worker thread that owns the underlying `std::io::Write`. Every write is
//! completed from the worker thread, so the producer never blocks on I/O.
//!
//! After the first failed write the worker stops touching the destination
//! and fails every later write with the same error kind.

use std::io::{self, Write};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::sink::{PendingWrite, Sink, WriteStatus};

enum Job {
    Write(PendingWrite),
    Finish,
}

pub struct ThreadedSink {
    tx: Mutex<Option<UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<io::Result<()>>>>,
}

impl ThreadedSink {
    /// Spawn the worker thread that owns `dest`.
    pub fn spawn<W>(dest: W) -> io::Result<Self>
    where
        W: Write + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = thread::Builder::new()
            .name("chunkstream-sink".into())
            .spawn(move || run(rx, dest))?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }
}

fn run<W: Write>(mut rx: UnboundedReceiver<Job>, mut dest: W) -> io::Result<()> {
    let mut failure: Option<(io::ErrorKind, String)> = None;

    while let Some(job) = rx.blocking_recv() {
        match job {
            Job::Write(write) => {
                let result = match &failure {
                    Some((kind, msg)) => Err(io::Error::new(*kind, msg.clone())),
                    None => dest.write_all(write.data()),
                };
                if let (Err(err), None) = (&result, &failure) {
                    failure = Some((err.kind(), err.to_string()));
                }
                write.complete(result);
            }
            Job::Finish => break,
        }
    }

    match failure {
        Some((kind, msg)) => Err(io::Error::new(kind, msg)),
        None => dest.flush(),
    }
}

impl Sink for ThreadedSink {
    fn start_write(&self, write: PendingWrite) -> WriteStatus {
        let tx = self.tx.lock();
        let rejected = match tx.as_ref() {
            Some(tx) => match tx.send(Job::Write(write)) {
                Ok(()) => return WriteStatus::Queued,
                Err(mpsc::error::SendError(job)) => job,
            },
            None => Job::Write(write),
        };
        drop(tx);

        if let Job::Write(write) = rejected {
            write.complete(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "sink worker is gone",
            )));
        }
        WriteStatus::Completed
    }

    /// Drain queued writes, flush the destination and join the worker.
    /// Later calls return `Ok(())`.
    fn close(&self) -> io::Result<()> {
        if let Some(tx) = self.tx.lock().take() {
            // A closed channel means the worker already exited; join reports why.
            let _ = tx.send(Job::Finish);
        }
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };
        worker
            .join()
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "sink worker panicked")))
    }
}

impl Drop for ThreadedSink {
    fn drop(&mut self) {
        // Dropping the sender lets the worker finish on its own; never join here
        // since the last handle may be released from the worker thread itself.
        self.tx.get_mut().take();
    }
}
