//! Fixed-capacity FIFO of chunks shared between the producer and sink
//! completions.
//!
//! One mutex guards the slots, live count, waiter slot, in-flight markers and
//! sticky error. Completions only ever take this lock, never the writer's
//! fill lock, so a completion can run inline inside `Sink::start_write`.
//!
//! The waiter slot holds at most one of:
//! - a blocked producer thread (`wait_for_any`), or
//! - a parked asynchronous operation (`try_mark_pending_completion`).
//!
//! A parked operation is moved *into* the ring only while the ring is empty,
//! and moved back out by the first completion that finds a chunk available.
//! Whoever holds the operation value is the only party allowed to resume it.

use chunkstream_core::id::ChunkId;
use parking_lot::{Condvar, MappedMutexGuard, Mutex, MutexGuard};

use crate::chunk::Chunk;
use crate::error::{Error, Result};

enum Waiter<T> {
    Idle,
    Blocked,
    Parked(T),
}

struct RingState<T> {
    slots: Box<[Option<Chunk>]>,
    head: usize,
    live: usize,
    registered: usize,
    in_flight: Box<[bool]>,
    in_flight_count: usize,
    waiter: Waiter<T>,
    error: Option<Error>,
    async_ops: usize,
}

impl<T> RingState<T> {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn push_tail(&mut self, chunk: Chunk) {
        let tail = (self.head + self.live) % self.capacity();
        debug_assert!(self.slots[tail].is_none(), "ring tail slot occupied");
        self.slots[tail] = Some(chunk);
        self.live += 1;
    }

    fn pop_head(&mut self) -> Option<Chunk> {
        if self.live == 0 {
            return None;
        }
        let chunk = self.slots[self.head].take();
        debug_assert!(chunk.is_some(), "live ring head slot empty");
        self.head = (self.head + 1) % self.capacity();
        self.live -= 1;
        chunk
    }

    fn check(&self) -> Result<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

pub(crate) struct ChunkRing<T> {
    state: Mutex<RingState<T>>,
    cond: Condvar,
}

impl<T> ChunkRing<T> {
    /// Empty ring; every slot starts out unregistered.
    pub(crate) fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            state: Mutex::new(RingState {
                slots: (0..capacity).map(|_| None).collect(),
                head: 0,
                live: 0,
                registered: 0,
                in_flight: vec![false; capacity].into_boxed_slice(),
                in_flight_count: 0,
                waiter: Waiter::Idle,
                error: None,
                async_ops: 0,
            }),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.state.lock().capacity()
    }

    /// Chunks ever added. Never exceeds `capacity()`.
    pub(crate) fn registered(&self) -> usize {
        self.state.lock().registered
    }

    /// Chunks currently available for filling.
    pub(crate) fn available(&self) -> usize {
        self.state.lock().live
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.state.lock().in_flight_count
    }

    /// Register a brand-new chunk and make it available.
    pub(crate) fn add(&self, chunk: Chunk) -> Result<()> {
        let mut st = self.state.lock();
        if st.registered >= st.capacity() {
            return Err(Error::Invariant(format!(
                "ring already holds its {} chunks",
                st.capacity()
            )));
        }
        if chunk.id().index() >= st.capacity() {
            return Err(Error::Invariant(format!(
                "{} does not fit a ring of {} slots",
                chunk.id(),
                st.capacity()
            )));
        }
        st.registered += 1;
        st.push_tail(chunk);
        Ok(())
    }

    pub(crate) fn dequeue(&self) -> Option<Chunk> {
        self.state.lock().pop_head()
    }

    /// Put a chunk taken with `dequeue` back in front of every chunk that
    /// was enqueued since.
    pub(crate) fn restore_head(&self, chunk: Chunk) {
        let mut st = self.state.lock();
        let capacity = st.capacity();
        st.head = (st.head + capacity - 1) % capacity;
        let head = st.head;
        debug_assert!(st.slots[head].is_none(), "ring head slot occupied");
        st.slots[head] = Some(chunk);
        st.live += 1;
    }

    /// Dequeue the head only if it holds data, marking it in flight in the
    /// same critical section so a completion can never race the marker.
    pub(crate) fn dequeue_for_flush(&self) -> Option<Chunk> {
        let mut st = self.state.lock();
        if st.live == 0 || st.slots[st.head].as_ref().map_or(true, |c| c.is_empty()) {
            return None;
        }
        let chunk = st.pop_head()?;
        let index = chunk.id().index();
        st.in_flight[index] = true;
        st.in_flight_count += 1;
        Some(chunk)
    }

    /// Return a chunk as available. The first chunk error seen becomes the
    /// ring's sticky error.
    pub(crate) fn enqueue(&self, chunk: Chunk) {
        let mut st = self.state.lock();
        if st.error.is_none() {
            if let Some(err) = chunk.error() {
                st.error = Some(err.clone());
            }
        }
        let index = chunk.id().index();
        if st.in_flight[index] {
            st.in_flight[index] = false;
            st.in_flight_count -= 1;
        }
        st.push_tail(chunk);
        drop(st);
        self.cond.notify_all();
    }

    /// Peek the head chunk for filling in place.
    pub(crate) fn current(&self) -> Option<MappedMutexGuard<'_, Chunk>> {
        MutexGuard::try_map(self.state.lock(), |st| {
            if st.live == 0 {
                return None;
            }
            let head = st.head;
            st.slots[head].as_mut()
        })
        .ok()
    }

    /// Block until a chunk is available. Fails with the sticky error if one
    /// is recorded, before or after waiting.
    pub(crate) fn wait_for_any(&self) -> Result<()> {
        let mut st = self.state.lock();
        loop {
            st.check()?;
            if st.live > 0 {
                return Ok(());
            }
            assert!(
                matches!(st.waiter, Waiter::Idle),
                "chunk ring already has a registered waiter"
            );
            st.waiter = Waiter::Blocked;
            self.cond.wait(&mut st);
            st.waiter = Waiter::Idle;
        }
    }

    /// Park `op` until a completion frees a chunk. Hands `op` straight back
    /// if a chunk is already available (or the ring has failed), in which
    /// case the producer must keep going itself.
    pub(crate) fn try_mark_pending_completion(&self, op: T) -> std::result::Result<(), T> {
        let mut st = self.state.lock();
        if st.live > 0 || st.error.is_some() {
            return Err(op);
        }
        assert!(
            matches!(st.waiter, Waiter::Idle),
            "chunk ring already has a registered waiter"
        );
        debug_assert!(st.in_flight_count > 0, "parking with nothing in flight");
        st.waiter = Waiter::Parked(op);
        Ok(())
    }

    /// Take the parked operation if there is one and a chunk is available.
    pub(crate) fn try_claim_pending_completion(&self) -> Option<T> {
        let mut st = self.state.lock();
        if st.live == 0 || !matches!(st.waiter, Waiter::Parked(_)) {
            return None;
        }
        match std::mem::replace(&mut st.waiter, Waiter::Idle) {
            Waiter::Parked(op) => Some(op),
            _ => None,
        }
    }

    /// Block until the write of chunk `id` has completed.
    pub(crate) fn wait_for_write_complete(&self, id: ChunkId) -> Result<()> {
        let mut st = self.state.lock();
        while st.in_flight[id.index()] {
            self.cond.wait(&mut st);
        }
        st.check()
    }

    /// Block until no registered chunk has a write in flight.
    pub(crate) fn drain_wait_all(&self) {
        let mut st = self.state.lock();
        while st.in_flight_count > 0 {
            self.cond.wait(&mut st);
        }
    }

    pub(crate) fn check(&self) -> Result<()> {
        self.state.lock().check()
    }

    pub(crate) fn begin_async_op(&self) {
        let mut st = self.state.lock();
        debug_assert_eq!(st.async_ops, 0, "overlapping asynchronous writes");
        st.async_ops += 1;
    }

    pub(crate) fn finish_async_op(&self) {
        let mut st = self.state.lock();
        st.async_ops = st.async_ops.saturating_sub(1);
        drop(st);
        self.cond.notify_all();
    }

    pub(crate) fn async_idle(&self) -> bool {
        self.state.lock().async_ops == 0
    }

    pub(crate) fn wait_async_idle(&self) {
        let mut st = self.state.lock();
        while st.async_ops > 0 {
            self.cond.wait(&mut st);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use chunkstream_core::id::WriterId;

    use super::*;

    fn chunk(index: usize, capacity: usize) -> Chunk {
        Chunk::new(ChunkId::from_index(index), WriterId::new(0), capacity, None).unwrap()
    }

    /// Fill the head, pull it for flushing, and finish the flush inline.
    fn cycle_head(ring: &ChunkRing<u32>, byte: u8, result: io::Result<()>) -> ChunkId {
        ring.current().unwrap().copy_in(&[byte]);
        let mut c = ring.dequeue_for_flush().unwrap();
        let id = c.id();
        c.begin_flush();
        c.finish_flush(result);
        ring.enqueue(c);
        id
    }

    #[test]
    fn test_add_respects_capacity() {
        let ring: ChunkRing<u32> = ChunkRing::new(2);
        ring.add(chunk(0, 4)).unwrap();
        ring.add(chunk(1, 4)).unwrap();
        assert_eq!(ring.registered(), 2);
        assert_eq!(ring.available(), 2);
        assert!(matches!(ring.add(chunk(1, 4)), Err(Error::Invariant(_))));
    }

    #[test]
    fn test_fifo_order() {
        let ring: ChunkRing<u32> = ChunkRing::new(3);
        for i in 0..3 {
            ring.add(chunk(i, 4)).unwrap();
        }
        let a = ring.dequeue().unwrap();
        let b = ring.dequeue().unwrap();
        assert_eq!(a.id().index(), 0);
        assert_eq!(b.id().index(), 1);

        ring.enqueue(a);
        assert_eq!(ring.dequeue().unwrap().id().index(), 2);
        assert_eq!(ring.dequeue().unwrap().id().index(), 0);
        assert!(ring.dequeue().is_none());
    }

    #[test]
    fn test_current_peeks_without_removing() {
        let ring: ChunkRing<u32> = ChunkRing::new(1);
        assert!(ring.current().is_none());
        ring.add(chunk(0, 4)).unwrap();
        ring.current().unwrap().copy_in(&[1, 2]);
        assert_eq!(ring.current().unwrap().len(), 2);
        assert_eq!(ring.available(), 1);
    }

    #[test]
    fn test_restore_head_goes_before_completions() {
        let ring: ChunkRing<u32> = ChunkRing::new(2);
        ring.add(chunk(0, 4)).unwrap();
        ring.add(chunk(1, 4)).unwrap();
        ring.current().unwrap().copy_in(&[1]);
        let in_flight = ring.dequeue_for_flush().unwrap();

        // Head taken out for filling while a completion comes back.
        let mut head = ring.dequeue().unwrap();
        assert_eq!(head.id().index(), 1);
        ring.enqueue(in_flight);
        head.copy_in(&[2, 3]);
        ring.restore_head(head);

        assert_eq!(ring.available(), 2);
        assert_eq!(ring.current().unwrap().len(), 2);
        assert_eq!(ring.dequeue().unwrap().id().index(), 1);
        assert_eq!(ring.dequeue().unwrap().id().index(), 0);
    }

    #[test]
    fn test_dequeue_for_flush_skips_empty_head() {
        let ring: ChunkRing<u32> = ChunkRing::new(1);
        ring.add(chunk(0, 4)).unwrap();
        assert!(ring.dequeue_for_flush().is_none());
        ring.current().unwrap().copy_in(&[9]);
        let c = ring.dequeue_for_flush().unwrap();
        assert_eq!(ring.in_flight(), 1);
        ring.enqueue(c);
        assert_eq!(ring.in_flight(), 0);
    }

    #[test]
    fn test_first_error_wins() {
        let ring: ChunkRing<u32> = ChunkRing::new(2);
        ring.add(chunk(0, 4)).unwrap();
        ring.add(chunk(1, 4)).unwrap();

        cycle_head(&ring, 1, Err(io::Error::new(io::ErrorKind::Other, "first")));
        cycle_head(&ring, 2, Err(io::Error::new(io::ErrorKind::Other, "second")));

        let err = ring.check().unwrap_err();
        assert!(err.to_string().contains("first"));
        assert!(ring.wait_for_any().is_err(), "sticky error beats availability");
    }

    #[test]
    fn test_mark_refused_while_chunk_available() {
        let ring: ChunkRing<u32> = ChunkRing::new(1);
        ring.add(chunk(0, 4)).unwrap();
        assert_eq!(ring.try_mark_pending_completion(7), Err(7));
        assert!(ring.try_claim_pending_completion().is_none());
    }

    #[test]
    fn test_mark_then_claim_hands_back_op_once() {
        let ring: ChunkRing<u32> = ChunkRing::new(1);
        ring.add(chunk(0, 4)).unwrap();
        ring.current().unwrap().copy_in(&[1]);
        let c = ring.dequeue_for_flush().unwrap();

        assert_eq!(ring.try_mark_pending_completion(7), Ok(()));
        // Nothing available yet.
        assert!(ring.try_claim_pending_completion().is_none());

        ring.enqueue(c);
        assert_eq!(ring.try_claim_pending_completion(), Some(7));
        assert!(ring.try_claim_pending_completion().is_none());
    }

    #[test]
    #[should_panic(expected = "already has a registered waiter")]
    fn test_second_waiter_panics() {
        let ring: ChunkRing<u32> = ChunkRing::new(1);
        ring.add(chunk(0, 4)).unwrap();
        ring.current().unwrap().copy_in(&[1]);
        let _in_flight = ring.dequeue_for_flush().unwrap();
        ring.try_mark_pending_completion(1).unwrap();
        let _ = ring.try_mark_pending_completion(2);
    }

    #[test]
    fn test_wait_for_any_wakes_on_enqueue() {
        let ring: Arc<ChunkRing<u32>> = Arc::new(ChunkRing::new(1));
        ring.add(chunk(0, 4)).unwrap();
        ring.current().unwrap().copy_in(&[1]);
        let c = ring.dequeue_for_flush().unwrap();

        let waiter = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || ring.wait_for_any())
        };
        thread::sleep(Duration::from_millis(20));
        ring.enqueue(c);
        waiter.join().unwrap().unwrap();
        assert_eq!(ring.available(), 1);
    }

    #[test]
    fn test_drain_and_write_complete_wait_for_in_flight() {
        let ring: Arc<ChunkRing<u32>> = Arc::new(ChunkRing::new(2));
        ring.add(chunk(0, 4)).unwrap();
        ring.current().unwrap().copy_in(&[1]);
        let c = ring.dequeue_for_flush().unwrap();
        let id = c.id();

        let completer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                ring.enqueue(c);
            })
        };
        ring.wait_for_write_complete(id).unwrap();
        ring.drain_wait_all();
        assert_eq!(ring.in_flight(), 0);
        completer.join().unwrap();
    }

    #[test]
    fn test_dequeue_drains_ring() {
        let ring: ChunkRing<u32> = ChunkRing::new(3);
        ring.add(chunk(0, 4)).unwrap();
        ring.add(chunk(1, 4)).unwrap();
        assert_eq!(std::iter::from_fn(|| ring.dequeue()).count(), 2);
        assert_eq!(ring.available(), 0);
        assert!(ring.current().is_none());
    }
}
