//! Bundled [`Sink`](crate::sink::Sink) implementations.

mod memory;
mod threaded;

pub use memory::MemorySink;
pub use threaded::ThreadedSink;
