#![forbid(unsafe_code)]
//! chunkstream-io: the segmented asynchronous writer and its sinks.
//!
//! [`SegmentedAsyncWriter`] stages bytes in a bounded ring of fixed-size
//! chunks and hands each full chunk to a [`Sink`]. Sinks may finish writes
//! inline or from another thread; completions recycle chunks and wake the
//! producer. A failed sink write is sticky: every later call on that writer
//! reports it.
//!
//! ```
//! use chunkstream_core::WriterConfig;
//! use chunkstream_io::{MemorySink, SegmentedAsyncWriter};
//!
//! let sink = MemorySink::new();
//! let writer = SegmentedAsyncWriter::new(sink.clone(), WriterConfig::new(4, 2)).unwrap();
//! writer.write(&[1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();
//! writer.close().unwrap();
//! assert_eq!(sink.write_sizes(), vec![4, 4, 1]);
//! ```

mod chunk;
pub mod error;
pub mod metrics;
mod ring;
pub mod sink;
pub mod sinks;
mod stream;
pub mod writer;

pub use error::{Error, Result};
pub use metrics::WriterStatsSnapshot;
pub use sink::{PendingWrite, Sink, WriteStatus};
pub use sinks::{MemorySink, ThreadedSink};
pub use writer::SegmentedAsyncWriter;
