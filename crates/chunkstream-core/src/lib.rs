#![forbid(unsafe_code)]
//! chunkstream-core: configuration, identifiers, budget interfaces and errors.
//!
//! Everything here is plain data or a trait. The pool lives in
//! `chunkstream-mem` and the writer in `chunkstream-io`; both depend on this
//! crate so they agree on configuration and ids without depending on each
//! other's internals.

pub mod budget;
pub mod config;
pub mod error;
pub mod id;
pub mod prelude;

pub use config::{PoolConfig, WriterConfig};
pub use error::{Error, Result};
pub use id::{ChunkId, PoolId, WriterId};
