//! Writer and pool configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Upper bound on `WriterConfig::max_chunks`.
pub const MAX_CHUNKS_LIMIT: usize = 1 << 16;

/// Upper bound on `WriterConfig::chunk_size` (1 GiB).
pub const MAX_CHUNK_SIZE: usize = 1 << 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Capacity of a single chunk in bytes. A chunk is flushed to the sink as
    /// one write as soon as it is full.
    pub chunk_size: usize,

    /// Maximum number of chunks the writer may ever register (filling,
    /// in flight, or standing by). Bounds heap chunk storage to
    /// `chunk_size * max_chunks`; a pool may round each chunk up, see
    /// [`WriterConfig::pooled_storage_bound`].
    pub max_chunks: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            max_chunks: 4,
        }
    }
}

impl WriterConfig {
    pub fn new(chunk_size: usize, max_chunks: usize) -> Self {
        Self {
            chunk_size,
            max_chunks,
        }
    }

    /// Reject configurations the writer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than zero".into()));
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::Config(format!(
                "chunk_size {} exceeds the maximum of {} bytes",
                self.chunk_size, MAX_CHUNK_SIZE
            )));
        }
        if self.max_chunks == 0 {
            return Err(Error::Config("max_chunks must be greater than zero".into()));
        }
        if self.max_chunks > MAX_CHUNKS_LIMIT {
            return Err(Error::Config(format!(
                "max_chunks {} exceeds the maximum of {}",
                self.max_chunks, MAX_CHUNKS_LIMIT
            )));
        }
        Ok(())
    }

    /// Upper bound on heap-allocated chunk storage this configuration can
    /// ever hold.
    pub fn storage_bound(&self) -> usize {
        self.chunk_size.saturating_mul(self.max_chunks)
    }

    /// Upper bound on the bytes a pool configured by `pool` charges for this
    /// writer's chunks. Each chunk costs a whole bucket.
    pub fn pooled_storage_bound(&self, pool: &PoolConfig) -> usize {
        pool.charged_size(self.chunk_size).saturating_mul(self.max_chunks)
    }

    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `CHUNKSTREAM_CHUNK_SIZE`: chunk capacity in bytes
    /// - `CHUNKSTREAM_MAX_CHUNKS`: maximum number of chunks per writer
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_parse::<usize>("CHUNKSTREAM_CHUNK_SIZE") {
            cfg.chunk_size = v;
        }

        if let Some(v) = env_parse::<usize>("CHUNKSTREAM_MAX_CHUNKS") {
            cfg.max_chunks = v;
        }

        cfg
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// How many idle buffers each size bucket keeps for reuse.
    pub max_retained_per_bucket: usize,

    /// Smallest bucket size; smaller requests are rounded up to it.
    pub min_bucket_size: usize,

    /// Requests above this size bypass the buckets and are never retained.
    pub max_pooled_size: usize,

    /// Optional hard cap on bytes held by the pool (outstanding + retained).
    pub budget_bytes: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_retained_per_bucket: 16,
            min_bucket_size: 256,
            max_pooled_size: 16 * 1024 * 1024,
            budget_bytes: None,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_bucket_size == 0 || !self.min_bucket_size.is_power_of_two() {
            return Err(Error::Config(format!(
                "min_bucket_size must be a non-zero power of two, got {}",
                self.min_bucket_size
            )));
        }
        if self.max_pooled_size < self.min_bucket_size {
            return Err(Error::Config(format!(
                "max_pooled_size {} is smaller than min_bucket_size {}",
                self.max_pooled_size, self.min_bucket_size
            )));
        }
        Ok(())
    }

    /// Size of the buffer handed out for a `size`-byte request: the next power
    /// of two (at least `min_bucket_size`), or `size` itself above
    /// `max_pooled_size`.
    pub fn charged_size(&self, size: usize) -> usize {
        if size == 0 || size > self.max_pooled_size {
            return size;
        }
        size.max(self.min_bucket_size).next_power_of_two()
    }

    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `CHUNKSTREAM_POOL_MAX_RETAINED`: idle buffers kept per bucket
    /// - `CHUNKSTREAM_POOL_MIN_BUCKET`: smallest bucket size in bytes
    /// - `CHUNKSTREAM_POOL_MAX_POOLED`: largest pooled request in bytes
    /// - `CHUNKSTREAM_POOL_BUDGET_BYTES`: hard byte cap for the pool
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_parse::<usize>("CHUNKSTREAM_POOL_MAX_RETAINED") {
            cfg.max_retained_per_bucket = v;
        }

        if let Some(v) = env_parse::<usize>("CHUNKSTREAM_POOL_MIN_BUCKET") {
            cfg.min_bucket_size = v;
        }

        if let Some(v) = env_parse::<usize>("CHUNKSTREAM_POOL_MAX_POOLED") {
            cfg.max_pooled_size = v;
        }

        if let Some(v) = env_parse::<usize>("CHUNKSTREAM_POOL_BUDGET_BYTES") {
            cfg.budget_bytes = Some(v);
        }

        cfg
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
}
