//! Per-node configuration.
//!
//! One [`NodeConfig`] is built at startup and handed to the node's pipeline;
//! it does not change afterwards.

use anyhow::{ensure, Context, Result};
use std::env;

use crate::item::Layout;

/// Default size of one map input chunk (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 0x10_0000;

/// Environment variable overriding the map input chunk size, in bytes.
pub const CHUNK_SIZE_ENV: &str = "MAP_CHUNK_SIZE";

/// Histograms sample roughly this many entries per map node.
pub const DEFAULT_HISTOGRAM_DENSITY: usize = 100;

/// Shuffle output is written out once the send buffer grows past this (16 MiB).
pub const DEFAULT_SEND_BUFFER: usize = 0x100_0000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NodeConfig {
    pub layout: Layout,
    /// Bytes of map input handed to the map function at once.
    pub chunk_size: usize,
    pub histogram_density: usize,
    pub send_buffer: usize,
}

impl NodeConfig {
    pub fn new(layout: Layout) -> Result<Self> {
        let config = Self {
            layout,
            chunk_size: DEFAULT_CHUNK_SIZE,
            histogram_density: DEFAULT_HISTOGRAM_DENSITY,
            send_buffer: DEFAULT_SEND_BUFFER,
        };
        config.validate()?;
        Ok(config)
    }

    /// Like [`NodeConfig::new`], honouring `MAP_CHUNK_SIZE` when set.
    pub fn from_env(layout: Layout) -> Result<Self> {
        let config = Self::new(layout)?;
        match env::var(CHUNK_SIZE_ENV) {
            Ok(raw) => config.with_chunk_size(parse_chunk_size(&raw)?),
            Err(_) => Ok(config),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Result<Self> {
        self.chunk_size = chunk_size;
        self.validate()?;
        Ok(self)
    }

    pub fn with_histogram_density(mut self, density: usize) -> Result<Self> {
        self.histogram_density = density;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.layout.hash_size > 0, "Hash size must be positive");
        ensure!(self.chunk_size > 0, "Chunk size must be positive");
        ensure!(self.histogram_density > 0, "Histogram density must be positive");
        ensure!(self.send_buffer > 0, "Send buffer size must be positive");
        Ok(())
    }
}

fn parse_chunk_size(raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .with_context(|| format!("{}=`{}` is not a byte count", CHUNK_SIZE_ENV, raw))
}
