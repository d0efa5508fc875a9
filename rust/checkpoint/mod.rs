//! Query encoders and the checkpoint store that produces them.
//!
//! A checkpoint is a directory holding `checkpoint.json`:
//!
//! ```json
//! { "config": { "query_maxlen": 32 }, "encoder": { "kind": "hashing", "dim": 128, "seed": 0 } }
//! ```

pub mod hashing;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{info, warn};

use crate::config::resolver::read_embedded_config;
use crate::config::Configuration;
use crate::engine::ComputeDevice;
use crate::utils::types::QueryEmbeddings;

pub use hashing::HashingEncoder;

pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Per-call encoding options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Chunk size hint; `None` encodes everything in one pass
    pub bsize: Option<usize>,
    /// Token budget per query
    pub query_maxlen: usize,
    /// Never truncate; pad to the longest query (at least `query_maxlen`)
    pub full_length_search: bool,
}

/// Turns query texts into token embedding matrices.
pub trait QueryEncoder: Send {
    fn dim(&self) -> usize;

    /// Encode `queries` into `[queries.len(), num_tokens, dim]`, in input
    /// order. Padding token rows are all zero.
    fn encode(&self, queries: &[String], options: &EncodeOptions) -> Result<QueryEmbeddings>;
}

/// Source of checkpoint configuration and query encoders.
pub trait CheckpointStore {
    /// Configuration embedded in the checkpoint at `checkpoint`.
    fn load_config(&self, checkpoint: &Path) -> Result<Configuration>;

    /// Build the checkpoint's encoder for `device`.
    fn load_encoder(
        &self,
        checkpoint: &Path,
        config: &Configuration,
        device: ComputeDevice,
    ) -> Result<Box<dyn QueryEncoder>>;
}

/// Encoder description stored in a checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EncoderSpec {
    Hashing { dim: usize, seed: u64 },
}

/// Contents of `checkpoint.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointFile {
    #[serde(default)]
    pub config: Configuration,
    pub encoder: EncoderSpec,
}

impl CheckpointFile {
    pub fn hashing(dim: usize, seed: u64, config: Configuration) -> Self {
        Self {
            config: Configuration {
                dim: Some(dim),
                ..config
            },
            encoder: EncoderSpec::Hashing { dim, seed },
        }
    }

    pub fn build_encoder(&self) -> Result<Box<dyn QueryEncoder>> {
        match self.encoder {
            EncoderSpec::Hashing { dim, seed } => Ok(Box::new(HashingEncoder::new(dim, seed)?)),
        }
    }
}

pub fn write_checkpoint(checkpoint: &Path, contents: &CheckpointFile) -> Result<()> {
    std::fs::create_dir_all(checkpoint)
        .with_context(|| format!("Failed to create checkpoint directory {:?}", checkpoint))?;
    let path = checkpoint.join(CHECKPOINT_FILE);
    let file = File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), contents)
        .with_context(|| format!("Failed to write {:?}", path))?;
    info!(checkpoint = %checkpoint.display(), "Checkpoint written");
    Ok(())
}

pub fn read_checkpoint(checkpoint: &Path) -> Result<CheckpointFile> {
    let path = checkpoint.join(CHECKPOINT_FILE);
    let file = File::open(&path).with_context(|| format!("Failed to open {:?}", path))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {:?}", path))
}

/// Checkpoint store reading the directory layout above.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskCheckpointStore;

impl CheckpointStore for DiskCheckpointStore {
    fn load_config(&self, checkpoint: &Path) -> Result<Configuration> {
        read_embedded_config(&checkpoint.join(CHECKPOINT_FILE))
    }

    fn load_encoder(
        &self,
        checkpoint: &Path,
        config: &Configuration,
        device: ComputeDevice,
    ) -> Result<Box<dyn QueryEncoder>> {
        if device == ComputeDevice::Gpu {
            warn!("GPU-resident encoder requested; the hashing encoder runs on the host");
        }
        let encoder = read_checkpoint(checkpoint)?.build_encoder()?;
        if let Some(dim) = config.dim {
            if dim != encoder.dim() {
                bail!(
                    "Checkpoint {:?} encodes {}-dim vectors but the configuration expects {}",
                    checkpoint,
                    encoder.dim(),
                    dim
                );
            }
        }
        Ok(encoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_store_round_trips_config_and_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let contents = CheckpointFile::hashing(16, 3, Configuration::default().with_query_maxlen(8));
        write_checkpoint(dir.path(), &contents).unwrap();

        let store = DiskCheckpointStore;
        let config = store.load_config(dir.path()).unwrap();
        assert_eq!(config.query_maxlen, Some(8));
        assert_eq!(config.dim, Some(16));

        let encoder = store
            .load_encoder(dir.path(), &config, ComputeDevice::Cpu)
            .unwrap();
        assert_eq!(encoder.dim(), 16);
    }

    #[test]
    fn dim_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_checkpoint(dir.path(), &CheckpointFile::hashing(16, 0, Configuration::default()))
            .unwrap();
        let config = Configuration::default().with_dim(32);
        assert!(DiskCheckpointStore
            .load_encoder(dir.path(), &config, ComputeDevice::Gpu)
            .is_err());
    }

    #[test]
    fn missing_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DiskCheckpointStore.load_config(&dir.path().join("nope")).is_err());
    }
}
