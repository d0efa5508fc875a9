//! On-disk index format and the index store consumed by the searcher.
//!
//! An index directory contains:
//!
//! | file | content |
//! |---|---|
//! | `metadata.json` | [`IndexMetadata`], including the embedded `config` |
//! | `centroids.bin` | `[num_centroids, dim]` little-endian f32, row-major |
//! | `embeddings.bin` | `[num_embeddings, dim]` little-endian f32, in passage order |
//! | `doclens.json` | embeddings per passage, indexed by passage id |
//! | `ivf.bin` | little-endian u32 embedding ids grouped by centroid |
//! | `ivf_lengths.json` | number of ivf entries per centroid |

pub mod create;
pub mod storage;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use crate::config::resolver::read_embedded_config;
use crate::config::Configuration;
use crate::engine::{ComputeDevice, EngineSelection, EngineVariant, RankingBackend};
use crate::search::{IndexLoader, ParallelWarpScorer, PlaidScorer, WarpScorer};

pub use create::{create_index, sample_centroids};

pub const METADATA_FILE: &str = "metadata.json";
pub const CENTROIDS_FILE: &str = "centroids.bin";
pub const EMBEDDINGS_FILE: &str = "embeddings.bin";
pub const DOCLENS_FILE: &str = "doclens.json";
pub const IVF_FILE: &str = "ivf.bin";
pub const IVF_LENGTHS_FILE: &str = "ivf_lengths.json";

pub const INDEX_VERSION: &str = "warp-searcher-1";

/// Index metadata stored alongside the index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub num_passages: usize,
    pub num_embeddings: usize,
    pub num_centroids: usize,
    pub dim: usize,
    pub created_at: String,
    pub index_version: String,
    #[serde(default)]
    pub config: Configuration,
}

/// Source of index configuration and ranking backends.
pub trait IndexStore {
    /// Configuration embedded in the index at `index_path`.
    fn load_config(&self, index_path: &Path) -> Result<Configuration>;

    /// Construct the selected backend bound to the index at `index_path`.
    fn open_backend(
        &self,
        index_path: &Path,
        selection: &EngineSelection,
    ) -> Result<Box<dyn RankingBackend>>;
}

/// Index store backed by the directory layout above, serving the built-in
/// backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskIndexStore;

impl IndexStore for DiskIndexStore {
    fn load_config(&self, index_path: &Path) -> Result<Configuration> {
        read_embedded_config(&index_path.join(METADATA_FILE))
    }

    fn open_backend(
        &self,
        index_path: &Path,
        selection: &EngineSelection,
    ) -> Result<Box<dyn RankingBackend>> {
        if selection.device == ComputeDevice::Gpu {
            warn!("GPU compute requested; built-in ranking engines run on the host");
        }

        let index = Arc::new(IndexLoader::new(index_path, selection.load_with_mmap)?.load()?);

        let backend: Box<dyn RankingBackend> = match &selection.variant {
            EngineVariant::Baseline => Box::new(PlaidScorer::new(index)),
            EngineVariant::SingleWorker { warp } => Box::new(WarpScorer::new(index, warp)),
            EngineVariant::MultiWorker { warp, num_threads } => {
                Box::new(ParallelWarpScorer::new(index, warp, *num_threads)?)
            },
        };
        Ok(backend)
    }
}
