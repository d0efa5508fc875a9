// Engine module - the ranking backend contract and backend selection

pub mod selector;

use ndarray::ArrayView2;
use std::fmt;

use crate::config::Configuration;
use crate::utils::tracker::Tracker;
use crate::utils::types::{CandidateFilter, PassageId, Score};

pub use selector::{EngineSelection, EngineSelector};

/// Default bound on the centroids inspected per query token.
pub const DEFAULT_BOUND: usize = 128;

/// Per-call inputs of [`RankingBackend::rank`] besides the query itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct RankRequest<'a> {
    /// Requested result count. Only the advanced engines receive it; the
    /// baseline sizes its output from the breadth options instead.
    pub k: Option<usize>,
    pub candidates: CandidateFilter<'a>,
}

/// Scores candidate passages for one encoded query.
///
/// Implementations return parallel `(pids, scores)` of equal length sorted
/// by descending score. A backend instance serves one call at a time.
pub trait RankingBackend: Send {
    fn name(&self) -> &'static str;

    /// Embedding width of the bound index.
    fn dim(&self) -> usize;

    /// Rank passages for `query` (`[num_tokens, dim]`, padding rows all
    /// zero) using the breadth options of `config`.
    fn rank(
        &self,
        config: &Configuration,
        query: ArrayView2<'_, f32>,
        request: &RankRequest<'_>,
        tracker: &mut dyn Tracker,
    ) -> anyhow::Result<(Vec<PassageId>, Vec<Score>)>;
}

/// Where encoding and ranking are asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDevice {
    Cpu,
    Gpu,
}

impl ComputeDevice {
    pub fn from_config(config: &Configuration) -> Self {
        if config.use_gpu() {
            ComputeDevice::Gpu
        } else {
            ComputeDevice::Cpu
        }
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeDevice::Cpu => write!(f, "cpu"),
            ComputeDevice::Gpu => write!(f, "gpu"),
        }
    }
}

/// Tuning knobs that only the advanced (WARP) engine understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarpConfig {
    /// Cumulative cluster size used for the missing-similarity estimate;
    /// derived from the index size when unset
    pub t_prime: Option<usize>,
    /// Maximum number of centroids to inspect per token
    pub bound: usize,
    /// Decompress and merge each token's cells in a single pass
    pub fused_decompression_merge: bool,
}

impl Default for WarpConfig {
    fn default() -> Self {
        Self {
            t_prime: None,
            bound: DEFAULT_BOUND,
            fused_decompression_merge: false,
        }
    }
}

/// Which ranking engine the caller asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EngineRequest {
    /// Baseline scorer: centroid pruning followed by exact scoring
    #[default]
    Baseline,
    /// Advanced engine with its own tuning knobs
    Warp(WarpConfig),
}

/// Declared runtime concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub num_threads: usize,
}

impl Capabilities {
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads: num_threads.max(1),
        }
    }

    /// Use `num_threads` from the configuration, or the size of the global
    /// rayon pool.
    pub fn detect(config: &Configuration) -> Self {
        Self::new(config.num_threads.unwrap_or_else(rayon::current_num_threads))
    }
}

/// The backend variant chosen at construction. Fixed for the lifetime of
/// the searcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineVariant {
    Baseline,
    SingleWorker {
        warp: WarpConfig,
    },
    MultiWorker {
        warp: WarpConfig,
        num_threads: usize,
    },
}

impl EngineVariant {
    /// Whether the variant takes `k` (and the WARP knobs) directly.
    pub fn is_advanced(&self) -> bool {
        !matches!(self, EngineVariant::Baseline)
    }

    pub fn warp_config(&self) -> Option<&WarpConfig> {
        match self {
            EngineVariant::Baseline => None,
            EngineVariant::SingleWorker { warp } | EngineVariant::MultiWorker { warp, .. } => {
                Some(warp)
            },
        }
    }
}

impl fmt::Display for EngineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineVariant::Baseline => write!(f, "baseline"),
            EngineVariant::SingleWorker { .. } => write!(f, "warp (single worker)"),
            EngineVariant::MultiWorker {
                warp, num_threads, ..
            } => write!(
                f,
                "warp ({} workers{})",
                num_threads,
                if warp.fused_decompression_merge {
                    ", fused decompression-merge"
                } else {
                    ""
                }
            ),
        }
    }
}
