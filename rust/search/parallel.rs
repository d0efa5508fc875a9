use anyhow::{anyhow, Result};
use ndarray::ArrayView2;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

use crate::config::Configuration;
use crate::engine::{RankRequest, RankingBackend, WarpConfig};
use crate::search::loader::LoadedIndex;
use crate::search::scorer::{WarpPipeline, DEFAULT_K};
use crate::utils::tracker::Tracker;
use crate::utils::types::{PassageId, Score};

/// WARP scorer that spreads query tokens over its own rayon pool.
///
/// Returns exactly what [`WarpScorer`](crate::search::WarpScorer) returns
/// for the same inputs.
pub struct ParallelWarpScorer {
    pipeline: WarpPipeline,
    thread_pool: ThreadPool,
}

impl ParallelWarpScorer {
    pub fn new(index: Arc<LoadedIndex>, warp: &WarpConfig, num_threads: usize) -> Result<Self> {
        let thread_pool = ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(|i| format!("warp-rank-{i}"))
            .build()
            .map_err(|e| anyhow!("Failed to build ranking thread pool: {}", e))?;

        Ok(Self {
            pipeline: WarpPipeline::new(index, warp),
            thread_pool,
        })
    }

    pub fn num_threads(&self) -> usize {
        self.thread_pool.current_num_threads()
    }
}

impl RankingBackend for ParallelWarpScorer {
    fn name(&self) -> &'static str {
        "warp-parallel"
    }

    fn dim(&self) -> usize {
        self.pipeline.index.dim()
    }

    fn rank(
        &self,
        config: &Configuration,
        query: ArrayView2<'_, f32>,
        request: &RankRequest<'_>,
        tracker: &mut dyn Tracker,
    ) -> Result<(Vec<PassageId>, Vec<Score>)> {
        let k = request.k.unwrap_or(DEFAULT_K);
        let selected = self.pipeline.select(config, query, k, tracker)?;

        tracker.begin("Decompression");
        let pipeline = &self.pipeline;
        let strides = self.thread_pool.install(|| {
            selected
                .tokens
                .par_iter()
                .map(|cells| pipeline.token_stride(cells, query, request))
                .collect::<Result<Vec<_>>>()
        })?;
        tracker.end("Decompression");

        Ok(WarpPipeline::finish(&selected, strides, k, tracker))
    }
}
