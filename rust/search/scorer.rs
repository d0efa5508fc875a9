use anyhow::{ensure, Result};
use ndarray::ArrayView2;
use std::sync::Arc;

use crate::config::Configuration;
use crate::engine::{RankRequest, RankingBackend, WarpConfig};
use crate::search::centroid_selector::CentroidSelector;
use crate::search::decompressor::CentroidDecompressor;
use crate::search::loader::LoadedIndex;
use crate::search::merger::{AnnotatedStrideView, ResultMerger};
use crate::utils::tracker::Tracker;
use crate::utils::types::{PassageId, Score, SelectedCentroids, TPrimePolicy, TokenCells};

/// Result count used when a request carries no `k`.
pub const DEFAULT_K: usize = 10;

/// Selection and decompression state shared by the single- and
/// multi-worker WARP scorers.
pub(crate) struct WarpPipeline {
    pub(crate) index: Arc<LoadedIndex>,
    pub(crate) warp: WarpConfig,
    t_prime_policy: TPrimePolicy,
    pub(crate) decompressor: CentroidDecompressor,
}

impl WarpPipeline {
    pub(crate) fn new(index: Arc<LoadedIndex>, warp: &WarpConfig) -> Self {
        let t_prime_policy =
            TPrimePolicy::for_index(warp.t_prime, index.num_embeddings(), index.num_centroids());
        let decompressor = CentroidDecompressor::new(index.dim());
        Self {
            index,
            warp: warp.clone(),
            t_prime_policy,
            decompressor,
        }
    }

    pub(crate) fn select(
        &self,
        config: &Configuration,
        query: ArrayView2<'_, f32>,
        k: usize,
        tracker: &mut dyn Tracker,
    ) -> Result<SelectedCentroids> {
        ensure!(
            query.ncols() == self.index.dim(),
            "Query embedding dim ({}) does not match index dim ({})",
            query.ncols(),
            self.index.dim()
        );
        let nprobe = config.ncells.unwrap_or(1);
        let selector = CentroidSelector::new(nprobe, self.t_prime_policy.clone(), self.warp.bound);

        tracker.begin("Candidate Generation");
        let selected = selector.select_centroids(query, &self.index, k);
        tracker.end("Candidate Generation");
        Ok(selected)
    }

    /// Per-passage max score of one token over its selected cells.
    pub(crate) fn token_stride(
        &self,
        cells: &TokenCells,
        query: ArrayView2<'_, f32>,
        request: &RankRequest<'_>,
    ) -> Result<AnnotatedStrideView> {
        let query_token = query.row(cells.token);
        if self.warp.fused_decompression_merge {
            self.decompressor
                .decompress_token_fused(cells, query_token, &self.index, &request.candidates)
        } else {
            self.decompressor
                .decompress_token(cells, query_token, &self.index, &request.candidates)
        }
    }

    pub(crate) fn finish(
        selected: &SelectedCentroids,
        strides: Vec<AnnotatedStrideView>,
        k: usize,
        tracker: &mut dyn Tracker,
    ) -> (Vec<PassageId>, Vec<Score>) {
        let mse: Vec<f32> = selected.tokens.iter().map(|t| t.mse_estimate).collect();

        tracker.begin("Merging");
        let merged = ResultMerger::merge_candidates_tokens(strides, &mse);
        tracker.end("Merging");

        tracker.begin("Top-k");
        let results = ResultMerger::partial_sort_results(&merged, k);
        tracker.end("Top-k");
        results
    }
}

/// Single-worker WARP scorer
pub struct WarpScorer {
    pipeline: WarpPipeline,
}

impl WarpScorer {
    pub fn new(index: Arc<LoadedIndex>, warp: &WarpConfig) -> Self {
        Self {
            pipeline: WarpPipeline::new(index, warp),
        }
    }
}

impl RankingBackend for WarpScorer {
    fn name(&self) -> &'static str {
        "warp"
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
        let strides = selected
            .tokens
            .iter()
            .map(|cells| self.pipeline.token_stride(cells, query, request))
            .collect::<Result<Vec<_>>>()?;
        tracker.end("Decompression");

        Ok(WarpPipeline::finish(&selected, strides, k, tracker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::create_index;
    use crate::search::IndexLoader;
    use crate::utils::tracker::{ExecutionTracker, NopTracker};
    use crate::utils::types::{CandidateFilter, CandidatePool};
    use ndarray::array;

    fn index() -> (tempfile::TempDir, Arc<LoadedIndex>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx");
        let documents = vec![
            array![[1.0f32, 0.0], [0.0, 1.0]],
            array![[1.0f32, 0.0]],
            array![[0.0f32, 1.0]],
        ];
        let centroids = array![[1.0f32, 0.0], [0.0, 1.0]];
        create_index(&path, &documents, centroids.view(), &Configuration::default()).unwrap();
        let index = IndexLoader::new(&path, false).unwrap().load().unwrap();
        (dir, Arc::new(index))
    }

    fn config() -> Configuration {
        Configuration::default().with_ncells(2)
    }

    #[test]
    fn scores_sum_over_tokens_with_imputation() {
        let (_dir, index) = index();
        let scorer = WarpScorer::new(index, &WarpConfig::default());
        let query = array![[1.0f32, 0.0], [0.0, 1.0], [0.0, 0.0]];
        let request = RankRequest {
            k: Some(3),
            ..RankRequest::default()
        };

        let (pids, scores) = scorer
            .rank(&config(), query.view(), &request, &mut NopTracker)
            .unwrap();
        // Passage 0 matches both tokens; 1 and 2 match one and get the
        // other token's estimate.
        assert_eq!(pids[0], 0);
        assert_eq!(scores[0], 2.0);
        assert_eq!(pids.len(), 3);
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn honours_k_and_candidates() {
        let (_dir, index) = index();
        let scorer = WarpScorer::new(index, &WarpConfig::default());
        let query = array![[1.0f32, 0.0], [0.0, 1.0]];
        let pool = CandidatePool::new([1, 2]);
        let request = RankRequest {
            k: Some(1),
            candidates: CandidateFilter::new(None, Some(&pool)),
        };

        let mut tracker = ExecutionTracker::default();
        let (pids, _) = scorer.rank(&config(), query.view(), &request, &mut tracker).unwrap();
        assert_eq!(pids.len(), 1);
        assert!(pids[0] == 1 || pids[0] == 2);
        assert!(tracker.total("Candidate Generation").is_some());
        assert!(tracker.total("Top-k").is_some());
    }

    #[test]
    fn rejects_wrong_query_dim() {
        let (_dir, index) = index();
        let scorer = WarpScorer::new(index, &WarpConfig::default());
        let query = array![[1.0f32, 0.0, 0.0]];
        assert!(scorer
            .rank(&config(), query.view(), &RankRequest::default(), &mut NopTracker)
            .is_err());
    }
}
