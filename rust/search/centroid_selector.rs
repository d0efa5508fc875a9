use ndarray::{Array2, ArrayView2, Axis};
use std::cmp::Ordering;

use crate::engine::DEFAULT_BOUND;
use crate::search::loader::LoadedIndex;
use crate::utils::types::{is_padding, CentroidId, SelectedCentroids, TPrimePolicy, TokenCells};

/// WARP centroid selection for efficient top-k retrieval
#[derive(Debug, Clone, PartialEq)]
pub struct CentroidSelector {
    nprobe: usize,
    t_prime_policy: TPrimePolicy,
    bound: usize,
}

impl CentroidSelector {
    /// Create a new centroid selector. `bound` of zero falls back to
    /// [`DEFAULT_BOUND`].
    pub fn new(nprobe: usize, t_prime_policy: TPrimePolicy, bound: usize) -> Self {
        let bound = if bound == 0 { DEFAULT_BOUND } else { bound };
        Self {
            nprobe: nprobe.max(1),
            t_prime_policy,
            bound,
        }
    }

    /// Score every centroid against `query` and select per token.
    pub fn select_centroids(
        &self,
        query: ArrayView2<'_, f32>, // [num_tokens, dim]
        index: &LoadedIndex,
        k: usize,
    ) -> SelectedCentroids {
        let centroid_scores: Array2<f32> = query.dot(&index.centroids().t());
        let query_mask: Vec<bool> = query
            .axis_iter(Axis(0))
            .map(|row| match row.as_slice() {
                Some(values) => !is_padding(values),
                None => row.iter().any(|&v| v != 0.0),
            })
            .collect();
        self.select_centroids_with_scores(&query_mask, centroid_scores.view(), index, k)
    }

    /// Select top centroids using pre-computed scores
    pub fn select_centroids_with_scores(
        &self,
        query_mask: &[bool],                     // [num_tokens]
        centroid_scores: ArrayView2<'_, f32>,    // [num_tokens, num_centroids]
        index: &LoadedIndex,
        k: usize,
    ) -> SelectedCentroids {
        let num_centroids = centroid_scores.ncols();
        if num_centroids == 0 {
            return SelectedCentroids::default();
        }
        let bound = self.bound.min(num_centroids);
        let nprobe = self.nprobe.min(bound);
        let t_prime = self.t_prime_policy.value(k);

        let mut tokens = Vec::new();
        for (token, row) in centroid_scores.axis_iter(Axis(0)).enumerate() {
            if !query_mask.get(token).copied().unwrap_or(false) {
                continue;
            }
            let query_scores: Vec<f32> = row.to_vec();
            let by_score = |a: &usize, b: &usize| {
                query_scores[*b]
                    .partial_cmp(&query_scores[*a])
                    .unwrap_or(Ordering::Equal)
                    .then(a.cmp(b))
            };

            let mut centroid_idx: Vec<usize> = (0..num_centroids).collect();
            if bound < num_centroids {
                centroid_idx.select_nth_unstable_by(bound, by_score);
                centroid_idx.truncate(bound);
            }
            centroid_idx.sort_unstable_by(by_score);

            let top_centroids = &centroid_idx[..nprobe];

            let mut cumsum = 0usize;
            let mut idx = 0;
            while cumsum < t_prime && idx < centroid_idx.len() {
                cumsum += index.cell_size(centroid_idx[idx] as CentroidId);
                idx += 1;
            }
            let mse_estimate = if idx == 0 {
                0.0
            } else {
                query_scores[centroid_idx[idx - 1]]
            };

            tokens.push(TokenCells {
                token,
                centroid_ids: top_centroids.iter().map(|&c| c as CentroidId).collect(),
                scores: top_centroids.iter().map(|&c| query_scores[c]).collect(),
                mse_estimate,
            });
        }

        SelectedCentroids { tokens }
    }
}
