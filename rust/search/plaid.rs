use anyhow::{ensure, Result};
use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::Configuration;
use crate::engine::{RankRequest, RankingBackend};
use crate::search::loader::LoadedIndex;
use crate::utils::tracker::Tracker;
use crate::utils::types::{by_score_desc, CentroidId, PassageId, Score};

const DEFAULT_NCELLS: usize = 1;
const DEFAULT_NDOCS: usize = 256;

/// Baseline scorer: centroid pruning, centroid-approximate scoring of the
/// candidates, then exact MaxSim over the survivors.
///
/// Sized entirely by `ncells`, `centroid_score_threshold` and `ndocs`; the
/// requested `k` is ignored.
pub struct PlaidScorer {
    index: Arc<LoadedIndex>,
}

impl PlaidScorer {
    pub fn new(index: Arc<LoadedIndex>) -> Self {
        Self { index }
    }

    /// Centroids probed by any unmasked token, minus those whose best token
    /// score falls below `threshold`. The overall best centroid survives.
    fn probe_centroids(
        centroid_scores: ArrayView2<'_, f32>,
        ncells: usize,
        threshold: Option<f32>,
    ) -> BTreeSet<CentroidId> {
        let num_centroids = centroid_scores.ncols();
        let mut best = vec![f32::NEG_INFINITY; num_centroids];
        let mut probed = BTreeSet::new();

        for row in centroid_scores.axis_iter(Axis(0)) {
            for (c, &score) in row.iter().enumerate() {
                best[c] = best[c].max(score);
            }
            let mut order: Vec<usize> = (0..num_centroids).collect();
            order.sort_unstable_by(|&a, &b| {
                row[b].partial_cmp(&row[a]).unwrap_or(Ordering::Equal).then(a.cmp(&b))
            });
            probed.extend(order.into_iter().take(ncells).map(|c| c as CentroidId));
        }

        let top = probed
            .iter()
            .copied()
            .max_by(|&a, &b| {
                best[a as usize]
                    .partial_cmp(&best[b as usize])
                    .unwrap_or(Ordering::Equal)
                    .then(b.cmp(&a))
            });
        if let Some(threshold) = threshold {
            probed.retain(|&c| Some(c) == top || best[c as usize] >= threshold);
        }
        probed
    }

    /// Σ over tokens of the best (pruned) centroid score among the
    /// passage's embeddings.
    fn approximate_score(&self, pid: PassageId, pruned_scores: &Array2<f32>) -> Score {
        let codes = &self.index.codes[self.index.passage_range(pid)];
        pruned_scores
            .axis_iter(Axis(0))
            .map(|row| {
                codes
                    .iter()
                    .map(|&c| row[c as usize])
                    .fold(f32::NEG_INFINITY, f32::max)
            })
            .filter(|score| score.is_finite())
            .sum()
    }

    /// Exact late-interaction score.
    fn maxsim(&self, pid: PassageId, query: &Array2<f32>) -> Score {
        let scores = query.dot(&self.index.passage_embeddings(pid).t());
        scores
            .axis_iter(Axis(0))
            .map(|row| row.iter().copied().fold(f32::NEG_INFINITY, f32::max))
            .filter(|score| score.is_finite())
            .sum()
    }
}

impl RankingBackend for PlaidScorer {
    fn name(&self) -> &'static str {
        "plaid"
    }

    fn dim(&self) -> usize {
        self.index.dim()
    }

    fn rank(
        &self,
        config: &Configuration,
        query: ArrayView2<'_, f32>,
        request: &RankRequest<'_>,
        tracker: &mut dyn Tracker,
    ) -> Result<(Vec<PassageId>, Vec<Score>)> {
        let index = &self.index;
        ensure!(
            query.ncols() == index.dim(),
            "Query embedding dim ({}) does not match index dim ({})",
            query.ncols(),
            index.dim()
        );
        let ncells = config.ncells.unwrap_or(DEFAULT_NCELLS).max(1);
        let ndocs = config.ndocs.unwrap_or(DEFAULT_NDOCS).max(1);

        // Padding rows never contribute.
        let active_rows: Vec<usize> = query
            .axis_iter(Axis(0))
            .enumerate()
            .filter(|(_, row)| row.iter().any(|&v| v != 0.0))
            .map(|(t, _)| t)
            .collect();
        let query = query.select(Axis(0), &active_rows);
        if query.nrows() == 0 || index.num_centroids() == 0 {
            return Ok((Vec::new(), Vec::new()));
        }

        tracker.begin("Candidate Generation");
        let centroid_scores = query.dot(&index.centroids().t());
        let kept = Self::probe_centroids(
            centroid_scores.view(),
            ncells,
            config.centroid_score_threshold,
        );
        let candidates: Vec<PassageId> = kept
            .iter()
            .flat_map(|&c| index.cell(c).iter())
            .map(|&emb| index.emb_to_pid[emb as usize])
            .filter(|&pid| request.candidates.admits(pid))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        tracker.end("Candidate Generation");

        tracker.begin("Filtering");
        let mut pruned_scores = centroid_scores.clone();
        if config.centroid_score_threshold.is_some() {
            let kept_mask: Vec<bool> = (0..index.num_centroids())
                .map(|c| kept.contains(&(c as CentroidId)))
                .collect();
            for mut row in pruned_scores.axis_iter_mut(Axis(0)) {
                for (c, score) in row.iter_mut().enumerate() {
                    if !kept_mask[c] {
                        *score = 0.0;
                    }
                }
            }
        }
        let mut approximate: Vec<(PassageId, Score)> = candidates
            .par_iter()
            .map(|&pid| (pid, self.approximate_score(pid, &pruned_scores)))
            .collect();
        approximate.sort_unstable_by(|a, b| by_score_desc(*a, *b));
        approximate.truncate(ndocs);
        tracker.end("Filtering");

        tracker.begin("Scoring");
        let num_exact = (ndocs / 4).max(1);
        let mut exact: Vec<(PassageId, Score)> = approximate
            .par_iter()
            .take(num_exact)
            .map(|&(pid, _)| (pid, self.maxsim(pid, &query)))
            .collect();
        exact.sort_unstable_by(|a, b| by_score_desc(*a, *b));
        tracker.end("Scoring");

        Ok(exact.into_iter().unzip())
    }
}
