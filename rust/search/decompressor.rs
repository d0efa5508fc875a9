use anyhow::{ensure, Result};
use ndarray::ArrayView1;
use std::collections::BTreeMap;

use crate::search::loader::LoadedIndex;
use crate::search::merger::{AnnotatedStrideView, ResultMerger};
use crate::utils::types::{CandidateFilter, CentroidId, PassageId, Score, TokenCells};

/// Scores the embeddings of selected cells against a query token.
///
/// Embeddings are stored uncompressed, so "decompression" is a dot product
/// per embedding followed by a per-passage max.
#[derive(Debug, Clone, Copy)]
pub struct CentroidDecompressor {
    dim: usize,
}

impl CentroidDecompressor {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    /// Candidate stride of one cell: passages admitted by `candidates`,
    /// ascending by pid, scored by their best embedding in the cell.
    pub fn decompress_centroid(
        &self,
        centroid: CentroidId,
        query_token: ArrayView1<'_, f32>,
        index: &LoadedIndex,
        candidates: &CandidateFilter<'_>,
    ) -> Result<AnnotatedStrideView> {
        ensure!(
            (centroid as usize) < index.num_centroids(),
            "Centroid ID {} is out of bounds (max valid ID is {})",
            centroid,
            index.num_centroids().saturating_sub(1)
        );
        ensure!(
            query_token.len() == self.dim,
            "Query embedding dim ({}) does not match index dim ({})",
            query_token.len(),
            self.dim
        );

        let mut pid_score_map: BTreeMap<PassageId, Score> = BTreeMap::new();
        for &emb in index.cell(centroid) {
            let pid = index.emb_to_pid[emb as usize];
            if !candidates.admits(pid) {
                continue;
            }
            let score: Score = index
                .embedding(emb)
                .iter()
                .zip(query_token.iter())
                .map(|(a, b)| a * b)
                .sum();
            pid_score_map
                .entry(pid)
                .and_modify(|existing| {
                    if score > *existing {
                        *existing = score;
                    }
                })
                .or_insert(score);
        }

        let (pids, scores): (Vec<PassageId>, Vec<Score>) = pid_score_map.into_iter().unzip();
        Ok(AnnotatedStrideView::from_data(pids, scores))
    }

    /// Decompress every cell of one token first, then tree-merge them.
    pub fn decompress_token(
        &self,
        cells: &TokenCells,
        query_token: ArrayView1<'_, f32>,
        index: &LoadedIndex,
        candidates: &CandidateFilter<'_>,
    ) -> Result<AnnotatedStrideView> {
        let strides = cells
            .centroid_ids
            .iter()
            .map(|&centroid| self.decompress_centroid(centroid, query_token, index, candidates))
            .collect::<Result<Vec<_>>>()?;
        Ok(ResultMerger::merge_candidates_nprobe(strides))
    }

    /// Decompress and max-merge one token's cells in a single pass.
    pub fn decompress_token_fused(
        &self,
        cells: &TokenCells,
        query_token: ArrayView1<'_, f32>,
        index: &LoadedIndex,
        candidates: &CandidateFilter<'_>,
    ) -> Result<AnnotatedStrideView> {
        let mut merged = AnnotatedStrideView::default();
        for &centroid in &cells.centroid_ids {
            let stride = self.decompress_centroid(centroid, query_token, index, candidates)?;
            merged = ResultMerger::merge_max(&merged, &stride);
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::index::create_index;
    use crate::search::IndexLoader;
    use crate::utils::types::CandidatePool;
    use ndarray::array;

    fn index() -> (tempfile::TempDir, LoadedIndex) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx");
        let documents = vec![
            array![[1.0f32, 0.0], [0.5, 0.5]],
            array![[0.9f32, 0.1]],
            array![[0.0f32, 1.0]],
        ];
        let centroids = array![[1.0f32, 0.0], [0.0, 1.0]];
        create_index(&path, &documents, centroids.view(), &Configuration::default()).unwrap();
        let index = IndexLoader::new(&path, false).unwrap().load().unwrap();
        (dir, index)
    }

    #[test]
    fn keeps_best_embedding_per_passage() {
        let (_dir, index) = index();
        let decompressor = CentroidDecompressor::new(2);
        let token = array![1.0f32, 0.0];

        let stride = decompressor
            .decompress_centroid(0, token.view(), &index, &CandidateFilter::default())
            .unwrap();
        assert_eq!(stride.pids, vec![0, 1]);
        assert_eq!(stride.scores, vec![1.0, 0.9]);
    }

    #[test]
    fn applies_candidate_restriction() {
        let (_dir, index) = index();
        let decompressor = CentroidDecompressor::new(2);
        let token = array![1.0f32, 0.0];
        let pool = CandidatePool::new([1]);

        let stride = decompressor
            .decompress_centroid(0, token.view(), &index, &CandidateFilter::new(None, Some(&pool)))
            .unwrap();
        assert_eq!(stride.pids, vec![1]);
    }

    #[test]
    fn fused_and_unfused_agree() {
        let (_dir, index) = index();
        let decompressor = CentroidDecompressor::new(2);
        let token = array![0.6f32, 0.8];
        let cells = TokenCells {
            token: 0,
            centroid_ids: vec![1, 0],
            scores: vec![0.8, 0.6],
            mse_estimate: 0.0,
        };
        let filter = CandidateFilter::default();

        let fused = decompressor
            .decompress_token_fused(&cells, token.view(), &index, &filter)
            .unwrap();
        let unfused = decompressor
            .decompress_token(&cells, token.view(), &index, &filter)
            .unwrap();
        assert_eq!(fused, unfused);
        assert_eq!(fused.pids, vec![0, 1, 2]);
    }

    #[test]
    fn rejects_unknown_centroids_and_dims() {
        let (_dir, index) = index();
        let decompressor = CentroidDecompressor::new(2);
        let filter = CandidateFilter::default();
        assert!(decompressor
            .decompress_centroid(5, array![1.0f32, 0.0].view(), &index, &filter)
            .is_err());
        assert!(decompressor
            .decompress_centroid(0, array![1.0f32].view(), &index, &filter)
            .is_err());
    }
}
