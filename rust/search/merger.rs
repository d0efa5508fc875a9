use std::cmp::Ordering;

use crate::utils::types::{PassageId, Score};

/// Candidate passages of one source, ascending by pid
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotatedStrideView {
    pub pids: Vec<PassageId>,
    pub scores: Vec<Score>,
}

impl AnnotatedStrideView {
    /// Empty stride with room for `capacity` passages
    pub fn with_capacity(capacity: usize) -> Self {
        AnnotatedStrideView {
            pids: Vec::with_capacity(capacity),
            scores: Vec::with_capacity(capacity),
        }
    }

    /// Wrap parallel `pids`/`scores`; `pids` must be ascending
    pub fn from_data(pids: Vec<PassageId>, scores: Vec<Score>) -> Self {
        debug_assert_eq!(pids.len(), scores.len());
        AnnotatedStrideView { pids, scores }
    }

    pub fn size(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }
}

/// Best score of a passage across the cells of one token
struct ReduceMaxCombiner;

/// Sum across tokens, imputing each side's estimate for missing passages
struct ReduceSumMseCombiner {
    lhs_mse: f32,
    rhs_mse: f32,
}

impl ReduceSumMseCombiner {
    fn new(lhs_mse: f32, rhs_mse: f32) -> Self {
        ReduceSumMseCombiner { lhs_mse, rhs_mse }
    }
}

/// Merges per-cell candidate strides into passage scores.
pub struct ResultMerger;

impl ResultMerger {
    /// Sorted-merge of two strides; shared pids are combined, the rest pass
    /// through `lhs`/`rhs`.
    fn merge_candidate_strides_with_combiner<C>(
        stride1: &AnnotatedStrideView,
        stride2: &AnnotatedStrideView,
        combiner: &C,
    ) -> AnnotatedStrideView
    where
        C: Combiner,
    {
        let c1_size = stride1.size();
        let c2_size = stride2.size();
        let mut result = AnnotatedStrideView::with_capacity(c1_size + c2_size);
        let mut i1 = 0;
        let mut i2 = 0;

        while i1 < c1_size && i2 < c2_size {
            let key1 = stride1.pids[i1];
            let key2 = stride2.pids[i2];
            result.pids.push(key1.min(key2));

            if key1 == key2 {
                result
                    .scores
                    .push(combiner.combine(stride1.scores[i1], stride2.scores[i2]));
                i1 += 1;
                i2 += 1;
            } else if key1 < key2 {
                result.scores.push(combiner.lhs(stride1.scores[i1]));
                i1 += 1;
            } else {
                result.scores.push(combiner.rhs(stride2.scores[i2]));
                i2 += 1;
            }
        }

        // tail of stride1
        for i in i1..c1_size {
            result.pids.push(stride1.pids[i]);
            result.scores.push(combiner.lhs(stride1.scores[i]));
        }

        // tail of stride2
        for i in i2..c2_size {
            result.pids.push(stride2.pids[i]);
            result.scores.push(combiner.rhs(stride2.scores[i]));
        }

        result
    }

    /// Max-merge of two strides of the same token.
    pub fn merge_max(lhs: &AnnotatedStrideView, rhs: &AnnotatedStrideView) -> AnnotatedStrideView {
        Self::merge_candidate_strides_with_combiner(lhs, rhs, &ReduceMaxCombiner)
    }

    /// Merge the `nprobe` candidate lists associated with one query token
    pub fn merge_candidates_nprobe(views: Vec<AnnotatedStrideView>) -> AnnotatedStrideView {
        let mut views = views;
        while views.len() > 1 {
            let mut next = Vec::with_capacity(views.len().div_ceil(2));
            let mut pairs = views.chunks_exact(2);
            for pair in pairs.by_ref() {
                next.push(Self::merge_max(&pair[0], &pair[1]));
            }
            if let [last] = pairs.remainder() {
                // No merge partner, carried as-is
                next.push(last.clone());
            }
            views = next;
        }
        views.pop().unwrap_or_default()
    }

    /// Merge per-token strides into document-level scores.
    ///
    /// A passage absent from a token's stride receives that token's
    /// `mse_estimates` entry instead.
    pub fn merge_candidates_tokens(
        views: Vec<AnnotatedStrideView>,
        mse_estimates: &[f32],
    ) -> AnnotatedStrideView {
        let num_tokens = views.len();
        if num_tokens == 0 {
            return AnnotatedStrideView::default();
        }

        // mse_prefix[i] = sum of the first i estimates
        let mut mse_prefix = vec![0.0f32; num_tokens + 1];
        for i in 0..num_tokens {
            mse_prefix[i + 1] = mse_prefix[i] + mse_estimates.get(i).copied().unwrap_or(0.0);
        }

        let mut views: Vec<Option<AnnotatedStrideView>> = views.into_iter().map(Some).collect();
        let mut step_size = 1;
        while step_size < num_tokens {
            for lhs in (0..num_tokens).step_by(step_size * 2) {
                let rhs = lhs + step_size;
                if rhs < num_tokens {
                    // estimates of the tokens folded into each side
                    let lhs_mse = mse_prefix[rhs] - mse_prefix[lhs];
                    let rhs_mse =
                        mse_prefix[(rhs + step_size).min(num_tokens)] - mse_prefix[rhs];

                    let combiner = ReduceSumMseCombiner::new(lhs_mse, rhs_mse);
                    let (Some(left), Some(right)) = (views[lhs].take(), views[rhs].take()) else {
                        continue;
                    };
                    views[lhs] = Some(Self::merge_candidate_strides_with_combiner(
                        &left, &right, &combiner,
                    ));
                }
            }
            step_size <<= 1;
        }

        views[0].take().unwrap_or_default()
    }

    /// Top `k` entries of `stride` by descending score, ties by pid
    pub fn partial_sort_results(
        stride: &AnnotatedStrideView,
        k: usize,
    ) -> (Vec<PassageId>, Vec<Score>) {
        let size = stride.size();
        let num_results = k.min(size);
        if num_results == 0 {
            return (Vec::new(), Vec::new());
        }

        let scores = &stride.scores;
        let by_score = |&idx1: &usize, &idx2: &usize| {
            scores[idx2]
                .partial_cmp(&scores[idx1])
                .unwrap_or(Ordering::Equal)
                .then_with(|| idx1.cmp(&idx2))
        };

        let mut pid_idx: Vec<usize> = (0..size).collect();
        if num_results < size {
            pid_idx.select_nth_unstable_by(num_results - 1, by_score);
            pid_idx.truncate(num_results);
        }
        pid_idx.sort_unstable_by(by_score);

        pid_idx
            .into_iter()
            .map(|idx| (stride.pids[idx], stride.scores[idx]))
            .unzip()
    }
}

/// Score arithmetic applied by the sorted merge
trait Combiner {
    fn combine(&self, lhs: f32, rhs: f32) -> f32;
    fn lhs(&self, lhs: f32) -> f32;
    fn rhs(&self, rhs: f32) -> f32;
}

impl Combiner for ReduceMaxCombiner {
    fn combine(&self, lhs: f32, rhs: f32) -> f32 {
        lhs.max(rhs)
    }

    fn lhs(&self, lhs: f32) -> f32 {
        lhs
    }

    fn rhs(&self, rhs: f32) -> f32 {
        rhs
    }
}

impl Combiner for ReduceSumMseCombiner {
    fn combine(&self, lhs: f32, rhs: f32) -> f32 {
        lhs + rhs
    }

    fn lhs(&self, lhs: f32) -> f32 {
        lhs + self.rhs_mse
    }

    fn rhs(&self, rhs: f32) -> f32 {
        self.lhs_mse + rhs
    }
}
