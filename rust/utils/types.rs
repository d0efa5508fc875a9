// Key types needed:
// - ID types for passages, centroids, embeddings and queries
// - Query embedding containers
// - Candidate restriction (pool + filter predicate)
// - Centroid selection output shared by the WARP components
use ndarray::Array3;
use std::collections::HashSet;
use std::fmt;

/// Represents a passage/document ID in the index
pub type PassageId = i64;

/// Represents a centroid ID in the clustering
pub type CentroidId = u32;

/// Represents an embedding ID in the index
pub type EmbeddingId = u32;

/// Caller-supplied query identifier, unique within a batch
pub type QueryId = String;

/// Score type for ranking
pub type Score = f32;

/// Encoded queries, always `[num_queries, num_tokens, dim]`.
///
/// All-zero token rows are padding and are ignored by the backends.
pub type QueryEmbeddings = Array3<f32>;

/// Opaque predicate over passage ids applied by backends while pruning
/// candidates. Returning `false` removes the passage from consideration.
pub type FilterFn = dyn Fn(PassageId) -> bool + Send + Sync;

/// Restriction set of passage ids a single query's search is confined to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidatePool {
    pids: HashSet<PassageId>,
}

impl CandidatePool {
    pub fn new(pids: impl IntoIterator<Item = PassageId>) -> Self {
        Self {
            pids: pids.into_iter().collect(),
        }
    }

    pub fn contains(&self, pid: PassageId) -> bool {
        self.pids.contains(&pid)
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = PassageId> + '_ {
        self.pids.iter().copied()
    }
}

impl FromIterator<PassageId> for CandidatePool {
    fn from_iter<T: IntoIterator<Item = PassageId>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// Combined candidate restriction handed to a backend for one query.
#[derive(Clone, Copy, Default)]
pub struct CandidateFilter<'a> {
    pub filter_fn: Option<&'a FilterFn>,
    pub pool: Option<&'a CandidatePool>,
}

impl<'a> CandidateFilter<'a> {
    pub fn new(filter_fn: Option<&'a FilterFn>, pool: Option<&'a CandidatePool>) -> Self {
        Self { filter_fn, pool }
    }

    /// Whether `pid` survives both the pool restriction and the predicate.
    #[inline]
    pub fn admits(&self, pid: PassageId) -> bool {
        if let Some(pool) = self.pool {
            if !pool.contains(pid) {
                return false;
            }
        }
        match self.filter_fn {
            Some(filter_fn) => filter_fn(pid),
            None => true,
        }
    }
}

impl fmt::Debug for CandidateFilter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateFilter")
            .field("filter_fn", &self.filter_fn.map(|_| "<function>"))
            .field("pool", &self.pool.map(CandidatePool::len))
            .finish()
    }
}

/// Centroids selected for one unmasked query token
#[derive(Debug, Clone)]
pub struct TokenCells {
    /// Row of the token inside the query matrix
    pub token: usize,
    pub centroid_ids: Vec<CentroidId>,
    pub scores: Vec<Score>,
    /// Missing-similarity estimate imputed when a passage has no
    /// embedding in any of this token's cells
    pub mse_estimate: Score,
}

/// Selected centroids for all unmasked tokens of a query
#[derive(Debug, Clone, Default)]
pub struct SelectedCentroids {
    pub tokens: Vec<TokenCells>,
}

/// T-prime policy for adaptive early termination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TPrimePolicy {
    Fixed(usize),
    Max,
}

impl TPrimePolicy {
    /// Derive the policy from an explicit value or from the index size.
    pub fn for_index(t_prime: Option<usize>, num_embeddings: usize, num_centroids: usize) -> Self {
        match t_prime {
            Some(value) => TPrimePolicy::Fixed(value),
            None if num_centroids <= (1 << 16) => {
                let estimate =
                    ((8.0 * num_embeddings as f64).sqrt() / 1000.0).floor() as usize * 1000;
                TPrimePolicy::Fixed(if estimate == 0 { 1000 } else { estimate })
            },
            None => TPrimePolicy::Max,
        }
    }

    pub fn value(&self, k: usize) -> usize {
        match self {
            TPrimePolicy::Fixed(value) => *value,
            TPrimePolicy::Max => {
                if k > 100 {
                    100_000
                } else {
                    50_000
                }
            },
        }
    }
}

/// Returns `true` when a token row is padding (all zeros).
#[inline]
pub fn is_padding(row: &[f32]) -> bool {
    row.iter().all(|&v| v == 0.0)
}

/// Descending score order with passage id as the tie-breaker.
#[inline]
pub fn by_score_desc(a: (PassageId, Score), b: (PassageId, Score)) -> std::cmp::Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then(a.0.cmp(&b.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_prime_defaults_follow_index_size() {
        assert_eq!(
            TPrimePolicy::for_index(None, 10, 16),
            TPrimePolicy::Fixed(1000)
        );
        assert_eq!(
            TPrimePolicy::for_index(None, 2_000_000, 4096),
            TPrimePolicy::Fixed(4000)
        );
        assert_eq!(TPrimePolicy::for_index(None, 10, 1 << 17), TPrimePolicy::Max);
        assert_eq!(TPrimePolicy::Max.value(5), 50_000);
        assert_eq!(TPrimePolicy::Max.value(500), 100_000);
        assert_eq!(TPrimePolicy::for_index(Some(7), 0, 0).value(1), 7);
    }

    #[test]
    fn candidate_filter_combines_pool_and_predicate() {
        let pool = CandidatePool::new([1, 2, 3]);
        let even = |pid: PassageId| pid % 2 == 0;
        let filter = CandidateFilter::new(Some(&even), Some(&pool));
        assert!(filter.admits(2));
        assert!(!filter.admits(3));
        assert!(!filter.admits(4));
        assert!(CandidateFilter::default().admits(4));
    }

    #[test]
    fn ordering_breaks_ties_on_pid() {
        let mut items = vec![(3, 0.5), (1, 0.9), (2, 0.5)];
        items.sort_by(|a, b| by_score_desc(*a, *b));
        assert_eq!(items, vec![(1, 0.9), (2, 0.5), (3, 0.5)]);
    }
}
