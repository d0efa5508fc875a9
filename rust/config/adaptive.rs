use tracing::debug;

use super::Configuration;

/// Retrieval-breadth values chosen from the requested `k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreadthDefaults {
    pub ncells: usize,
    pub centroid_score_threshold: f32,
    pub ndocs: usize,
}

impl BreadthDefaults {
    pub fn for_k(k: usize) -> Self {
        if k <= 10 {
            Self {
                ncells: 1,
                centroid_score_threshold: 0.5,
                ndocs: 256,
            }
        } else if k <= 100 {
            Self {
                ncells: 2,
                centroid_score_threshold: 0.45,
                ndocs: 1024,
            }
        } else {
            Self {
                ncells: 4,
                centroid_score_threshold: 0.4,
                ndocs: k.saturating_mul(4).max(4096),
            }
        }
    }
}

/// Which breadth options a fill actually set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BreadthFill {
    pub ncells: bool,
    pub centroid_score_threshold: bool,
    pub ndocs: bool,
}

impl BreadthFill {
    pub fn any(&self) -> bool {
        self.ncells || self.centroid_score_threshold || self.ndocs
    }
}

impl Configuration {
    /// Set each breadth option that is still unset to its bucket default
    /// for `k`.
    ///
    /// Values already present, whether assigned explicitly or by an earlier
    /// fill for a different `k`, are left untouched. A searcher therefore
    /// keeps the breadth chosen for the first `k` it serves unless the
    /// caller reconfigures it.
    pub fn fill_breadth_defaults(&mut self, k: usize) -> BreadthFill {
        let defaults = BreadthDefaults::for_k(k);
        let fill = BreadthFill {
            ncells: self.ncells.is_none(),
            centroid_score_threshold: self.centroid_score_threshold.is_none(),
            ndocs: self.ndocs.is_none(),
        };

        self.ncells.get_or_insert(defaults.ncells);
        self.centroid_score_threshold
            .get_or_insert(defaults.centroid_score_threshold);
        self.ndocs.get_or_insert(defaults.ndocs);

        if fill.any() {
            debug!(
                k,
                ncells = ?self.ncells,
                centroid_score_threshold = ?self.centroid_score_threshold,
                ndocs = ?self.ndocs,
                "Filled unset retrieval-breadth options"
            );
        }

        fill
    }
}
