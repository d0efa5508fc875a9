// Configuration module - layered option sets and their resolution
//
// Every option is either unset (`None`) or holds a value; unset is distinct
// from zero/false. Sources are merged with pure functions, and the searcher
// mutates its effective configuration only through `assign` (explicit
// reconfiguration) and the breadth fill in `adaptive`.

pub mod adaptive;
pub mod resolver;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use adaptive::{BreadthDefaults, BreadthFill};
pub use resolver::{ConfigResolver, LocationOverrides, ResolvedConfig};

/// Default number of query tokens the encoder pads/truncates to.
pub const DEFAULT_QUERY_MAXLEN: usize = 32;

/// Default index root, relative to the working directory.
pub const DEFAULT_INDEX_ROOT: &str = "experiments/default/indexes";

macro_rules! configuration {
    ($( $(#[$meta:meta])* $field:ident : $ty:ty ),* $(,)?) => {
        /// A partial or effective set of searcher options.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct Configuration {
            $(
                $(#[$meta])*
                #[serde(skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
        }

        impl Configuration {
            /// Merge sources ordered from highest to lowest precedence: for
            /// each option the first source that sets it wins.
            pub fn merged(sources: &[&Configuration]) -> Configuration {
                Configuration {
                    $( $field: sources.iter().find_map(|source| source.$field.clone()), )*
                }
            }

            /// Overwrite every option that `other` sets, leaving the rest.
            pub fn assign(&mut self, other: &Configuration) {
                $(
                    if let Some(value) = &other.$field {
                        self.$field = Some(value.clone());
                    }
                )*
            }

            /// Names of the options currently set.
            pub fn assigned(&self) -> Vec<&'static str> {
                let mut names = Vec::new();
                $(
                    if self.$field.is_some() {
                        names.push(stringify!($field));
                    }
                )*
                names
            }
        }
    };
}

configuration! {
    /// Directory that contains named indexes
    index_root: PathBuf,
    /// Name of the index under `index_root`
    index_name: String,
    /// Path to the passage collection (TSV `pid\ttext`)
    collection: PathBuf,
    /// Path to the checkpoint directory
    checkpoint: PathBuf,
    /// Number of GPUs visible to the process; > 0 selects GPU compute
    total_visible_gpus: usize,
    /// Memory-map index files instead of reading them fully
    load_index_with_mmap: bool,
    /// Query length (in tokens) the encoder pads/truncates to
    query_maxlen: usize,
    /// Embedding width
    dim: usize,
    /// Centroids probed per query token
    ncells: usize,
    /// Minimum centroid score for a cell to stay in the candidate set
    centroid_score_threshold: f32,
    /// Candidate documents kept after approximate scoring
    ndocs: usize,
    /// Worker threads available to the ranking backend
    num_threads: usize,
}

impl Configuration {
    /// Process-level defaults, read from the environment.
    pub fn from_env() -> Self {
        Self::from_env_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`Configuration::from_env`] with an injectable lookup.
    pub fn from_env_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let index_root = lookup("WARP_INDEX_ROOT")
            .filter(|root| !root.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_ROOT));

        let total_visible_gpus = lookup("CUDA_VISIBLE_DEVICES")
            .map(|devices| {
                devices
                    .split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty() && *d != "-1")
                    .count()
            })
            .unwrap_or(0);

        let num_threads = lookup("WARP_NUM_THREADS")
            .and_then(|threads| threads.trim().parse::<usize>().ok())
            .filter(|&threads| threads > 0);

        Self {
            index_root: Some(index_root),
            total_visible_gpus: Some(total_visible_gpus),
            num_threads,
            ..Self::default()
        }
    }

    /// Snapshot of the configuration as JSON, as recorded in provenance.
    pub fn export(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn use_gpu(&self) -> bool {
        self.total_visible_gpus.unwrap_or(0) > 0
    }

    pub fn mmap_requested(&self) -> bool {
        self.load_index_with_mmap.unwrap_or(false)
    }

    pub fn query_maxlen_or_default(&self) -> usize {
        self.query_maxlen.unwrap_or(DEFAULT_QUERY_MAXLEN)
    }

    pub fn index_root_or_default(&self) -> &Path {
        self.index_root
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_INDEX_ROOT))
    }

    pub fn with_index_root(mut self, index_root: impl Into<PathBuf>) -> Self {
        self.index_root = Some(index_root.into());
        self
    }

    pub fn with_index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    pub fn with_collection(mut self, collection: impl Into<PathBuf>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: impl Into<PathBuf>) -> Self {
        self.checkpoint = Some(checkpoint.into());
        self
    }

    pub fn with_total_visible_gpus(mut self, gpus: usize) -> Self {
        self.total_visible_gpus = Some(gpus);
        self
    }

    pub fn with_load_index_with_mmap(mut self, mmap: bool) -> Self {
        self.load_index_with_mmap = Some(mmap);
        self
    }

    pub fn with_query_maxlen(mut self, query_maxlen: usize) -> Self {
        self.query_maxlen = Some(query_maxlen);
        self
    }

    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = Some(dim);
        self
    }

    pub fn with_ncells(mut self, ncells: usize) -> Self {
        self.ncells = Some(ncells);
        self
    }

    pub fn with_centroid_score_threshold(mut self, threshold: f32) -> Self {
        self.centroid_score_threshold = Some(threshold);
        self
    }

    pub fn with_ndocs(mut self, ndocs: usize) -> Self {
        self.ndocs = Some(ndocs);
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }
}
