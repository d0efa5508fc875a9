//! Searcher orchestration for XTR/WARP-style late-interaction retrieval.
//!
//! A [`Searcher`] resolves its configuration from the caller, the
//! checkpoint, the index and the process environment, selects one ranking
//! backend at construction, and then turns query text into ranked passage
//! ids:
//!
//! ```no_run
//! use warp_searcher::{QueryBatch, SearchAllOptions, Searcher, SearcherOptions};
//!
//! # fn main() -> warp_searcher::Result<()> {
//! let mut searcher = Searcher::new("msmarco", SearcherOptions::default())?;
//! let queries = QueryBatch::from_pairs([("a", "cats"), ("b", "dogs")])?;
//! let ranking = searcher.search_all(&queries, 10, SearchAllOptions::default())?;
//! for (qid, result) in ranking.iter() {
//!     println!("{qid}: {:?}", result.pids);
//! }
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod checkpoint;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod index;
pub mod search;
pub mod searcher;
pub mod utils;

// Re-exports for convenience
pub use checkpoint::{CheckpointStore, DiskCheckpointStore, EncodeOptions, HashingEncoder, QueryEncoder};
pub use config::{ConfigResolver, Configuration};
pub use data::{Collection, Provenance, QueryBatch, QueryProvenance, RankedResult, Ranking};
pub use engine::{
    Capabilities, ComputeDevice, EngineRequest, EngineSelection, EngineSelector, EngineVariant,
    RankRequest, RankingBackend, WarpConfig,
};
pub use error::{Result, SearchError};
pub use index::{DiskIndexStore, IndexStore};
pub use searcher::{DenseSearchOptions, SearchAllOptions, SearchOptions, Searcher, SearcherOptions};
pub use utils::tracker::{ExecutionTracker, NopTracker, Tracker};
pub use utils::types::{CandidateFilter, CandidatePool, FilterFn, PassageId, QueryId, Score};
