// Search module - built-in ranking backends over an on-disk index

pub mod centroid_selector;
pub mod decompressor;
pub mod loader;
pub mod merger;
pub mod parallel;
pub mod plaid;
pub mod scorer;

// Re-export main types for convenience
pub use centroid_selector::CentroidSelector;
pub use decompressor::CentroidDecompressor;
pub use loader::{IndexLoader, LoadedIndex};
pub use merger::{AnnotatedStrideView, ResultMerger};
pub use parallel::ParallelWarpScorer;
pub use plaid::PlaidScorer;
pub use scorer::WarpScorer;
