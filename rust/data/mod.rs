// Data module - query batches, collections and ranking outputs

pub mod collection;
pub mod provenance;
pub mod queries;
pub mod ranking;

pub use collection::Collection;
pub use provenance::Provenance;
pub use queries::{QueryBatch, QueryProvenance};
pub use ranking::{RankedResult, Ranking};
