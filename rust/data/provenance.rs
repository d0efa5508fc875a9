use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::queries::QueryProvenance;

/// How a ranking was produced. Built once per batch call and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    source: String,
    queries: QueryProvenance,
    config: serde_json::Value,
    k: usize,
    created_at: DateTime<Utc>,
}

impl Provenance {
    pub fn new(
        source: impl Into<String>,
        queries: QueryProvenance,
        config: serde_json::Value,
        k: usize,
    ) -> Self {
        Self {
            source: source.into(),
            queries,
            config,
            k,
            created_at: Utc::now(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn queries(&self) -> &QueryProvenance {
        &self.queries
    }

    /// Configuration snapshot taken when the batch finished.
    pub fn config(&self) -> &serde_json::Value {
        &self.config
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
