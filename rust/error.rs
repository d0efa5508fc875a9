use std::path::PathBuf;

use crate::utils::types::QueryId;

/// Errors surfaced by the searcher. None of them are retried internally.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// A required configuration source (index, checkpoint, collection)
    /// could not be located or parsed.
    #[error("failed to load {what} config from {path:?}: {source:#}")]
    ConfigLoad {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The requested combination of options cannot be served.
    #[error("invalid configuration for `{option}`: {reason}")]
    InvalidConfiguration { option: &'static str, reason: String },

    /// The query encoder failed.
    #[error("query encoding failed: {0:#}")]
    Encoding(#[source] anyhow::Error),

    /// The ranking backend failed while serving `query`.
    #[error("ranking failed for query {query:?}: {source:#}")]
    Ranking {
        query: Option<QueryId>,
        #[source]
        source: anyhow::Error,
    },

    /// The selected backend could not be constructed.
    #[error("failed to initialize ranking backend: {0:#}")]
    BackendInit(#[source] anyhow::Error),

    #[error("duplicate query id {0:?} in batch")]
    DuplicateQueryId(QueryId),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SearchError {
    pub(crate) fn config_load(
        what: &'static str,
        path: impl Into<PathBuf>,
        source: anyhow::Error,
    ) -> Self {
        Self::ConfigLoad {
            what,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid(option: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            option,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = SearchError> = std::result::Result<T, E>;
