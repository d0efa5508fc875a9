use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{Result, SearchError};
use crate::utils::types::QueryId;

/// Where a query batch came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryProvenance {
    File { path: PathBuf },
    InMemory { count: usize },
}

/// Ordered queries with unique caller-supplied ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBatch {
    entries: Vec<(QueryId, String)>,
    provenance: QueryProvenance,
}

impl QueryBatch {
    /// Ids `"0"`, `"1"`, ... in input order.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries: Vec<(QueryId, String)> = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| (i.to_string(), text.into()))
            .collect();
        let count = entries.len();
        Self {
            entries,
            provenance: QueryProvenance::InMemory { count },
        }
    }

    pub fn from_pairs<I, Q, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Q, S)>,
        Q: Into<QueryId>,
        S: Into<String>,
    {
        let entries: Vec<(QueryId, String)> = pairs
            .into_iter()
            .map(|(qid, text)| (qid.into(), text.into()))
            .collect();
        Self::check_unique(&entries)?;
        let count = entries.len();
        Ok(Self {
            entries,
            provenance: QueryProvenance::InMemory { count },
        })
    }

    /// Load `qid\ttext` lines. Blank lines are skipped.
    pub fn load_tsv(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| SearchError::io(path, e))?;
        let mut entries = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| SearchError::io(path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let Some((qid, text)) = line.split_once('\t') else {
                return Err(SearchError::config_load(
                    "queries",
                    path,
                    anyhow::anyhow!("line {} is not `qid<TAB>text`", line_no + 1),
                ));
            };
            entries.push((qid.to_string(), text.to_string()));
        }
        Self::check_unique(&entries)?;
        Ok(Self {
            entries,
            provenance: QueryProvenance::File {
                path: path.to_path_buf(),
            },
        })
    }

    fn check_unique(entries: &[(QueryId, String)]) -> Result<()> {
        let mut seen = HashSet::with_capacity(entries.len());
        for (qid, _) in entries {
            if !seen.insert(qid.as_str()) {
                return Err(SearchError::DuplicateQueryId(qid.clone()));
            }
        }
        Ok(())
    }

    pub fn provenance(&self) -> &QueryProvenance {
        &self.provenance
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn qids(&self) -> impl Iterator<Item = &QueryId> + '_ {
        self.entries.iter().map(|(qid, _)| qid)
    }

    pub fn texts(&self) -> Vec<String> {
        self.entries.iter().map(|(_, text)| text.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QueryId, &str)> + '_ {
        self.entries.iter().map(|(qid, text)| (qid, text.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texts_get_sequential_ids() {
        let batch = QueryBatch::from_texts(["cats", "dogs"]);
        assert_eq!(batch.qids().cloned().collect::<Vec<_>>(), vec!["0", "1"]);
        assert_eq!(batch.provenance(), &QueryProvenance::InMemory { count: 2 });
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = QueryBatch::from_pairs([("a", "cats"), ("a", "dogs")]).unwrap_err();
        assert!(matches!(err, SearchError::DuplicateQueryId(qid) if qid == "a"));
    }

    #[test]
    fn tsv_keeps_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.tsv");
        std::fs::write(&path, "q9\tfirst query\n\nq1\tsecond\n").unwrap();

        let batch = QueryBatch::load_tsv(&path).unwrap();
        assert_eq!(
            batch.iter().collect::<Vec<_>>(),
            vec![(&"q9".to_string(), "first query"), (&"q1".to_string(), "second")]
        );
        assert_eq!(batch.provenance(), &QueryProvenance::File { path });

        std::fs::write(dir.path().join("bad.tsv"), "no tab here\n").unwrap();
        assert!(QueryBatch::load_tsv(&dir.path().join("bad.tsv")).is_err());
    }
}
