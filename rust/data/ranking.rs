use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use super::provenance::Provenance;
use crate::error::{Result, SearchError};
use crate::utils::types::{PassageId, QueryId, Score};

/// Ranked passages of one query: parallel pids, 1-based ranks and scores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedResult {
    pub pids: Vec<PassageId>,
    pub ranks: Vec<usize>,
    pub scores: Vec<Score>,
}

impl RankedResult {
    /// Keep at most `k` of the backend's `(pids, scores)`; never pads.
    pub fn truncated(mut pids: Vec<PassageId>, mut scores: Vec<Score>, k: usize) -> Self {
        let len = k.min(pids.len()).min(scores.len());
        pids.truncate(len);
        scores.truncate(len);
        Self {
            pids,
            ranks: (1..=len).collect(),
            scores,
        }
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    /// `(pid, rank, score)` triples in rank order.
    pub fn iter(&self) -> impl Iterator<Item = (PassageId, usize, Score)> + '_ {
        self.pids
            .iter()
            .zip(&self.ranks)
            .zip(&self.scores)
            .map(|((&pid, &rank), &score)| (pid, rank, score))
    }
}

/// Results of a batch search, in batch order, with one shared provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    entries: Vec<(QueryId, RankedResult)>,
    provenance: Provenance,
}

impl Ranking {
    pub fn new(entries: Vec<(QueryId, RankedResult)>, provenance: Provenance) -> Self {
        Self {
            entries,
            provenance,
        }
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn get(&self, qid: &str) -> Option<&RankedResult> {
        self.entries
            .iter()
            .find(|(id, _)| id == qid)
            .map(|(_, result)| result)
    }

    pub fn keys(&self) -> impl Iterator<Item = &QueryId> + '_ {
        self.entries.iter().map(|(qid, _)| qid)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QueryId, &RankedResult)> + '_ {
        self.entries.iter().map(|(qid, result)| (qid, result))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(qid, pid, rank, score)` rows across all queries.
    pub fn flat(&self) -> Vec<(QueryId, PassageId, usize, Score)> {
        self.entries
            .iter()
            .flat_map(|(qid, result)| {
                result
                    .iter()
                    .map(move |(pid, rank, score)| (qid.clone(), pid, rank, score))
            })
            .collect()
    }

    /// Write `qid\tpid\trank\tscore` rows to `path` and the provenance to
    /// `<path>.meta`. Returns the path of the metadata file.
    pub fn save(&self, path: &Path) -> Result<PathBuf> {
        let file = File::create(path).map_err(|e| SearchError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        for (qid, pid, rank, score) in self.flat() {
            writeln!(writer, "{qid}\t{pid}\t{rank}\t{score}").map_err(|e| SearchError::io(path, e))?;
        }
        writer.flush().map_err(|e| SearchError::io(path, e))?;

        let mut meta_path = path.as_os_str().to_owned();
        meta_path.push(".meta");
        let meta_path = PathBuf::from(meta_path);
        let meta = File::create(&meta_path).map_err(|e| SearchError::io(&meta_path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(meta), &self.provenance)
            .map_err(|e| SearchError::io(&meta_path, e.into()))?;

        info!(path = %path.display(), queries = self.len(), "Saved ranking");
        Ok(meta_path)
    }
}
