use anyhow::{anyhow, bail, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::utils::types::PassageId;

/// Passage texts indexed by passage id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    path: PathBuf,
    passages: Vec<String>,
}

impl Collection {
    /// Load `pid\ttext` lines where `pid` equals the line's position.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open collection {:?}", path))?;
        let mut passages = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read {:?}", path))?;
            let (pid, text) = line
                .split_once('\t')
                .ok_or_else(|| anyhow!("line {} is not `pid<TAB>text`", line_no + 1))?;
            let pid: usize = pid
                .trim()
                .parse()
                .with_context(|| format!("line {} has a non-numeric pid {:?}", line_no + 1, pid))?;
            if pid != line_no {
                bail!("line {} carries pid {}; pids must be consecutive from 0", line_no + 1, pid);
            }
            passages.push(text.to_string());
        }
        Ok(Self {
            path: path.to_path_buf(),
            passages,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, pid: PassageId) -> Option<&str> {
        usize::try_from(pid)
            .ok()
            .and_then(|pid| self.passages.get(pid))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.passages.iter().map(String::as_str)
    }
}
