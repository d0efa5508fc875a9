#![allow(dead_code)]

use anyhow::{anyhow, Result};
use ndarray::{Array3, ArrayView2};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use warp_searcher::engine::EngineSelection;
use warp_searcher::{
    Capabilities, CheckpointStore, ComputeDevice, Configuration, EncodeOptions, EngineRequest,
    IndexStore, PassageId, QueryEncoder, RankRequest, RankingBackend, Score, Searcher,
    SearcherOptions, Tracker,
};

pub const DIM: usize = 4;

/// What a backend saw for one `rank` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRank {
    pub k: Option<usize>,
    pub ncells: Option<usize>,
    pub centroid_score_threshold: Option<f32>,
    pub ndocs: Option<usize>,
    pub pool: Option<Vec<PassageId>>,
    pub admits: Vec<bool>,
}

/// Shared view of everything the mocks recorded.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub ranks: Arc<Mutex<Vec<RecordedRank>>>,
    pub encodes: Arc<Mutex<Vec<(usize, EncodeOptions)>>>,
    pub selections: Arc<Mutex<Vec<EngineSelection>>>,
}

impl Recorder {
    pub fn ranks(&self) -> Vec<RecordedRank> {
        self.ranks.lock().unwrap().clone()
    }

    pub fn encodes(&self) -> Vec<(usize, EncodeOptions)> {
        self.encodes.lock().unwrap().clone()
    }

    pub fn selections(&self) -> Vec<EngineSelection> {
        self.selections.lock().unwrap().clone()
    }
}

/// Encoder that marks query `i` of each call with a one-hot first token.
pub struct MockEncoder {
    recorder: Recorder,
}

impl QueryEncoder for MockEncoder {
    fn dim(&self) -> usize {
        DIM
    }

    fn encode(&self, queries: &[String], options: &EncodeOptions) -> Result<ndarray::Array3<f32>> {
        self.recorder
            .encodes
            .lock()
            .unwrap()
            .push((queries.len(), *options));
        let mut embeddings = Array3::zeros((queries.len(), options.query_maxlen, DIM));
        for (i, query) in queries.iter().enumerate() {
            embeddings[[i, 0, query.len() % DIM]] = 1.0;
        }
        Ok(embeddings)
    }
}

/// Backend returning `num_results` descending results, more than any `k`
/// the tests ask for, and failing when the query's first token is all
/// zero in column `fail_column`.
pub struct MockBackend {
    num_results: usize,
    fail_column: Option<usize>,
    recorder: Recorder,
}

impl RankingBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn dim(&self) -> usize {
        DIM
    }

    fn rank(
        &self,
        config: &Configuration,
        query: ArrayView2<'_, f32>,
        request: &RankRequest<'_>,
        tracker: &mut dyn Tracker,
    ) -> Result<(Vec<PassageId>, Vec<Score>)> {
        tracker.begin("Scoring");
        let admits = (0..self.num_results as PassageId)
            .map(|pid| request.candidates.admits(pid))
            .collect();
        self.recorder.ranks.lock().unwrap().push(RecordedRank {
            k: request.k,
            ncells: config.ncells,
            centroid_score_threshold: config.centroid_score_threshold,
            ndocs: config.ndocs,
            pool: request.candidates.pool.map(|pool| {
                let mut pids: Vec<_> = pool.iter().collect();
                pids.sort_unstable();
                pids
            }),
            admits,
        });
        if let Some(column) = self.fail_column {
            if query[[0, column]] != 0.0 {
                return Err(anyhow!("backend rejected the query"));
            }
        }
        let pids: Vec<PassageId> = (0..self.num_results as PassageId).collect();
        let scores = pids.iter().map(|&pid| 100.0 - pid as Score).collect();
        tracker.end("Scoring");
        Ok((pids, scores))
    }
}

/// Index store serving a fixed configuration and a [`MockBackend`].
pub struct MemoryIndexStore {
    pub config: Configuration,
    pub num_results: usize,
    pub fail_column: Option<usize>,
    pub recorder: Recorder,
}

impl IndexStore for MemoryIndexStore {
    fn load_config(&self, _index_path: &Path) -> Result<Configuration> {
        Ok(self.config.clone())
    }

    fn open_backend(
        &self,
        _index_path: &Path,
        selection: &EngineSelection,
    ) -> Result<Box<dyn RankingBackend>> {
        self.recorder
            .selections
            .lock()
            .unwrap()
            .push(selection.clone());
        Ok(Box::new(MockBackend {
            num_results: self.num_results,
            fail_column: self.fail_column,
            recorder: self.recorder.clone(),
        }))
    }
}

/// Checkpoint store serving a fixed configuration and a [`MockEncoder`].
pub struct MemoryCheckpointStore {
    pub config: Configuration,
    pub recorder: Recorder,
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load_config(&self, _checkpoint: &Path) -> Result<Configuration> {
        Ok(self.config.clone())
    }

    fn load_encoder(
        &self,
        _checkpoint: &Path,
        _config: &Configuration,
        _device: ComputeDevice,
    ) -> Result<Box<dyn QueryEncoder>> {
        Ok(Box::new(MockEncoder {
            recorder: self.recorder.clone(),
        }))
    }
}

/// Inputs of a mock-backed searcher.
#[derive(Debug, Clone, Default)]
pub struct Fixture {
    pub caller: Configuration,
    pub process: Configuration,
    pub checkpoint: Configuration,
    pub index: Configuration,
    pub engine: EngineRequest,
    pub num_threads: usize,
    pub num_results: usize,
    pub fail_column: Option<usize>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            num_threads: 1,
            num_results: 1000,
            ..Self::default()
        }
    }

    pub fn build(&self) -> (warp_searcher::Result<Searcher>, Recorder) {
        let recorder = Recorder::default();
        let index_store = MemoryIndexStore {
            config: self.index.clone(),
            num_results: self.num_results,
            fail_column: self.fail_column,
            recorder: recorder.clone(),
        };
        let checkpoint_store = MemoryCheckpointStore {
            config: self.checkpoint.clone(),
            recorder: recorder.clone(),
        };
        let options = SearcherOptions {
            checkpoint: Some(PathBuf::from("checkpoints/mock")),
            config: self.caller.clone(),
            index_root: Some(PathBuf::from("indexes")),
            engine: self.engine.clone(),
            capabilities: Some(Capabilities::new(self.num_threads)),
            ..SearcherOptions::default()
        };
        let searcher = Searcher::with_stores(
            "mock",
            options,
            &self.process,
            &index_store,
            &checkpoint_store,
        );
        (searcher, recorder)
    }

    pub fn searcher(&self) -> (Searcher, Recorder) {
        let (searcher, recorder) = self.build();
        (searcher.expect("mock searcher should construct"), recorder)
    }
}
