use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{concatenate, s, Array3, ArrayView2, Axis};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::checkpoint::{CheckpointStore, DiskCheckpointStore, EncodeOptions, QueryEncoder};
use crate::config::{ConfigResolver, Configuration, LocationOverrides};
use crate::data::{Collection, Provenance, QueryBatch, RankedResult, Ranking};
use crate::engine::{
    Capabilities, EngineRequest, EngineSelection, EngineSelector, RankRequest, RankingBackend,
};
use crate::error::{Result, SearchError};
use crate::index::{DiskIndexStore, IndexStore};
use crate::utils::tracker::{NopTracker, Tracker};
use crate::utils::types::{CandidateFilter, CandidatePool, FilterFn, QueryEmbeddings, QueryId};

/// Queries above this count are encoded in chunks of this size.
pub const ENCODE_BATCH_SIZE: usize = 128;

const SEARCH_ALL_SOURCE: &str = "Searcher::search_all";

/// Construction arguments besides the index name.
#[derive(Debug, Clone, Default)]
pub struct SearcherOptions {
    /// Checkpoint directory; falls back to the one the index names
    pub checkpoint: Option<PathBuf>,
    pub collection: Option<PathBuf>,
    /// Caller configuration, highest precedence
    pub config: Configuration,
    pub index_root: Option<PathBuf>,
    pub engine: EngineRequest,
    /// Declared concurrency; detected from the configuration when unset
    pub capabilities: Option<Capabilities>,
}

/// Per-call options of [`Searcher::search`].
#[derive(Default)]
pub struct SearchOptions<'a> {
    pub filter_fn: Option<&'a FilterFn>,
    pub full_length_search: bool,
    pub pids: Option<&'a CandidatePool>,
    pub tracker: Option<&'a mut dyn Tracker>,
}

/// Per-call options of [`Searcher::search_all`].
#[derive(Default)]
pub struct SearchAllOptions<'a> {
    pub filter_fn: Option<&'a FilterFn>,
    pub full_length_search: bool,
    /// Candidate pool per query id; queries without an entry are unrestricted
    pub qid_to_pids: Option<&'a HashMap<QueryId, CandidatePool>>,
    pub show_progress: bool,
}

/// Per-call options of [`Searcher::dense_search`].
#[derive(Default)]
pub struct DenseSearchOptions<'a> {
    pub filter_fn: Option<&'a FilterFn>,
    pub pids: Option<&'a CandidatePool>,
    pub tracker: Option<&'a mut dyn Tracker>,
}

/// Turns query text into ranked passages through one encoder and one
/// ranking backend, both fixed at construction.
///
/// A searcher serves one call at a time; the `&mut self` receivers of the
/// search methods reflect the breadth options they may fill in.
pub struct Searcher {
    config: Configuration,
    index_path: PathBuf,
    checkpoint: PathBuf,
    collection: Option<Collection>,
    engine: EngineSelection,
    encoder: Box<dyn QueryEncoder>,
    ranker: Box<dyn RankingBackend>,
}

impl Searcher {
    /// Open the on-disk index `index` with process defaults from the
    /// environment.
    pub fn new(index: &str, options: SearcherOptions) -> Result<Self> {
        Self::with_stores(
            index,
            options,
            &Configuration::from_env(),
            &DiskIndexStore,
            &DiskCheckpointStore,
        )
    }

    /// Construct against explicit stores and process defaults.
    ///
    /// Steps, each failing fast: resolve configuration, select the engine,
    /// load the collection, load the encoder, open the backend, check that
    /// the index and encoder widths agree.
    pub fn with_stores(
        index: &str,
        options: SearcherOptions,
        process: &Configuration,
        index_store: &dyn IndexStore,
        checkpoint_store: &dyn CheckpointStore,
    ) -> Result<Self> {
        let overrides = LocationOverrides {
            index_root: options.index_root,
            checkpoint: options.checkpoint,
            collection: options.collection,
        };
        let resolved = ConfigResolver::load(
            index,
            &overrides,
            &options.config,
            process,
            index_store,
            checkpoint_store,
        )?;
        let config = resolved.config;

        let capabilities = options
            .capabilities
            .unwrap_or_else(|| Capabilities::detect(&config));
        let engine = EngineSelector::select(&config, &options.engine, &capabilities)?;

        let collection = match &resolved.collection {
            Some(path) => Some(
                Collection::load(path)
                    .map_err(|e| SearchError::config_load("collection", path, e))?,
            ),
            None => None,
        };

        let encoder = checkpoint_store
            .load_encoder(&resolved.checkpoint, &config, engine.device)
            .map_err(|e| SearchError::config_load("checkpoint", &resolved.checkpoint, e))?;

        let ranker = index_store
            .open_backend(&resolved.index_path, &engine)
            .map_err(SearchError::BackendInit)?;
        if ranker.dim() != encoder.dim() {
            return Err(SearchError::config_load(
                "index",
                &resolved.index_path,
                anyhow::anyhow!(
                    "index stores {}-dim embeddings but checkpoint {:?} encodes {}-dim queries",
                    ranker.dim(),
                    resolved.checkpoint,
                    encoder.dim()
                ),
            ));
        }

        info!(
            index = %resolved.index_path.display(),
            engine = %engine.variant,
            backend = ranker.name(),
            passages = collection.as_ref().map(Collection::len),
            "Searcher ready"
        );

        Ok(Self {
            config,
            index_path: resolved.index_path,
            checkpoint: resolved.checkpoint,
            collection,
            engine,
            encoder,
            ranker,
        })
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn engine(&self) -> &EngineSelection {
        &self.engine
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn checkpoint(&self) -> &Path {
        &self.checkpoint
    }

    pub fn collection(&self) -> Option<&Collection> {
        self.collection.as_ref()
    }

    /// Set or override options. Values set here are never replaced by the
    /// breadth defaults.
    pub fn configure(&mut self, options: &Configuration) {
        self.config.assign(options);
        debug!(options = ?options.assigned(), "Reconfigured searcher");
    }

    /// Encode `queries` into `[queries.len(), num_tokens, dim]`, in input
    /// order, chunking above [`ENCODE_BATCH_SIZE`] queries.
    pub fn encode(&self, queries: &[String], full_length_search: bool) -> Result<QueryEmbeddings> {
        let chunked = queries.len() > ENCODE_BATCH_SIZE;
        let options = EncodeOptions {
            bsize: chunked.then_some(ENCODE_BATCH_SIZE),
            query_maxlen: self.config.query_maxlen_or_default(),
            full_length_search,
        };

        let embeddings = if chunked {
            let chunks = queries
                .chunks(ENCODE_BATCH_SIZE)
                .map(|chunk| self.encode_chunk(chunk, &options))
                .collect::<Result<Vec<_>>>()?;
            Self::stack_padded(chunks)?
        } else {
            self.encode_chunk(queries, &options)?
        };

        Ok(embeddings)
    }

    fn encode_chunk(&self, queries: &[String], options: &EncodeOptions) -> Result<QueryEmbeddings> {
        let embeddings = self
            .encoder
            .encode(queries, options)
            .map_err(SearchError::Encoding)?;
        let (num_queries, _, dim) = embeddings.dim();
        if num_queries != queries.len() || dim != self.encoder.dim() {
            return Err(SearchError::Encoding(anyhow::anyhow!(
                "encoder returned {} x {}-dim embeddings for {} queries of dim {}",
                num_queries,
                dim,
                queries.len(),
                self.encoder.dim()
            )));
        }
        Ok(embeddings)
    }

    /// Concatenate chunks along the query axis, zero-padding token rows to
    /// the widest chunk.
    fn stack_padded(chunks: Vec<QueryEmbeddings>) -> Result<QueryEmbeddings> {
        let width = chunks.iter().map(|c| c.dim().1).max().unwrap_or(0);
        let padded: Vec<QueryEmbeddings> = chunks
            .into_iter()
            .map(|chunk| {
                let (n, tokens, dim) = chunk.dim();
                if tokens == width {
                    return chunk;
                }
                let mut wide = Array3::zeros((n, width, dim));
                wide.slice_mut(s![.., ..tokens, ..]).assign(&chunk);
                wide
            })
            .collect();
        let views: Vec<_> = padded.iter().map(|c| c.view()).collect();
        concatenate(Axis(0), &views).map_err(|e| SearchError::Encoding(e.into()))
    }

    /// Encode and rank a single query.
    pub fn search(&mut self, text: &str, k: usize, options: SearchOptions<'_>) -> Result<RankedResult> {
        let mut nop = NopTracker;
        let tracker: &mut dyn Tracker = match options.tracker {
            Some(tracker) => tracker,
            None => &mut nop,
        };

        tracker.begin("Query Encoding");
        let embeddings = self.encode(&[text.to_string()], options.full_length_search)?;
        tracker.end("Query Encoding");

        self.rank_one(
            embeddings.index_axis(Axis(0), 0),
            k,
            CandidateFilter::new(options.filter_fn, options.pids),
            tracker,
        )
    }

    /// Encode the whole batch once, then rank each query in batch order.
    ///
    /// The first ranking failure aborts the batch.
    pub fn search_all(
        &mut self,
        queries: &QueryBatch,
        k: usize,
        options: SearchAllOptions<'_>,
    ) -> Result<Ranking> {
        let embeddings = self.encode(&queries.texts(), options.full_length_search)?;

        let progress = if options.show_progress {
            let bar = ProgressBar::new(queries.len() as u64);
            if let Ok(style) =
                ProgressStyle::default_bar().template("{bar:40.cyan/blue} {pos}/{len} queries {msg}")
            {
                bar.set_style(style);
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        let mut entries = Vec::with_capacity(queries.len());
        for (query_idx, qid) in queries.qids().enumerate() {
            let pool = options.qid_to_pids.and_then(|pools| pools.get(qid));
            let result = self
                .rank_one(
                    embeddings.index_axis(Axis(0), query_idx),
                    k,
                    CandidateFilter::new(options.filter_fn, pool),
                    &mut NopTracker,
                )
                .map_err(|e| match e {
                    SearchError::Ranking { source, .. } => SearchError::Ranking {
                        query: Some(qid.clone()),
                        source,
                    },
                    other => other,
                })?;
            entries.push((qid.clone(), result));
            progress.inc(1);
        }
        progress.finish_and_clear();

        let provenance = Provenance::new(
            SEARCH_ALL_SOURCE,
            queries.provenance().clone(),
            self.config.export(),
            k,
        );
        Ok(Ranking::new(entries, provenance))
    }

    /// Rank already-encoded query tokens (`[num_tokens, dim]`).
    ///
    /// Fills unset breadth options from `k`, passes `k` to the advanced
    /// engines only, and keeps at most `k` results.
    pub fn dense_search(
        &mut self,
        query: ArrayView2<'_, f32>,
        k: usize,
        options: DenseSearchOptions<'_>,
    ) -> Result<RankedResult> {
        let mut nop = NopTracker;
        let tracker: &mut dyn Tracker = match options.tracker {
            Some(tracker) => tracker,
            None => &mut nop,
        };
        self.rank_one(
            query,
            k,
            CandidateFilter::new(options.filter_fn, options.pids),
            tracker,
        )
    }

    fn rank_one(
        &mut self,
        query: ArrayView2<'_, f32>,
        k: usize,
        candidates: CandidateFilter<'_>,
        tracker: &mut dyn Tracker,
    ) -> Result<RankedResult> {
        self.config.fill_breadth_defaults(k);

        let request = RankRequest {
            k: self.engine.variant.is_advanced().then_some(k),
            candidates,
        };
        let (pids, scores) = self
            .ranker
            .rank(&self.config, query, &request, tracker)
            .map_err(|source| SearchError::Ranking {
                query: None,
                source,
            })?;

        Ok(RankedResult::truncated(pids, scores, k))
    }
}
