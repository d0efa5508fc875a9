//! `warp-search`: build toy checkpoints and indexes, and run batch searches.
//!
//! # Commands
//!
//! - `checkpoint`: write a hashing-encoder checkpoint
//! - `index`: encode a `pid\ttext` collection and write an index
//! - `search`: run `search_all` over a `qid\ttext` query file and save the ranking

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use warp_searcher::checkpoint::{read_checkpoint, write_checkpoint, CheckpointFile, EncoderSpec};
use warp_searcher::index::{create_index, sample_centroids};
use warp_searcher::utils::logging::{init_logging, LogConfig, LogFormat};
use warp_searcher::{
    Capabilities, Collection, Configuration, EngineRequest, HashingEncoder, QueryBatch,
    SearchAllOptions, Searcher, SearcherOptions, WarpConfig,
};

/// Searcher front-end for XTR/WARP-style indexes
#[derive(Parser)]
#[command(name = "warp-search")]
#[command(version)]
#[command(about = "Build toy checkpoints and indexes, and run batch searches")]
#[command(propagate_version = true)]
struct Cli {
    /// Level filter (trace, debug, info, warn, error); RUST_LOG overrides
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[arg(long, global = true, default_value = "pretty")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EngineKind {
    Baseline,
    Warp,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a hashing-encoder checkpoint
    Checkpoint {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        dim: usize,
        #[arg(long)]
        query_maxlen: Option<usize>,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Encode a collection with a checkpoint and write an index
    Index {
        #[arg(long)]
        collection: PathBuf,
        #[arg(long)]
        checkpoint: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long)]
        index_root: Option<PathBuf>,
        /// Number of centroids sampled from the passage embeddings
        #[arg(long, default_value_t = 64)]
        centroids: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Run a batch search and save the ranking
    Search {
        #[arg(long)]
        index: String,
        #[arg(long)]
        index_root: Option<PathBuf>,
        #[arg(long)]
        checkpoint: Option<PathBuf>,
        #[arg(long)]
        queries: PathBuf,
        #[arg(long, default_value_t = 10)]
        k: usize,
        #[arg(long, value_enum, default_value_t = EngineKind::Baseline)]
        engine: EngineKind,
        #[arg(long)]
        t_prime: Option<usize>,
        #[arg(long, default_value_t = warp_searcher::engine::DEFAULT_BOUND)]
        bound: usize,
        /// Fused decompression-merge in the multi-worker engine
        #[arg(long)]
        fused: bool,
        #[arg(long)]
        mmap: bool,
        #[arg(long)]
        gpus: Option<usize>,
        #[arg(long)]
        num_threads: Option<usize>,
        #[arg(long)]
        ncells: Option<usize>,
        #[arg(long)]
        ndocs: Option<usize>,
        #[arg(long)]
        centroid_score_threshold: Option<f32>,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        no_progress: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&LogConfig {
        level: cli.log_level.clone(),
        format: cli.log_format,
    })?;

    match cli.command {
        Commands::Checkpoint {
            path,
            dim,
            query_maxlen,
            seed,
        } => {
            let config = Configuration {
                query_maxlen,
                ..Configuration::default()
            };
            write_checkpoint(&path, &CheckpointFile::hashing(dim, seed, config))?;
        },
        Commands::Index {
            collection,
            checkpoint,
            name,
            index_root,
            centroids,
            seed,
        } => {
            let passages = Collection::load(&collection)?;
            let encoder = match read_checkpoint(&checkpoint)?.encoder {
                EncoderSpec::Hashing { dim, seed } => HashingEncoder::new(dim, seed)?,
            };
            let documents: Vec<_> = passages.iter().map(|text| encoder.encode_document(text)).collect();
            let centroids = sample_centroids(&documents, centroids, seed)?;

            let index_root = index_root.unwrap_or_else(|| {
                Configuration::from_env().index_root_or_default().to_path_buf()
            });
            let config = Configuration::default()
                .with_checkpoint(checkpoint)
                .with_collection(collection);
            let metadata = create_index(&index_root.join(&name), &documents, centroids.view(), &config)?;
            info!(
                index = %name,
                passages = metadata.num_passages,
                centroids = metadata.num_centroids,
                "Index built"
            );
        },
        Commands::Search {
            index,
            index_root,
            checkpoint,
            queries,
            k,
            engine,
            t_prime,
            bound,
            fused,
            mmap,
            gpus,
            num_threads,
            ncells,
            ndocs,
            centroid_score_threshold,
            output,
            no_progress,
        } => {
            let config = Configuration {
                load_index_with_mmap: mmap.then_some(true),
                total_visible_gpus: gpus,
                num_threads,
                ncells,
                ndocs,
                centroid_score_threshold,
                ..Configuration::default()
            };
            let engine = match engine {
                EngineKind::Baseline => EngineRequest::Baseline,
                EngineKind::Warp => EngineRequest::Warp(WarpConfig {
                    t_prime,
                    bound,
                    fused_decompression_merge: fused,
                }),
            };

            let mut searcher = Searcher::new(
                &index,
                SearcherOptions {
                    checkpoint,
                    config,
                    index_root,
                    engine,
                    capabilities: num_threads.map(Capabilities::new),
                    ..SearcherOptions::default()
                },
            )?;

            let batch = QueryBatch::load_tsv(&queries)?;
            let ranking = searcher.search_all(
                &batch,
                k,
                SearchAllOptions {
                    show_progress: !no_progress,
                    ..SearchAllOptions::default()
                },
            )?;
            let meta = ranking
                .save(&output)
                .with_context(|| format!("Failed to save ranking to {:?}", output))?;
            info!(
                output = %output.display(),
                meta = %meta.display(),
                queries = ranking.len(),
                "Search complete"
            );
        },
    }

    Ok(())
}
