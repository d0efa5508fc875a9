use anyhow::anyhow;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::Configuration;
use crate::checkpoint::CheckpointStore;
use crate::error::{Result, SearchError};
use crate::index::IndexStore;

/// Locations and the effective configuration produced at searcher start-up.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: Configuration,
    pub index_path: PathBuf,
    pub checkpoint: PathBuf,
    pub collection: Option<PathBuf>,
}

/// Explicit arguments handed to the searcher next to the caller config.
#[derive(Debug, Clone, Default)]
pub struct LocationOverrides {
    pub index_root: Option<PathBuf>,
    pub checkpoint: Option<PathBuf>,
    pub collection: Option<PathBuf>,
}

/// Merges the caller, checkpoint, index and process configuration sources.
///
/// Resolution happens in two pure stages:
/// 1. `initial = merged([caller, process])`
/// 2. `effective = merged([caller, checkpoint, index, initial])`
///
/// which yields caller > checkpoint > index > process defaults.
pub struct ConfigResolver;

impl ConfigResolver {
    pub fn initial(caller: &Configuration, process: &Configuration) -> Configuration {
        Configuration::merged(&[caller, process])
    }

    pub fn effective(
        caller: &Configuration,
        checkpoint: &Configuration,
        index: &Configuration,
        initial: &Configuration,
    ) -> Configuration {
        Configuration::merged(&[caller, checkpoint, index, initial])
    }

    /// Both stages over already-loaded sources.
    pub fn resolve(
        caller: &Configuration,
        process: &Configuration,
        checkpoint: &Configuration,
        index: &Configuration,
    ) -> Configuration {
        let initial = Self::initial(caller, process);
        Self::effective(caller, checkpoint, index, &initial)
    }

    /// Locate and load the index and checkpoint configurations, then merge.
    ///
    /// The checkpoint is the explicit override, else a `checkpoint` set in
    /// the caller or process configuration, else the one the index names.
    pub fn load(
        index_name: &str,
        overrides: &LocationOverrides,
        caller: &Configuration,
        process: &Configuration,
        index_store: &dyn IndexStore,
        checkpoint_store: &dyn CheckpointStore,
    ) -> Result<ResolvedConfig> {
        let initial = Self::initial(caller, process);

        let index_root = overrides
            .index_root
            .clone()
            .unwrap_or_else(|| initial.index_root_or_default().to_path_buf());
        let index_path = index_root.join(index_name);
        debug!(index_path = %index_path.display(), "Resolving index configuration");

        let index_config = index_store
            .load_config(&index_path)
            .map_err(|e| SearchError::config_load("index", &index_path, e))?;

        let checkpoint = overrides
            .checkpoint
            .clone()
            .or_else(|| initial.checkpoint.clone())
            .or_else(|| index_config.checkpoint.clone())
            .ok_or_else(|| {
                SearchError::config_load(
                    "checkpoint",
                    &index_path,
                    anyhow!("no checkpoint was given and the index config does not name one"),
                )
            })?;

        let checkpoint_config = checkpoint_store
            .load_config(&checkpoint)
            .map_err(|e| SearchError::config_load("checkpoint", &checkpoint, e))?;

        let mut config = Self::effective(caller, &checkpoint_config, &index_config, &initial);

        let collection = overrides
            .collection
            .clone()
            .or_else(|| config.collection.clone());

        config.assign(&Configuration {
            index_root: Some(index_root),
            index_name: Some(index_name.to_string()),
            checkpoint: Some(checkpoint.clone()),
            collection: collection.clone(),
            ..Configuration::default()
        });

        info!(
            index = %index_path.display(),
            checkpoint = %checkpoint.display(),
            options = ?config.assigned(),
            "Resolved searcher configuration"
        );

        Ok(ResolvedConfig {
            config,
            index_path,
            checkpoint,
            collection,
        })
    }
}

/// Read the `config` object embedded in a JSON metadata file.
pub(crate) fn read_embedded_config(path: &Path) -> anyhow::Result<Configuration> {
    use anyhow::Context;

    let file = std::fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut value: serde_json::Value = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to parse {:?}", path))?;

    match value.get_mut("config").map(serde_json::Value::take) {
        Some(config) => serde_json::from_value(config)
            .with_context(|| format!("Invalid `config` object in {:?}", path)),
        None => Ok(Configuration::default()),
    }
}
