use tracing::info;

use super::{Capabilities, ComputeDevice, EngineRequest, EngineVariant, WarpConfig, DEFAULT_BOUND};
use crate::config::Configuration;
use crate::error::{Result, SearchError};

/// Outcome of backend selection: the variant plus the load parameters the
/// index store needs to construct it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSelection {
    pub variant: EngineVariant,
    pub device: ComputeDevice,
    pub load_with_mmap: bool,
}

/// Chooses exactly one backend variant and rejects invalid combinations
/// before any search runs.
pub struct EngineSelector;

impl EngineSelector {
    /// Rules, first violation wins:
    /// 1. memory-mapped loading requires CPU compute
    /// 2. advanced engine + more than one worker selects the multi-worker
    ///    variant, otherwise the single-worker one
    /// 3. no advanced engine selects the baseline scorer
    pub fn select(
        config: &Configuration,
        request: &EngineRequest,
        capabilities: &Capabilities,
    ) -> Result<EngineSelection> {
        let device = ComputeDevice::from_config(config);
        let load_with_mmap = config.mmap_requested();

        if load_with_mmap && device == ComputeDevice::Gpu {
            return Err(SearchError::invalid(
                "load_index_with_mmap",
                format!(
                    "memory-mapped index can only be used with CPU compute \
                     (total_visible_gpus = {})",
                    config.total_visible_gpus.unwrap_or(0)
                ),
            ));
        }

        let variant = match request {
            EngineRequest::Baseline => EngineVariant::Baseline,
            EngineRequest::Warp(warp) => {
                let warp = Self::validate_warp(warp)?;
                if capabilities.num_threads > 1 {
                    EngineVariant::MultiWorker {
                        warp,
                        num_threads: capabilities.num_threads,
                    }
                } else {
                    EngineVariant::SingleWorker { warp }
                }
            },
        };

        info!(
            engine = %variant,
            device = %device,
            mmap = load_with_mmap,
            "Selected ranking engine"
        );

        Ok(EngineSelection {
            variant,
            device,
            load_with_mmap,
        })
    }

    fn validate_warp(warp: &WarpConfig) -> Result<WarpConfig> {
        if warp.t_prime == Some(0) {
            return Err(SearchError::invalid("t_prime", "must be greater than zero"));
        }
        Ok(WarpConfig {
            bound: if warp.bound == 0 { DEFAULT_BOUND } else { warp.bound },
            ..warp.clone()
        })
    }
}
