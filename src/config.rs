use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Static estimator configuration, loaded once at startup. These values
/// shape deterministic derived state (the cost grid, the update budget), so
/// all clients of a network game must load identical values; changing them
/// mid-game would desync.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Cells per block edge.
    pub block_size: u32,
    /// Incremental update throughput scale: the per-frame budget is the
    /// backlog times this, clamped below.
    pub update_rate: f32,
    /// Budget floor, in blocks per frame (before the class multiplier).
    pub min_update_blocks: usize,
    /// Budget ceiling, in blocks per frame (before the class multiplier).
    pub max_update_blocks: usize,
    /// Maximum entries per result-cache instance.
    pub cache_capacity: usize,
    /// Directory for the persisted grid. `None` disables persistence.
    pub cache_dir: Option<PathBuf>,
    /// Map name, part of the cache file name.
    pub map_name: String,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            block_size: 16,
            update_rate: 1.0,
            min_update_blocks: 4,
            max_update_blocks: 64,
            cache_capacity: 1024,
            cache_dir: None,
            map_name: "unnamed".to_string(),
        }
    }
}

impl EstimatorConfig {
    /// Load from a RON file, falling back to defaults on any failure.
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match ron::from_str::<EstimatorConfig>(&contents) {
                Ok(config) => {
                    info!("Loaded estimator config from {}", path.display());
                    config
                }
                Err(e) => {
                    error!("Failed to parse estimator config: {}", e);
                    error!("Using default EstimatorConfig");
                    EstimatorConfig::default()
                }
            },
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                error!("Using default EstimatorConfig");
                EstimatorConfig::default()
            }
        }
    }
}
