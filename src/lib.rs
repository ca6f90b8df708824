//! Coarse path-cost estimation for a deterministic lockstep RTS movement
//! planner.
//!
//! The map is partitioned into fixed-size blocks; for every block and every
//! mobility class the crate precomputes a representative in-block point and
//! the traversal cost to each of its eight neighbors. Long-range route
//! planning reads these precomputed costs instead of running the fine-grained
//! search across the whole map. Terrain deformation feeds an incremental,
//! rate-limited recomputation queue, the grid image is persisted to a
//! compressed cache file between runs, and a 32-bit fingerprint of the grid
//! lets networked clients verify they derived identical state.

pub mod config;
pub mod estimator;
pub mod math;
pub mod search;
pub mod terrain;

pub use config::EstimatorConfig;
pub use estimator::{
    CacheAddOutcome, CacheScope, CostGrid, Direction, GridBufferArena, PathEstimator,
    COST_INFINITE,
};
pub use search::{GridSearch, Node, SearchResult};
pub use terrain::{MobilityClass, MobilityTable, TerrainMap};

// ============================================================================
// Profiling Macros
// ============================================================================

/// Conditionally log messages based on frame interval when the perf_stats
/// feature is enabled.
///
/// Logs every 100 frames. When the feature is disabled this expands to an
/// empty block and the arguments are not evaluated.
#[macro_export]
#[cfg(feature = "perf_stats")]
macro_rules! profile_log {
    ($frame:expr, $($arg:tt)*) => {
        if $frame % 100 == 0 {
            tracing::info!($($arg)*);
        }
    };
}

#[macro_export]
#[cfg(not(feature = "perf_stats"))]
macro_rules! profile_log {
    ($frame:expr, $($arg:tt)*) => {};
}
