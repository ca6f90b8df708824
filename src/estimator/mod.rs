//! The path-cost estimator: coarse grid, incremental invalidation,
//! persistence, fingerprinting and the search-result caches.

mod arena;
mod builder;
mod cache;
mod change;
mod checksum;
mod grid;
mod persist;
mod types;

#[cfg(test)]
mod tests;

// ============================================================================
// PUBLIC API
// ============================================================================

pub use arena::{GridBufferArena, GridBuffers};
pub use cache::{
    CacheAddOutcome, CacheKey, CacheStats, CachedPath, KeyScheme, PathCache,
    CACHE_LIFETIME_FRAMES,
};
pub use grid::CostGrid;
pub use types::{BlockOffset, BlockPos, BlockRect, Direction, COST_INFINITE, FORMAT_VERSION};

use crate::config::EstimatorConfig;
use crate::math::{FixedNum, WorldRect};
use crate::profile_log;
use crate::search::{Node, SearchResult};
use crate::terrain::{MobilityTable, TerrainMap};
use change::ChangeTracker;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Name of the grid entry inside the cache file.
const CACHE_ENTRY_TAG: &str = "vertex-costs";

/// Which of the two independent result caches a call addresses: `Synced`
/// holds results shared by the deterministic simulation, `Speculative` holds
/// unsynced lookahead lookups. The two never share a lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheScope {
    Synced,
    Speculative,
}

/// Coarse path-cost estimator for one block size.
///
/// # Lifecycle
///
/// 1. Construction loads the persisted grid if a valid cache file exists,
///    otherwise runs the full two-phase parallel computation and writes the
///    cache file.
/// 2. [`map_changed`](Self::map_changed) marks terrain edits;
///    [`update`](Self::update), called once per simulation frame, drains the
///    backlog on a budget and expires cached search results.
/// 3. Drop discards any still-queued recompute work and returns the grid
///    buffers to the arena for the next estimator at this slot.
pub struct PathEstimator {
    table: MobilityTable,
    grid: CostGrid,
    ranking: builder::OffsetRanking,
    tracker: ChangeTracker,
    update_rate: FixedNum,
    min_update_blocks: usize,
    max_update_blocks: usize,
    cell_size: FixedNum,
    cache_path: Option<PathBuf>,
    synced_cache: Mutex<PathCache>,
    speculative_cache: Mutex<PathCache>,
    arena: Arc<GridBufferArena>,
}

impl PathEstimator {
    pub fn new(
        config: &EstimatorConfig,
        table: MobilityTable,
        terrain: &TerrainMap,
        arena: Arc<GridBufferArena>,
    ) -> Self {
        let mut buffers = arena.claim();
        let mut grid = CostGrid::new(
            config.block_size,
            terrain.width,
            terrain.height,
            table.len(),
            &mut buffers,
        );
        let directional = table.iter().any(|class| !class.direction_independent);
        let tracker = ChangeTracker::new(grid.num_blocks(), directional, &mut buffers);
        let ranking = builder::OffsetRanking::new(config.block_size);

        let hash = checksum::input_hash(terrain, &table, config.block_size);
        let cache_path = config.cache_dir.as_ref().map(|dir| {
            persist::cache_file_path(dir, &config.map_name, config.block_size, &table)
        });

        let mut loaded = false;
        if let Some(path) = &cache_path {
            match persist::read_grid(path, CACHE_ENTRY_TAG, &mut grid, hash) {
                Ok(true) => {
                    info!("[GRID CACHE] loaded {} from {}", CACHE_ENTRY_TAG, path.display());
                    loaded = true;
                }
                Ok(false) => {
                    info!("[GRID CACHE] no cache file at {}", path.display());
                }
                Err(e) => {
                    warn!(
                        "[GRID CACHE] stale or corrupt file {}: {}, removing",
                        path.display(),
                        e
                    );
                    let _ = std::fs::remove_file(path);
                }
            }
        }

        if !loaded {
            let start = Instant::now();
            builder::build_full(&mut grid, terrain, &table, &ranking);
            info!(
                "[GRID BUILD] {} blocks x {} classes computed in {:?}",
                grid.num_blocks(),
                table.len(),
                start.elapsed()
            );
            if let Some(path) = &cache_path {
                if let Err(e) = persist::write_grid(path, CACHE_ENTRY_TAG, &grid, hash) {
                    warn!("[GRID CACHE] write to {} failed: {}", path.display(), e);
                }
            }
        }

        let synced_cache = Mutex::new(PathCache::new(
            KeyScheme::Exact,
            grid.blocks_x,
            grid.blocks_z,
            config.cache_capacity,
        ));
        let speculative_cache = Mutex::new(PathCache::new(
            KeyScheme::Exact,
            grid.blocks_x,
            grid.blocks_z,
            config.cache_capacity,
        ));

        Self {
            table,
            grid,
            ranking,
            tracker,
            update_rate: FixedNum::from_num(config.update_rate),
            min_update_blocks: config.min_update_blocks,
            max_update_blocks: config.max_update_blocks,
            cell_size: terrain.cell_size,
            cache_path,
            synced_cache,
            speculative_cache,
            arena,
        }
    }

    // ------------------------------------------------------------------
    // Grid queries
    // ------------------------------------------------------------------

    pub fn grid(&self) -> &CostGrid {
        &self.grid
    }

    pub fn mobility_table(&self) -> &MobilityTable {
        &self.table
    }

    /// Precomputed cost from a block to its neighbor in `dir`, or
    /// [`COST_INFINITE`] when no route exists.
    pub fn vertex_cost(&self, class: usize, b: BlockPos, dir: Direction) -> FixedNum {
        self.grid.vertex_cost(class, b, dir)
    }

    /// The block's representative cell for a class.
    pub fn block_offset(&self, class: usize, b: BlockPos) -> BlockOffset {
        self.grid.block_offset(class, b)
    }

    // ------------------------------------------------------------------
    // Terrain change tracking
    // ------------------------------------------------------------------

    /// Mark a world-space rectangle of terrain as changed. Affected blocks
    /// are queued for budgeted recomputation during [`update`](Self::update).
    pub fn map_changed(&mut self, rect: WorldRect) {
        let to_cell = |v: FixedNum| -> i64 { (v / self.cell_size).floor().to_num::<i64>() };
        let max_x = self.grid.blocks_x as i64 * self.grid.block_size as i64 - 1;
        let max_z = self.grid.blocks_z as i64 * self.grid.block_size as i64 - 1;
        let x1 = to_cell(rect.min.x).clamp(0, max_x);
        let z1 = to_cell(rect.min.z).clamp(0, max_z);
        let x2 = to_cell(rect.max.x).clamp(0, max_x);
        let z2 = to_cell(rect.max.z).clamp(0, max_z);
        if x2 < x1 || z2 < z1 {
            return;
        }
        self.tracker
            .map_changed(&self.grid, x1 as u32, z1 as u32, x2 as u32, z2 as u32);
    }

    /// Blocks currently queued for recomputation.
    pub fn backlog(&self) -> usize {
        self.tracker.backlog()
    }

    /// Obsolete direction bits currently pending for a block.
    pub fn obsolete_mask(&self, b: BlockPos) -> u8 {
        self.tracker.obsolete_mask(&self.grid, b)
    }

    /// Per-frame tick: expire cached search results, then drain a budgeted
    /// batch of obsolete blocks through the offset and cost phases (in that
    /// order, with the same barrier as the full build).
    pub fn update(&mut self, terrain: &TerrainMap, current_frame: u32) {
        self.lock_cache(CacheScope::Synced).tick(current_frame);
        self.lock_cache(CacheScope::Speculative).tick(current_frame);

        let budget = change::tick_budget(
            self.tracker.backlog(),
            self.update_rate,
            self.min_update_blocks,
            self.max_update_blocks,
            self.table.len(),
        );
        if budget == 0 {
            return;
        }
        let batch = self.tracker.take_batch(&self.grid, budget);
        if batch.is_empty() {
            return;
        }
        builder::rebuild_blocks(&mut self.grid, terrain, &self.table, &self.ranking, &batch);
        profile_log!(
            current_frame,
            "[GRID UPDATE] recomputed {} blocks, backlog {}",
            batch.len(),
            self.tracker.backlog()
        );
    }

    // ------------------------------------------------------------------
    // Checksum
    // ------------------------------------------------------------------

    /// Deterministic 32-bit fingerprint over the whole grid, for the host's
    /// cross-client consistency check.
    pub fn calc_checksum(&self) -> u32 {
        checksum::grid_checksum(&self.grid)
    }

    // ------------------------------------------------------------------
    // Result caches
    // ------------------------------------------------------------------

    fn lock_cache(&self, scope: CacheScope) -> MutexGuard<'_, PathCache> {
        let mutex = match scope {
            CacheScope::Synced => &self.synced_cache,
            CacheScope::Speculative => &self.speculative_cache,
        };
        mutex.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_cache(
        &self,
        scope: CacheScope,
        start: BlockPos,
        goal: BlockPos,
        goal_radius: FixedNum,
        class: u8,
        result: SearchResult,
        path: Vec<Node>,
        current_frame: u32,
    ) -> CacheAddOutcome {
        let key = CacheKey {
            start,
            goal,
            goal_radius,
            class,
        };
        self.lock_cache(scope).add(key, result, path, current_frame)
    }

    pub fn get_cache(
        &self,
        scope: CacheScope,
        start: BlockPos,
        goal: BlockPos,
        goal_radius: FixedNum,
        class: u8,
    ) -> Option<CachedPath> {
        let key = CacheKey {
            start,
            goal,
            goal_radius,
            class,
        };
        self.lock_cache(scope).get(&key)
    }

    pub fn cache_stats(&self, scope: CacheScope) -> CacheStats {
        self.lock_cache(scope).stats()
    }

    // ------------------------------------------------------------------
    // Cache file management
    // ------------------------------------------------------------------

    /// Delete the persisted grid for this estimator, if any.
    pub fn remove_cache_file(&self) {
        if let Some(path) = &self.cache_path {
            match std::fs::remove_file(path) {
                Ok(()) => info!("[GRID CACHE] removed {}", path.display()),
                Err(e) => debug!("[GRID CACHE] remove {} failed: {}", path.display(), e),
            }
        }
    }
}

impl Drop for PathEstimator {
    fn drop(&mut self) {
        // Pending recompute work is dropped, not persisted: the next load
        // recomputes from terrain.
        self.tracker.clear_backlog();
        let mut buffers = GridBuffers::default();
        self.grid.reclaim(&mut buffers);
        self.tracker.reclaim(&mut buffers);
        self.arena.release(buffers);
    }
}
