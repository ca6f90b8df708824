use super::arena::GridBuffers;
use super::change::{tick_budget, ChangeTracker};
use super::*;
use crate::config::EstimatorConfig;
use crate::math::{FixedNum, WorldRect};
use crate::search::{Node, SearchResult};
use crate::terrain::{
    MobilityClass, MobilityTable, TerrainMap, FLAG_BLOCK_STRUCTURE, FLAG_EXIT_ONLY,
};
use std::sync::Arc;

fn flat_terrain(width: u32, height: u32) -> TerrainMap {
    TerrainMap::new(width, height, FixedNum::ONE)
}

fn ground_table() -> MobilityTable {
    MobilityTable::new(vec![MobilityClass::ground(0, "ground", 1)])
}

fn test_config() -> EstimatorConfig {
    EstimatorConfig {
        block_size: 16,
        map_name: "test".to_string(),
        ..Default::default()
    }
}

fn new_estimator(terrain: &TerrainMap) -> PathEstimator {
    PathEstimator::new(
        &test_config(),
        ground_table(),
        terrain,
        Arc::new(GridBufferArena::new()),
    )
}

fn key(start: BlockPos, goal: BlockPos, radius: i64, class: u8) -> CacheKey {
    CacheKey {
        start,
        goal,
        goal_radius: FixedNum::from_num(radius),
        class,
    }
}

// ============================================================================
// Offsets
// ============================================================================

#[test]
fn test_offsets_stay_inside_block_and_avoid_blocked_cells() {
    let mut terrain = flat_terrain(32, 32);
    // Clutter the center of block (0,0) and sprinkle an exit-only zone.
    terrain.set_flags_rect(6, 6, 10, 10, FLAG_BLOCK_STRUCTURE);
    terrain.set_flags_rect(8, 11, 8, 12, FLAG_EXIT_ONLY);

    let est = new_estimator(&terrain);
    let grid = est.grid();
    for bz in 0..grid.blocks_z as i32 {
        for bx in 0..grid.blocks_x as i32 {
            let b = BlockPos::new(bx, bz);
            let offset = est.block_offset(0, b);
            let cells = grid.block_cells(b);
            assert!(
                cells.contains(offset.x as u32, offset.z as u32),
                "offset {:?} of block {:?} must lie inside the block",
                offset,
                b
            );
            let flags = terrain.cell_flags(offset.x as u32, offset.z as u32);
            assert_eq!(
                flags & FLAG_BLOCK_STRUCTURE,
                0,
                "offset of block {:?} sits on a structure",
                b
            );
            assert_eq!(
                flags & FLAG_EXIT_ONLY,
                0,
                "offset of block {:?} sits in an exit-only zone",
                b
            );
        }
    }
}

#[test]
fn test_fully_blocked_block_falls_back_to_center() {
    let mut terrain = flat_terrain(32, 32);
    terrain.set_flags_rect(0, 0, 15, 15, FLAG_BLOCK_STRUCTURE);

    let est = new_estimator(&terrain);
    let b = BlockPos::new(0, 0);
    assert_eq!(
        est.block_offset(0, b),
        est.grid().block_center(b),
        "a block with no feasible candidate still gets the center position"
    );
    for dir in Direction::ALL {
        assert_eq!(
            est.vertex_cost(0, b, dir),
            COST_INFINITE,
            "links of a fully blocked block must price to the sentinel ({:?})",
            dir
        );
    }
}

// ============================================================================
// Vertex costs
// ============================================================================

#[test]
fn test_wall_between_blocks_yields_infinite_link() {
    let mut terrain = flat_terrain(32, 32);
    // Full-height wall straddling the boundary between block columns 0 and 1.
    terrain.set_flags_rect(15, 0, 16, 31, FLAG_BLOCK_STRUCTURE);

    let est = new_estimator(&terrain);
    let west = BlockPos::new(0, 0);
    let east = BlockPos::new(1, 0);
    assert_eq!(est.vertex_cost(0, west, Direction::East), COST_INFINITE);
    assert_eq!(est.vertex_cost(0, east, Direction::West), COST_INFINITE);
    // Traffic along the west side of the wall is unaffected.
    assert_ne!(est.vertex_cost(0, west, Direction::South), COST_INFINITE);
}

#[test]
fn test_direction_dependent_class_prices_flat_links_symmetrically() {
    let table = MobilityTable::new(vec![MobilityClass {
        id: 0,
        name: "hover".to_string(),
        speed_mods: vec![FixedNum::ONE],
        max_slope: FixedNum::MAX,
        climb_penalty: FixedNum::from_num(4),
        direction_independent: false,
    }]);
    let terrain = flat_terrain(32, 32);
    let est = PathEstimator::new(
        &test_config(),
        table,
        &terrain,
        Arc::new(GridBufferArena::new()),
    );
    // On flat ground the two independently computed directions agree.
    let a = BlockPos::new(0, 0);
    let b = BlockPos::new(1, 0);
    assert_eq!(
        est.vertex_cost(0, a, Direction::East),
        est.vertex_cost(0, b, Direction::West)
    );
    assert_ne!(est.vertex_cost(0, a, Direction::East), COST_INFINITE);
}

// ============================================================================
// Change tracking
// ============================================================================

#[test]
fn test_interior_rect_marks_only_its_block() {
    let mut buffers = GridBuffers::default();
    let grid = CostGrid::new(16, 1024, 1024, 1, &mut buffers);
    let mut tracker = ChangeTracker::new(grid.num_blocks(), false, &mut buffers);

    // Rectangle fully inside block (3,3).
    tracker.map_changed(&grid, 50, 50, 55, 55);

    let b = BlockPos::new(3, 3);
    assert_eq!(tracker.obsolete_mask(&grid, b), 0xFF, "all 8 directions");
    assert_eq!(tracker.backlog(), 1, "only block (3,3) is queued");
    for dir in Direction::ALL {
        let n = b.step(dir);
        assert_eq!(
            tracker.obsolete_mask(&grid, n),
            0,
            "neighbor {:?} must stay unmarked",
            n
        );
    }
}

#[test]
fn test_boundary_rect_marks_only_facing_directions() {
    let mut buffers = GridBuffers::default();
    let grid = CostGrid::new(16, 1024, 1024, 1, &mut buffers);
    let mut tracker = ChangeTracker::new(grid.num_blocks(), false, &mut buffers);

    // Rectangle spanning the boundary between blocks (3,3) and (4,3).
    tracker.map_changed(&grid, 62, 50, 65, 53);

    assert_eq!(
        tracker.obsolete_mask(&grid, BlockPos::new(3, 3)),
        Direction::East.bit(),
        "west block only needs its east-facing link"
    );
    assert_eq!(
        tracker.obsolete_mask(&grid, BlockPos::new(4, 3)),
        Direction::West.bit(),
        "east block only needs its west-facing link"
    );
    assert_eq!(tracker.backlog(), 2);
}

#[test]
fn test_direction_dependent_model_marks_border_facing_bits() {
    let mut buffers = GridBuffers::default();
    let grid = CostGrid::new(16, 1024, 1024, 1, &mut buffers);
    let mut tracker = ChangeTracker::new(grid.num_blocks(), true, &mut buffers);

    tracker.map_changed(&grid, 50, 50, 55, 55);

    // The changed block still gets everything; bordering blocks get exactly
    // the direction pointing at it, since their stored reverse links cannot
    // be repaired by a mirror write.
    assert_eq!(tracker.obsolete_mask(&grid, BlockPos::new(3, 3)), 0xFF);
    assert_eq!(
        tracker.obsolete_mask(&grid, BlockPos::new(2, 3)),
        Direction::East.bit()
    );
    assert_eq!(
        tracker.obsolete_mask(&grid, BlockPos::new(2, 2)),
        Direction::SouthEast.bit()
    );
    assert_eq!(tracker.backlog(), 9, "block plus its eight neighbors");
}

#[test]
fn test_repeated_map_changed_is_idempotent() {
    let terrain = flat_terrain(64, 64);
    let mut est = new_estimator(&terrain);

    let rect = WorldRect::from_f32(20.0, 20.0, 24.0, 24.0);
    est.map_changed(rect);
    let mask_first = est.obsolete_mask(BlockPos::new(1, 1));
    est.map_changed(rect);

    assert_eq!(est.backlog(), 1, "re-notification must not enqueue twice");
    assert_eq!(est.obsolete_mask(BlockPos::new(1, 1)), mask_first);
}

#[test]
fn test_update_drains_backlog_and_reprices_links() {
    let mut terrain = flat_terrain(64, 64);
    let mut est = new_estimator(&terrain);
    let b = BlockPos::new(2, 2);
    assert_ne!(est.vertex_cost(0, b, Direction::West), COST_INFINITE);

    // A structure fills block (2,2); its links must go infinite.
    terrain.set_flags_rect(32, 32, 47, 47, FLAG_BLOCK_STRUCTURE);
    est.map_changed(WorldRect::from_f32(32.0, 32.0, 47.0, 47.0));
    assert_eq!(est.backlog(), 1);

    est.update(&terrain, 1);
    assert_eq!(est.backlog(), 0);
    assert_eq!(est.obsolete_mask(b), 0, "mask cleared after recompute");
    for dir in Direction::ALL {
        assert_eq!(est.vertex_cost(0, b, dir), COST_INFINITE, "{:?}", dir);
    }
    // The mirrored entry on the neighbor side was rewritten too.
    assert_eq!(
        est.vertex_cost(0, BlockPos::new(1, 2), Direction::East),
        COST_INFINITE
    );
}

#[test]
fn test_tick_budget_clamps_and_scales_by_classes() {
    let rate = FixedNum::ONE;
    assert_eq!(tick_budget(0, rate, 4, 64, 2), 0);
    assert_eq!(tick_budget(1, rate, 4, 64, 2), 8, "floor times classes");
    assert_eq!(tick_budget(1000, rate, 4, 64, 2), 128, "ceiling times classes");
    assert_eq!(tick_budget(10, rate, 4, 64, 1), 10);
}

// ============================================================================
// Result cache
// ============================================================================

#[test]
fn test_exact_key_scheme_is_injective() {
    let cache = PathCache::new(KeyScheme::Exact, 8, 8, 16);
    let mut seen = std::collections::HashSet::new();
    let mut total = 0usize;
    for start in 0..64 {
        for goal in 0..64 {
            for radius in 0..4 {
                for class in 0..2 {
                    let k = key(
                        BlockPos::new(start % 8, start / 8),
                        BlockPos::new(goal % 8, goal / 8),
                        radius,
                        class,
                    );
                    seen.insert(cache.packed_key(&k));
                    total += 1;
                }
            }
        }
    }
    assert_eq!(seen.len(), total, "distinct tuples must produce distinct keys");
}

#[test]
fn test_legacy_key_scheme_collision_keeps_first_entry() {
    // 512x256 blocks: indices 0 and 65536 alias in the 16-bit field.
    let mut cache = PathCache::new(KeyScheme::Legacy, 512, 256, 8);
    let first = key(BlockPos::new(0, 0), BlockPos::new(1, 0), 0, 0);
    let second = key(BlockPos::new(0, 128), BlockPos::new(1, 0), 0, 0);
    assert_eq!(cache.packed_key(&first), cache.packed_key(&second));

    assert_eq!(
        cache.add(first, SearchResult::Ok, vec![Node::new(0, 0)], 0),
        CacheAddOutcome::Inserted
    );
    assert_eq!(
        cache.add(second, SearchResult::Ok, vec![Node::new(9, 9)], 0),
        CacheAddOutcome::Collision,
        "a colliding insert must be rejected"
    );
    let hit = cache.get(&first).expect("first entry stays authoritative");
    assert_eq!(hit.path, vec![Node::new(0, 0)]);
    assert!(cache.get(&second).is_none(), "collided tuple reads as a miss");
    assert_eq!(cache.stats().collisions, 1);
}

#[test]
fn test_cache_hit_before_ttl_and_miss_after_expiry() {
    let mut cache = PathCache::new(KeyScheme::Exact, 8, 8, 16);
    let k = key(BlockPos::new(0, 0), BlockPos::new(3, 3), 2, 0);
    cache.add(k, SearchResult::Ok, vec![Node::new(1, 1)], 10);

    cache.tick(10 + CACHE_LIFETIME_FRAMES - 1);
    let hit = cache.get(&k).expect("entry must survive until its deadline");
    assert_eq!(hit.result, SearchResult::Ok);

    cache.tick(10 + CACHE_LIFETIME_FRAMES);
    assert!(cache.get(&k).is_none(), "expired entry must be evicted");
}

#[test]
fn test_failed_results_expire_at_half_lifetime() {
    let mut cache = PathCache::new(KeyScheme::Exact, 8, 8, 16);
    let k = key(BlockPos::new(0, 0), BlockPos::new(2, 2), 0, 0);
    cache.add(k, SearchResult::GoalUnreachable, Vec::new(), 0);

    cache.tick(CACHE_LIFETIME_FRAMES / 2 - 1);
    assert!(cache.get(&k).is_some());
    cache.tick(CACHE_LIFETIME_FRAMES / 2);
    assert!(cache.get(&k).is_none());
}

#[test]
fn test_cache_capacity_evicts_single_oldest() {
    let mut cache = PathCache::new(KeyScheme::Exact, 8, 8, 2);
    let k1 = key(BlockPos::new(0, 0), BlockPos::new(1, 0), 0, 0);
    let k2 = key(BlockPos::new(0, 0), BlockPos::new(2, 0), 0, 0);
    let k3 = key(BlockPos::new(0, 0), BlockPos::new(3, 0), 0, 0);
    cache.add(k1, SearchResult::Ok, Vec::new(), 1);
    cache.add(k2, SearchResult::Ok, Vec::new(), 2);
    cache.add(k3, SearchResult::Ok, Vec::new(), 3);

    assert_eq!(cache.len(), 2);
    assert!(cache.get(&k1).is_none(), "oldest entry evicted first");
    assert!(cache.get(&k2).is_some());
    assert!(cache.get(&k3).is_some());
}

#[test]
fn test_cache_scopes_are_independent() {
    let terrain = flat_terrain(32, 32);
    let est = new_estimator(&terrain);
    let start = BlockPos::new(0, 0);
    let goal = BlockPos::new(1, 1);
    est.add_cache(
        CacheScope::Synced,
        start,
        goal,
        FixedNum::ZERO,
        0,
        SearchResult::Ok,
        vec![Node::new(0, 0)],
        0,
    );
    assert!(est
        .get_cache(CacheScope::Synced, start, goal, FixedNum::ZERO, 0)
        .is_some());
    assert!(
        est.get_cache(CacheScope::Speculative, start, goal, FixedNum::ZERO, 0)
            .is_none(),
        "the speculative cache never sees synced insertions"
    );
}

// ============================================================================
// Checksum
// ============================================================================

#[test]
fn test_checksum_is_deterministic_across_builds() {
    let mut terrain = flat_terrain(32, 32);
    terrain.set_flags_rect(10, 3, 14, 9, FLAG_BLOCK_STRUCTURE);
    let a = new_estimator(&terrain);
    let b = new_estimator(&terrain);
    assert_eq!(a.calc_checksum(), b.calc_checksum());
    assert_eq!(a.calc_checksum(), a.calc_checksum());
}

#[test]
fn test_checksum_reacts_to_terrain_change() {
    let mut terrain = flat_terrain(32, 32);
    let a = new_estimator(&terrain);

    // Block the cell the first build chose as a representative; the rebuilt
    // grid must pick a different one and fingerprint differently.
    let offset = a.block_offset(0, BlockPos::new(0, 0));
    terrain.set_flags_rect(
        offset.x as u32,
        offset.z as u32,
        offset.x as u32,
        offset.z as u32,
        FLAG_BLOCK_STRUCTURE,
    );
    let b = new_estimator(&terrain);
    assert_ne!(a.calc_checksum(), b.calc_checksum());
}

#[test]
fn test_input_hash_reacts_to_any_single_cell() {
    let table = ground_table();
    let mut terrain = flat_terrain(32, 32);
    let before = super::checksum::input_hash(&terrain, &table, 16);
    terrain.set_height(17, 5, FixedNum::from_num(3));
    let after = super::checksum::input_hash(&terrain, &table, 16);
    assert_ne!(before, after, "one changed cell must invalidate the cache");
}

// ============================================================================
// Arena
// ============================================================================

#[test]
fn test_dropped_estimator_returns_buffers_to_arena() {
    let terrain = flat_terrain(32, 32);
    let arena = Arc::new(GridBufferArena::new());
    let est = PathEstimator::new(&test_config(), ground_table(), &terrain, arena.clone());
    assert_eq!(arena.free_count(), 0);
    drop(est);
    assert_eq!(arena.free_count(), 1, "buffers must come back on teardown");

    // A second estimator at the same slot reuses them.
    let est2 = PathEstimator::new(&test_config(), ground_table(), &terrain, arena.clone());
    assert_eq!(arena.free_count(), 0);
    drop(est2);
}

#[test]
fn test_backlog_is_dropped_on_teardown() {
    let terrain = flat_terrain(64, 64);
    let arena = Arc::new(GridBufferArena::new());
    let mut est = PathEstimator::new(&test_config(), ground_table(), &terrain, arena.clone());
    est.map_changed(WorldRect::from_f32(20.0, 20.0, 24.0, 24.0));
    assert_eq!(est.backlog(), 1);
    drop(est);

    // The reused buffers carry no stale obsolete flags.
    let est2 = PathEstimator::new(&test_config(), ground_table(), &terrain, arena);
    assert_eq!(est2.backlog(), 0);
    assert_eq!(est2.obsolete_mask(BlockPos::new(1, 1)), 0);
}
