//! Two independent estimators over identical inputs must derive bit-identical
//! state, and an incrementally updated grid must converge to what a fresh
//! build over the edited terrain produces.

use blockpath::estimator::{BlockPos, Direction, GridBufferArena, PathEstimator};
use blockpath::math::{FixedNum, WorldRect};
use blockpath::terrain::{MobilityClass, MobilityTable, TerrainMap, FLAG_BLOCK_STRUCTURE};
use blockpath::EstimatorConfig;
use std::sync::Arc;

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn mixed_table() -> MobilityTable {
    let mut tracked = MobilityClass::ground(0, "tracked", 2);
    tracked.speed_mods[1] = FixedNum::from_num(0.5);
    let hover = MobilityClass {
        id: 1,
        name: "hover".to_string(),
        speed_mods: vec![FixedNum::ONE, FixedNum::ONE],
        max_slope: FixedNum::from_num(2),
        climb_penalty: FixedNum::from_num(3),
        direction_independent: false,
    };
    MobilityTable::new(vec![tracked, hover])
}

fn generated_terrain(seed: u64) -> TerrainMap {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut terrain = TerrainMap::new(96, 96, FixedNum::ONE);
    for _ in 0..20 {
        let x = rng.u32(0..88);
        let z = rng.u32(0..88);
        terrain.set_flags_rect(x, z, x + rng.u32(1..6), z + rng.u32(1..6), FLAG_BLOCK_STRUCTURE);
    }
    for _ in 0..12 {
        let x = rng.u32(0..88);
        let z = rng.u32(0..88);
        terrain.set_type_rect(x, z, x + rng.u32(1..8), z + rng.u32(1..8), 1);
    }
    for _ in 0..150 {
        let x = rng.u32(0..96);
        let z = rng.u32(0..96);
        terrain.set_height(x, z, FixedNum::from_num(rng.u32(0..4)));
    }
    terrain
}

fn config() -> EstimatorConfig {
    EstimatorConfig {
        block_size: 16,
        map_name: "determinism".to_string(),
        ..Default::default()
    }
}

fn new_estimator(terrain: &TerrainMap) -> PathEstimator {
    PathEstimator::new(
        &config(),
        mixed_table(),
        terrain,
        Arc::new(GridBufferArena::new()),
    )
}

#[test]
fn test_full_build_is_deterministic() {
    init_logging();
    let terrain = generated_terrain(42);
    let a = new_estimator(&terrain);
    let b = new_estimator(&terrain);

    assert_eq!(
        a.calc_checksum(),
        b.calc_checksum(),
        "independent builds over identical inputs must fingerprint identically"
    );

    let grid = a.grid();
    for bz in 0..grid.blocks_z as i32 {
        for bx in 0..grid.blocks_x as i32 {
            let block = BlockPos::new(bx, bz);
            for class in 0..2 {
                assert_eq!(
                    a.block_offset(class, block),
                    b.block_offset(class, block),
                    "offset mismatch at {:?} class {}",
                    block,
                    class
                );
                for dir in Direction::ALL {
                    assert_eq!(
                        a.vertex_cost(class, block, dir),
                        b.vertex_cost(class, block, dir),
                        "cost mismatch at {:?} {:?} class {}",
                        block,
                        dir,
                        class
                    );
                }
            }
        }
    }
}

#[test]
fn test_incremental_update_converges_to_fresh_build() {
    init_logging();
    let mut terrain = generated_terrain(7);
    let mut est = new_estimator(&terrain);

    // Build a structure fully inside block (2,2), then drain the backlog.
    terrain.set_flags_rect(36, 36, 42, 42, FLAG_BLOCK_STRUCTURE);
    est.map_changed(WorldRect::from_f32(36.0, 36.0, 42.0, 42.0));
    assert!(est.backlog() > 0);

    let mut frame = 0;
    while est.backlog() > 0 {
        frame += 1;
        est.update(&terrain, frame);
        assert!(frame < 1000, "backlog must drain under the per-tick budget");
    }

    let fresh = new_estimator(&terrain);
    assert_eq!(
        est.calc_checksum(),
        fresh.calc_checksum(),
        "incrementally updated grid must match a fresh build of the edited terrain"
    );
}

#[test]
fn test_queued_work_does_not_survive_reload() {
    let terrain = generated_terrain(3);
    let arena = Arc::new(GridBufferArena::new());
    let before;
    {
        let mut est = PathEstimator::new(&config(), mixed_table(), &terrain, arena.clone());
        before = est.calc_checksum();
        est.map_changed(WorldRect::from_f32(20.0, 20.0, 30.0, 30.0));
        assert!(est.backlog() > 0);
        // Dropped with work still queued: the flags are cleared, nothing is
        // recomputed or carried over.
    }
    let est = PathEstimator::new(&config(), mixed_table(), &terrain, arena);
    assert_eq!(est.backlog(), 0);
    assert_eq!(est.calc_checksum(), before, "terrain never changed, grid identical");
}
