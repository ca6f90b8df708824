//! The two-phase vertex-cost builder.
//!
//! Phase one picks each block's representative point; phase two prices the
//! links between neighboring representatives with the constrained search.
//! The phases may not interleave: a cost task reads the offsets of its block
//! and its neighbor, either of which another worker may still be writing
//! during phase one. The indexed parallel `collect()` followed by a
//! sequential commit is that barrier, and it also keeps the write order (and
//! with it the byte image and checksum) identical on every client.

use super::grid::CostGrid;
use super::types::{BlockOffset, BlockPos, Direction, COST_INFINITE};
use crate::math::FixedNum;
use crate::search::GridSearch;
use crate::terrain::{MobilityClass, MobilityTable, TerrainMap};
use rayon::prelude::*;
use smallvec::SmallVec;

/// One candidate representative inside a block: relative cell and baseline
/// geometric cost (squared distance from the block center).
#[derive(Clone, Copy, Debug)]
pub(super) struct RankedCell {
    pub dx: u16,
    pub dz: u16,
    pub base_cost: FixedNum,
}

/// Candidate cells of a block, sorted ascending by baseline cost.
///
/// Block-size dependent and computed once per estimator. The ascending order
/// is what lets the offset scan stop early: once a candidate's baseline alone
/// exceeds the best total found so far, no later candidate can win.
pub(super) struct OffsetRanking {
    pub candidates: Vec<RankedCell>,
}

impl OffsetRanking {
    pub fn new(block_size: u32) -> Self {
        let center = (block_size / 2) as i64;
        let mut candidates = Vec::with_capacity((block_size * block_size) as usize);
        for dz in 0..block_size {
            for dx in 0..block_size {
                let ex = dx as i64 - center;
                let ez = dz as i64 - center;
                candidates.push(RankedCell {
                    dx: dx as u16,
                    dz: dz as u16,
                    base_cost: FixedNum::from_num(ex * ex + ez * ez),
                });
            }
        }
        candidates.sort_by(|a, b| {
            a.base_cost
                .cmp(&b.base_cost)
                .then_with(|| a.dz.cmp(&b.dz))
                .then_with(|| a.dx.cmp(&b.dx))
        });
        Self { candidates }
    }
}

/// Pick the representative cell for one (block, class).
///
/// Scans the ranking for the cheapest feasible candidate, where total cost is
/// baseline plus the cell's inverse speed modifier; structure-blocked and
/// exit-only cells are rejected. A block with no feasible candidate still
/// gets a position (the block center) so grid lookups stay dense; its links
/// then price to the infinite sentinel instead of crashing.
pub(super) fn find_block_offset(
    terrain: &TerrainMap,
    class: &MobilityClass,
    ranking: &OffsetRanking,
    grid: &CostGrid,
    b: BlockPos,
) -> BlockOffset {
    let base_x = b.x as u32 * grid.block_size;
    let base_z = b.z as u32 * grid.block_size;
    let mut best: Option<(FixedNum, BlockOffset)> = None;

    for cand in &ranking.candidates {
        if let Some((best_total, _)) = best {
            if cand.base_cost > best_total {
                break;
            }
        }
        let x = base_x + cand.dx as u32;
        let z = base_z + cand.dz as u32;
        if !terrain.in_bounds(x, z) {
            continue;
        }
        if terrain.is_exit_only(x, z) {
            continue;
        }
        let inv = match terrain.inv_speed(class, x, z) {
            Some(inv) => inv,
            None => continue,
        };
        let total = cand.base_cost + inv;
        let better = match best {
            Some((best_total, _)) => total < best_total,
            None => true,
        };
        if better {
            best = Some((total, BlockOffset::new(x as u16, z as u16)));
        }
    }

    match best {
        Some((_, offset)) => offset,
        None => grid.block_center(b),
    }
}

/// Price one block's links for one class, returning (direction, cost) pairs.
///
/// Off-map neighbors are skipped (their slots stay infinite); a blocked
/// endpoint or a failed sub-search yields the infinite sentinel.
fn price_block_links(
    terrain: &TerrainMap,
    grid: &CostGrid,
    class: &MobilityClass,
    class_idx: usize,
    b: BlockPos,
    dirs: &[Direction],
) -> SmallVec<[(Direction, FixedNum); 8]> {
    let search = GridSearch::new(terrain);
    let mut out = SmallVec::new();
    for &dir in dirs {
        let neighbor = match grid.neighbor(b, dir) {
            Some(n) => n,
            None => continue,
        };
        let start = grid.block_offset(class_idx, b).to_node();
        let goal = grid.block_offset(class_idx, neighbor).to_node();

        let blocked = terrain.inv_speed(class, start.x, start.z).is_none()
            || terrain.inv_speed(class, goal.x, goal.z).is_none();
        let cost = if blocked {
            COST_INFINITE
        } else {
            let bounds = grid.link_footprint(b, neighbor);
            match search.constrained_search(class, start, goal, FixedNum::ZERO, bounds) {
                Some(hit) => hit.cost,
                None => COST_INFINITE,
            }
        };
        out.push((dir, cost));
    }
    out
}

/// Directions a class computes itself during a full build: the half-set for
/// direction-independent classes (the reverse half is mirrored from the
/// neighbor), all eight otherwise.
fn full_build_dirs(class: &MobilityClass) -> &'static [Direction] {
    if class.direction_independent {
        &Direction::COMPUTED
    } else {
        &Direction::ALL
    }
}

type BlockCosts = SmallVec<[(Direction, FixedNum); 8]>;

fn commit_costs(
    grid: &mut CostGrid,
    table: &MobilityTable,
    b: BlockPos,
    per_class: &[BlockCosts],
) {
    for (class_idx, costs) in per_class.iter().enumerate() {
        let mirror = table.get(class_idx).direction_independent;
        for &(dir, cost) in costs {
            grid.set_vertex_cost(class_idx, b, dir, cost);
            if mirror {
                if let Some(neighbor) = grid.neighbor(b, dir) {
                    grid.set_vertex_cost(class_idx, neighbor, dir.opposite(), cost);
                }
            }
        }
    }
}

/// Offset phase over every block, then the barrier, then the cost phase over
/// every block. Used for the cold-start full computation.
pub(super) fn build_full(
    grid: &mut CostGrid,
    terrain: &TerrainMap,
    table: &MobilityTable,
    ranking: &OffsetRanking,
) {
    let num_blocks = grid.num_blocks();

    // Offset phase: one independent task per block, all classes.
    let offsets: Vec<SmallVec<[BlockOffset; 4]>> = {
        let grid_ref: &CostGrid = grid;
        (0..num_blocks)
            .into_par_iter()
            .map(|idx| {
                let b = grid_ref.block_at_index(idx);
                table
                    .iter()
                    .map(|class| find_block_offset(terrain, class, ranking, grid_ref, b))
                    .collect()
            })
            .collect()
    };
    for (idx, per_class) in offsets.into_iter().enumerate() {
        let b = grid.block_at_index(idx);
        for (class_idx, offset) in per_class.into_iter().enumerate() {
            grid.set_block_offset(class_idx, b, offset);
        }
    }

    // Cost phase: every offset above is committed before the first search.
    let costs: Vec<SmallVec<[BlockCosts; 4]>> = {
        let grid_ref: &CostGrid = grid;
        (0..num_blocks)
            .into_par_iter()
            .map(|idx| {
                let b = grid_ref.block_at_index(idx);
                table
                    .iter()
                    .enumerate()
                    .map(|(class_idx, class)| {
                        price_block_links(
                            terrain,
                            grid_ref,
                            class,
                            class_idx,
                            b,
                            full_build_dirs(class),
                        )
                    })
                    .collect()
            })
            .collect()
    };
    for (idx, per_class) in costs.into_iter().enumerate() {
        let b = grid.block_at_index(idx);
        commit_costs(grid, table, b, &per_class);
    }
}

/// Re-run both phases for exactly the given blocks, honoring each block's
/// obsolete direction mask. Same offset-before-cost ordering as the full
/// build, restricted to the batch.
pub(super) fn rebuild_blocks(
    grid: &mut CostGrid,
    terrain: &TerrainMap,
    table: &MobilityTable,
    ranking: &OffsetRanking,
    batch: &[(BlockPos, u8)],
) {
    let offsets: Vec<SmallVec<[BlockOffset; 4]>> = {
        let grid_ref: &CostGrid = grid;
        batch
            .par_iter()
            .map(|&(b, _)| {
                table
                    .iter()
                    .map(|class| find_block_offset(terrain, class, ranking, grid_ref, b))
                    .collect()
            })
            .collect()
    };
    for (&(b, _), per_class) in batch.iter().zip(offsets) {
        for (class_idx, offset) in per_class.into_iter().enumerate() {
            grid.set_block_offset(class_idx, b, offset);
        }
    }

    let costs: Vec<SmallVec<[BlockCosts; 4]>> = {
        let grid_ref: &CostGrid = grid;
        batch
            .par_iter()
            .map(|&(b, mask)| {
                let dirs: SmallVec<[Direction; 8]> = Direction::ALL
                    .iter()
                    .copied()
                    .filter(|d| mask & d.bit() != 0)
                    .collect();
                table
                    .iter()
                    .enumerate()
                    .map(|(class_idx, class)| {
                        price_block_links(terrain, grid_ref, class, class_idx, b, &dirs)
                    })
                    .collect()
            })
            .collect()
    };
    for (&(b, _), per_class) in batch.iter().zip(&costs) {
        commit_costs(grid, table, b, per_class);
    }
}
