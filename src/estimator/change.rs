//! Incremental invalidation of block links after terrain edits.
//!
//! A terrain edit marks the affected blocks' direction bits obsolete and
//! queues each block once; the estimator drains the queue on a per-frame
//! budget so recomputation never stalls the simulation. Work still queued at
//! teardown is dropped, not persisted: a fresh load recomputes from terrain
//! anyway.

use super::arena::GridBuffers;
use super::grid::CostGrid;
use super::types::{BlockPos, BlockRect, Direction};
use std::collections::VecDeque;

pub(super) struct ChangeTracker {
    /// Per-block obsolete direction bits. A block sits in the queue exactly
    /// while its mask is non-zero.
    masks: Vec<u8>,
    queue: VecDeque<u32>,
    /// Whether any mobility class is direction-dependent. Independent models
    /// repair a neighbor's reverse link through the mirror write, so only the
    /// changed-side bits need tracking; dependent models store the reverse
    /// direction separately and the bordering blocks' facing bits must be
    /// tracked as well.
    directional: bool,
}

impl ChangeTracker {
    pub fn new(num_blocks: usize, directional: bool, buffers: &mut GridBuffers) -> Self {
        let mut masks = std::mem::take(&mut buffers.masks);
        masks.clear();
        masks.resize(num_blocks, 0);
        Self {
            masks,
            queue: VecDeque::new(),
            directional,
        }
    }

    pub fn backlog(&self) -> usize {
        self.queue.len()
    }

    pub fn obsolete_mask(&self, grid: &CostGrid, b: BlockPos) -> u8 {
        self.masks[grid.block_index(b)]
    }

    /// Mark the blocks touched by an edit of the given cell rectangle.
    ///
    /// The enclosing block rectangle is expanded by a one-block border and
    /// every block in range is classified. Interior blocks need every
    /// direction; blocks on the rectangle's edge only the directions pointing
    /// at other changed blocks, since links originating from farther blocks
    /// are unaffected. Blocks in the border normally receive nothing (their
    /// incident links are covered by the mirror writes of the in-rect
    /// recomputes); with a direction-dependent model they get the bits facing
    /// the changed rectangle. Re-notifying the same region before the queue
    /// drains is idempotent.
    pub fn map_changed(&mut self, grid: &CostGrid, x1: u32, z1: u32, x2: u32, z2: u32) {
        let changed = BlockRect {
            x1: (x1 / grid.block_size) as i32,
            z1: (z1 / grid.block_size) as i32,
            x2: ((x2 / grid.block_size) as i32).min(grid.blocks_x as i32 - 1),
            z2: ((z2 / grid.block_size) as i32).min(grid.blocks_z as i32 - 1),
        };
        let expanded = changed.expanded(1, grid.blocks_x, grid.blocks_z);

        for z in expanded.z1..=expanded.z2 {
            for x in expanded.x1..=expanded.x2 {
                let b = BlockPos::new(x, z);
                let bits = affected_dirs(grid, &changed, b, self.directional);
                if bits == 0 {
                    continue;
                }
                let idx = grid.block_index(b);
                if self.masks[idx] == 0 {
                    self.queue.push_back(idx as u32);
                }
                self.masks[idx] |= bits;
            }
        }
    }

    /// Pop up to `max_blocks` queued blocks, clearing their masks. The tick
    /// is atomic with respect to notifications, so clearing here is
    /// equivalent to clearing after the recompute commits.
    pub fn take_batch(&mut self, grid: &CostGrid, max_blocks: usize) -> Vec<(BlockPos, u8)> {
        let count = max_blocks.min(self.queue.len());
        let mut batch = Vec::with_capacity(count);
        for _ in 0..count {
            let idx = match self.queue.pop_front() {
                Some(idx) => idx as usize,
                None => break,
            };
            let mask = self.masks[idx];
            self.masks[idx] = 0;
            if mask != 0 {
                batch.push((grid.block_at_index(idx), mask));
            }
        }
        batch
    }

    /// Drop all pending work: flags cleared, nothing recomputed or deferred.
    pub fn clear_backlog(&mut self) {
        while let Some(idx) = self.queue.pop_front() {
            self.masks[idx as usize] = 0;
        }
    }

    pub fn reclaim(&mut self, buffers: &mut GridBuffers) {
        buffers.masks = std::mem::take(&mut self.masks);
    }
}

/// Obsolete bits for one block given the changed block rectangle.
fn affected_dirs(grid: &CostGrid, changed: &BlockRect, b: BlockPos, directional: bool) -> u8 {
    let mut bits = 0;
    if changed.contains(b) {
        let single = changed.is_single_block();
        for dir in Direction::ALL {
            let n = b.step(dir);
            if !grid.in_grid(n) {
                continue;
            }
            if single || changed.contains(n) {
                bits |= dir.bit();
            }
        }
    } else if directional {
        // Border block of a direction-dependent model: its own stored links
        // into the changed area must be repriced from this side.
        for dir in Direction::ALL {
            if changed.contains(b.step(dir)) {
                bits |= dir.bit();
            }
        }
    }
    bits
}

/// Per-tick block budget: configured throughput scaled by backlog, clamped,
/// then multiplied by the class count (every class is recomputed whenever a
/// block is touched). Fixed-point so every client computes the same budget.
pub(super) fn tick_budget(
    backlog: usize,
    update_rate: crate::math::FixedNum,
    min_blocks: usize,
    max_blocks: usize,
    num_classes: usize,
) -> usize {
    if backlog == 0 {
        return 0;
    }
    let scaled = (crate::math::FixedNum::from_num(backlog as i64) * update_rate)
        .ceil()
        .to_num::<usize>();
    scaled.clamp(min_blocks, max_blocks) * num_classes.max(1)
}
