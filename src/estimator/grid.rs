use super::arena::GridBuffers;
use super::types::{BlockOffset, BlockPos, Direction, COST_INFINITE};
use crate::math::FixedNum;
use crate::search::CellRect;

/// The precomputed coarse cost grid.
///
/// Storage is flat and class-major: `offsets[class][block]` holds the block's
/// representative cell and `costs[class][block][direction]` the traversal
/// cost to each of the eight neighboring blocks, or [`COST_INFINITE`] when no
/// route exists inside the two-block footprint. Backing vectors are claimed
/// from a [`super::GridBufferArena`] and handed back on estimator teardown so
/// reloads at the same slot skip reallocation.
pub struct CostGrid {
    pub block_size: u32,
    pub blocks_x: u32,
    pub blocks_z: u32,
    map_width: u32,
    map_height: u32,
    num_classes: usize,
    pub(super) offsets: Vec<BlockOffset>,
    pub(super) costs: Vec<FixedNum>,
}

impl CostGrid {
    /// Lay out the grid for a map of `map_width` x `map_height` cells,
    /// reusing the claimed buffers.
    pub(super) fn new(
        block_size: u32,
        map_width: u32,
        map_height: u32,
        num_classes: usize,
        buffers: &mut GridBuffers,
    ) -> Self {
        let blocks_x = map_width.div_ceil(block_size);
        let blocks_z = map_height.div_ceil(block_size);
        let num_blocks = (blocks_x as usize) * (blocks_z as usize);

        let mut offsets = std::mem::take(&mut buffers.offsets);
        offsets.clear();
        offsets.resize(num_classes * num_blocks, BlockOffset::default());

        let mut costs = std::mem::take(&mut buffers.costs);
        costs.clear();
        costs.resize(num_classes * num_blocks * 8, COST_INFINITE);

        Self {
            block_size,
            blocks_x,
            blocks_z,
            map_width,
            map_height,
            num_classes,
            offsets,
            costs,
        }
    }

    pub fn num_blocks(&self) -> usize {
        (self.blocks_x as usize) * (self.blocks_z as usize)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    #[inline]
    pub fn in_grid(&self, b: BlockPos) -> bool {
        b.x >= 0 && b.z >= 0 && (b.x as u32) < self.blocks_x && (b.z as u32) < self.blocks_z
    }

    #[inline]
    pub fn block_index(&self, b: BlockPos) -> usize {
        (b.z as usize) * (self.blocks_x as usize) + (b.x as usize)
    }

    #[inline]
    pub fn block_at_index(&self, idx: usize) -> BlockPos {
        BlockPos::new(
            (idx % self.blocks_x as usize) as i32,
            (idx / self.blocks_x as usize) as i32,
        )
    }

    /// Block containing a terrain cell.
    #[inline]
    pub fn block_of_cell(&self, x: u32, z: u32) -> BlockPos {
        BlockPos::new((x / self.block_size) as i32, (z / self.block_size) as i32)
    }

    /// Neighboring block in `dir`, or `None` at the map edge.
    pub fn neighbor(&self, b: BlockPos, dir: Direction) -> Option<BlockPos> {
        let n = b.step(dir);
        if self.in_grid(n) {
            Some(n)
        } else {
            None
        }
    }

    /// Cell rectangle covered by a block, clamped to the map.
    pub fn block_cells(&self, b: BlockPos) -> CellRect {
        let x1 = b.x as u32 * self.block_size;
        let z1 = b.z as u32 * self.block_size;
        CellRect {
            x1,
            z1,
            x2: (x1 + self.block_size - 1).min(self.map_width - 1),
            z2: (z1 + self.block_size - 1).min(self.map_height - 1),
        }
    }

    /// The two-block footprint a link search is restricted to.
    pub fn link_footprint(&self, a: BlockPos, b: BlockPos) -> CellRect {
        let ra = self.block_cells(a);
        let rb = self.block_cells(b);
        CellRect {
            x1: ra.x1.min(rb.x1),
            z1: ra.z1.min(rb.z1),
            x2: ra.x2.max(rb.x2),
            z2: ra.z2.max(rb.z2),
        }
    }

    /// Center cell of a block, the fallback representative.
    pub fn block_center(&self, b: BlockPos) -> BlockOffset {
        let x = (b.x as u32 * self.block_size + self.block_size / 2).min(self.map_width - 1);
        let z = (b.z as u32 * self.block_size + self.block_size / 2).min(self.map_height - 1);
        BlockOffset::new(x as u16, z as u16)
    }

    #[inline]
    fn offset_index(&self, class: usize, block: usize) -> usize {
        class * self.num_blocks() + block
    }

    #[inline]
    fn cost_index(&self, class: usize, block: usize, dir: Direction) -> usize {
        (class * self.num_blocks() + block) * 8 + dir.as_index()
    }

    pub fn block_offset(&self, class: usize, b: BlockPos) -> BlockOffset {
        self.offsets[self.offset_index(class, self.block_index(b))]
    }

    pub(super) fn set_block_offset(&mut self, class: usize, b: BlockPos, offset: BlockOffset) {
        let idx = self.offset_index(class, self.block_index(b));
        self.offsets[idx] = offset;
    }

    pub fn vertex_cost(&self, class: usize, b: BlockPos, dir: Direction) -> FixedNum {
        self.costs[self.cost_index(class, self.block_index(b), dir)]
    }

    pub(super) fn set_vertex_cost(
        &mut self,
        class: usize,
        b: BlockPos,
        dir: Direction,
        cost: FixedNum,
    ) {
        let idx = self.cost_index(class, self.block_index(b), dir);
        self.costs[idx] = cost;
    }

    /// Concatenated little-endian byte image of the offset and cost arrays,
    /// the checksum input.
    pub fn byte_image(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.offsets.len() * 4 + self.costs.len() * 8);
        for offset in &self.offsets {
            out.extend_from_slice(&offset.x.to_le_bytes());
            out.extend_from_slice(&offset.z.to_le_bytes());
        }
        for cost in &self.costs {
            out.extend_from_slice(&cost.to_bits().to_le_bytes());
        }
        out
    }

    /// Hand the backing storage back for reuse.
    pub(super) fn reclaim(&mut self, buffers: &mut GridBuffers) {
        buffers.offsets = std::mem::take(&mut self.offsets);
        buffers.costs = std::mem::take(&mut self.costs);
    }
}
