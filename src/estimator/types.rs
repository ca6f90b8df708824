use crate::math::FixedNum;
use serde::{Deserialize, Serialize};

/// Cache file format version. Bumping it invalidates every persisted grid.
pub const FORMAT_VERSION: u32 = 1;

/// Sentinel cost for an unreachable or off-map block link. Consumers must
/// treat it as "no route", never as an error.
pub const COST_INFINITE: FixedNum = FixedNum::MAX;

/// Block-to-neighbor directions in rotational order.
///
/// The repr(u8) value doubles as the bit index in a block's obsolete mask.
/// The first four variants form the computed half-set: the reverse half of a
/// block's links lives in the neighbor's mirrored slot.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    West = 0,
    NorthWest = 1,
    North = 2,
    NorthEast = 3,
    East = 4,
    SouthEast = 5,
    South = 6,
    SouthWest = 7,
}

impl Direction {
    /// All eight directions, in mask-bit order.
    pub const ALL: [Direction; 8] = [
        Direction::West,
        Direction::NorthWest,
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
    ];

    /// The half-set computed per block during a full build.
    pub const COMPUTED: [Direction; 4] = [
        Direction::West,
        Direction::NorthWest,
        Direction::North,
        Direction::NorthEast,
    ];

    #[inline]
    pub fn as_index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn bit(self) -> u8 {
        1 << (self as u8)
    }

    #[inline]
    pub fn opposite(self) -> Direction {
        Direction::ALL[(self as usize + 4) % 8]
    }

    /// Block-coordinate offset of the neighbor in this direction.
    #[inline]
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::West => (-1, 0),
            Direction::NorthWest => (-1, -1),
            Direction::North => (0, -1),
            Direction::NorthEast => (1, -1),
            Direction::East => (1, 0),
            Direction::SouthEast => (1, 1),
            Direction::South => (0, 1),
            Direction::SouthWest => (-1, 1),
        }
    }
}

/// A block address in the coarse grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn step(self, dir: Direction) -> BlockPos {
        let (dx, dz) = dir.offset();
        BlockPos::new(self.x + dx, self.z + dz)
    }
}

/// Inclusive rectangle in block coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRect {
    pub x1: i32,
    pub z1: i32,
    pub x2: i32,
    pub z2: i32,
}

impl BlockRect {
    pub fn contains(&self, b: BlockPos) -> bool {
        b.x >= self.x1 && b.x <= self.x2 && b.z >= self.z1 && b.z <= self.z2
    }

    pub fn is_single_block(&self) -> bool {
        self.x1 == self.x2 && self.z1 == self.z2
    }

    /// Grow by `border` blocks on every side, clamped to the grid.
    pub fn expanded(&self, border: i32, blocks_x: u32, blocks_z: u32) -> BlockRect {
        BlockRect {
            x1: (self.x1 - border).max(0),
            z1: (self.z1 - border).max(0),
            x2: (self.x2 + border).min(blocks_x as i32 - 1),
            z2: (self.z2 + border).min(blocks_z as i32 - 1),
        }
    }
}

/// A block's representative traversable point, as absolute 16-bit cell
/// coordinates. One exists per (block, mobility class).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockOffset {
    pub x: u16,
    pub z: u16,
}

impl BlockOffset {
    pub fn new(x: u16, z: u16) -> Self {
        Self { x, z }
    }

    pub fn to_node(self) -> crate::search::Node {
        crate::search::Node::new(self.x as u32, self.z as u32)
    }
}
