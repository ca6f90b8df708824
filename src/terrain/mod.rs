//! Terrain oracle: per-cell blocking, speed modifiers and heightmap content.
//!
//! The estimator never interprets terrain directly; everything it needs is
//! answered here, and the raw content bytes feed the cache-validation hash so
//! that any terrain divergence invalidates derived state.

use crate::math::{FixedNum, FixedVec2};
use serde::{Deserialize, Serialize};

/// Cell flag: occupied by a structure, impassable for every mobility class.
pub const FLAG_BLOCK_STRUCTURE: u8 = 1 << 0;
/// Cell flag: exit-only zone (e.g. a factory ramp). Traversable, but never a
/// valid block representative.
pub const FLAG_EXIT_ONLY: u8 = 1 << 1;

/// One movement capability group: units sharing terrain speed modifiers and
/// slope limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MobilityClass {
    pub id: u8,
    pub name: String,
    /// Speed modifier per terrain type id. Zero means the type is impassable
    /// for this class.
    pub speed_mods: Vec<FixedNum>,
    /// Cells with a larger height delta to a cardinal neighbor are blocked.
    pub max_slope: FixedNum,
    /// Extra cost per unit of upward height gain. Only applied when
    /// `direction_independent` is false.
    pub climb_penalty: FixedNum,
    /// When set, traversal cost between two cells is the same in both
    /// directions and half the block links can be mirrored from the
    /// neighbor's entry.
    pub direction_independent: bool,
}

impl MobilityClass {
    /// Uniform ground class: speed 1 on every listed terrain type.
    pub fn ground(id: u8, name: &str, num_terrain_types: usize) -> Self {
        Self {
            id,
            name: name.to_string(),
            speed_mods: vec![FixedNum::ONE; num_terrain_types],
            max_slope: FixedNum::MAX,
            climb_penalty: FixedNum::ZERO,
            direction_independent: true,
        }
    }

    /// Smallest inverse speed over all passable terrain types. Used as the
    /// admissible heuristic scale for the constrained search.
    pub fn min_inv_speed(&self) -> FixedNum {
        let mut best = FixedNum::ONE;
        let mut found = false;
        for &speed in &self.speed_mods {
            if speed > FixedNum::ZERO {
                let inv = FixedNum::ONE / speed;
                if !found || inv < best {
                    best = inv;
                    found = true;
                }
            }
        }
        best
    }
}

/// Ordered mobility-class table. Iteration order is ascending id and stable
/// across clients; the table content participates in the cache-validation
/// hash.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MobilityTable {
    classes: Vec<MobilityClass>,
}

impl MobilityTable {
    pub fn new(mut classes: Vec<MobilityClass>) -> Self {
        classes.sort_by_key(|c| c.id);
        Self { classes }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MobilityClass> {
        self.classes.iter()
    }

    pub fn get(&self, index: usize) -> &MobilityClass {
        &self.classes[index]
    }

    /// Deterministic byte serialization for hashing.
    pub fn content_bytes(&self, out: &mut Vec<u8>) {
        for class in &self.classes {
            out.push(class.id);
            out.push(class.direction_independent as u8);
            out.extend_from_slice(&class.max_slope.to_bits().to_le_bytes());
            out.extend_from_slice(&class.climb_penalty.to_bits().to_le_bytes());
            out.extend_from_slice(&(class.speed_mods.len() as u32).to_le_bytes());
            for &speed in &class.speed_mods {
                out.extend_from_slice(&speed.to_bits().to_le_bytes());
            }
        }
    }
}

/// The map terrain: heightmaps, terrain types and per-cell flags.
///
/// Cell (0, 0) sits at world (0, 0); a cell spans `cell_size` world units.
/// The original heightmap is kept unmodified so consumers can distinguish
/// runtime deformation from authored terrain.
#[derive(Clone)]
pub struct TerrainMap {
    pub width: u32,
    pub height: u32,
    pub cell_size: FixedNum,
    heightmap: Vec<FixedNum>,
    original_heightmap: Vec<FixedNum>,
    type_map: Vec<u8>,
    flags: Vec<u8>,
}

impl TerrainMap {
    pub fn new(width: u32, height: u32, cell_size: FixedNum) -> Self {
        let size = (width as usize) * (height as usize);
        Self {
            width,
            height,
            cell_size,
            heightmap: vec![FixedNum::ZERO; size],
            original_heightmap: vec![FixedNum::ZERO; size],
            type_map: vec![0; size],
            flags: vec![0; size],
        }
    }

    #[inline]
    pub fn get_index(&self, x: u32, z: u32) -> usize {
        (z as usize) * (self.width as usize) + (x as usize)
    }

    #[inline]
    pub fn in_bounds(&self, x: u32, z: u32) -> bool {
        x < self.width && z < self.height
    }

    pub fn world_to_cell(&self, pos: FixedVec2) -> Option<(u32, u32)> {
        if pos.x < FixedNum::ZERO || pos.z < FixedNum::ZERO {
            return None;
        }
        let x = (pos.x / self.cell_size).to_num::<u32>();
        let z = (pos.z / self.cell_size).to_num::<u32>();
        if self.in_bounds(x, z) {
            Some((x, z))
        } else {
            None
        }
    }

    pub fn height_at(&self, x: u32, z: u32) -> FixedNum {
        self.heightmap[self.get_index(x, z)]
    }

    pub fn terrain_type(&self, x: u32, z: u32) -> u8 {
        self.type_map[self.get_index(x, z)]
    }

    pub fn cell_flags(&self, x: u32, z: u32) -> u8 {
        self.flags[self.get_index(x, z)]
    }

    pub fn is_exit_only(&self, x: u32, z: u32) -> bool {
        self.cell_flags(x, z) & FLAG_EXIT_ONLY != 0
    }

    /// Largest cardinal height delta at a cell, in height units.
    pub fn slope_at(&self, x: u32, z: u32) -> FixedNum {
        let h = self.height_at(x, z);
        let mut slope = FixedNum::ZERO;
        if x + 1 < self.width {
            let d = (self.height_at(x + 1, z) - h).abs();
            if d > slope {
                slope = d;
            }
        }
        if z + 1 < self.height {
            let d = (self.height_at(x, z + 1) - h).abs();
            if d > slope {
                slope = d;
            }
        }
        slope
    }

    /// Inverse speed modifier for `class` at a cell, or `None` when the cell
    /// is impassable for it (structure, impassable terrain type, or slope
    /// above the class limit).
    pub fn inv_speed(&self, class: &MobilityClass, x: u32, z: u32) -> Option<FixedNum> {
        let idx = self.get_index(x, z);
        if self.flags[idx] & FLAG_BLOCK_STRUCTURE != 0 {
            return None;
        }
        let speed = class
            .speed_mods
            .get(self.type_map[idx] as usize)
            .copied()
            .unwrap_or(FixedNum::ZERO);
        if speed <= FixedNum::ZERO {
            return None;
        }
        if self.slope_at(x, z) > class.max_slope {
            return None;
        }
        Some(FixedNum::ONE / speed)
    }

    pub fn is_blocked(&self, class: &MobilityClass, x: u32, z: u32) -> bool {
        self.inv_speed(class, x, z).is_none()
    }

    // ------------------------------------------------------------------
    // Runtime deformation
    // ------------------------------------------------------------------

    pub fn set_height(&mut self, x: u32, z: u32, h: FixedNum) {
        let idx = self.get_index(x, z);
        self.heightmap[idx] = h;
    }

    pub fn set_type_rect(&mut self, x1: u32, z1: u32, x2: u32, z2: u32, terrain_type: u8) {
        for z in z1..=z2.min(self.height - 1) {
            for x in x1..=x2.min(self.width - 1) {
                let idx = self.get_index(x, z);
                self.type_map[idx] = terrain_type;
            }
        }
    }

    pub fn set_flags_rect(&mut self, x1: u32, z1: u32, x2: u32, z2: u32, flags: u8) {
        for z in z1..=z2.min(self.height - 1) {
            for x in x1..=x2.min(self.width - 1) {
                let idx = self.get_index(x, z);
                self.flags[idx] = flags;
            }
        }
    }

    /// Deterministic byte serialization of the full terrain content
    /// (original and current heightmaps, type map, flags) for hashing.
    pub fn content_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.cell_size.to_bits().to_le_bytes());
        for &h in &self.original_heightmap {
            out.extend_from_slice(&h.to_bits().to_le_bytes());
        }
        for &h in &self.heightmap {
            out.extend_from_slice(&h.to_bits().to_le_bytes());
        }
        out.extend_from_slice(&self.type_map);
        out.extend_from_slice(&self.flags);
    }
}
