//! Constrained point-to-point search over terrain cells.
//!
//! This is the fine-grained search service the estimator prices block links
//! with: an octile A* restricted to a caller-supplied rectangle (for link
//! pricing, the two-block footprint). Step costs are the averaged inverse
//! speed modifiers of the two cells, which makes them symmetric for
//! direction-independent mobility classes; direction-dependent classes add a
//! climb penalty on upward steps.
//!
//! Everything here is deterministic: fixed-point costs, a total order on the
//! open set (cost, then z, then x) and a bounded iteration count.

use crate::math::{FixedNum, HALF, SQRT_TWO};
use crate::terrain::{MobilityClass, TerrainMap};
use fixedbitset::FixedBitSet;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::error;

/// Safety limit to prevent runaway searches.
const MAX_ITERATIONS: usize = 10_000;

/// A terrain cell coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Node {
    pub x: u32,
    pub z: u32,
}

impl Node {
    pub fn new(x: u32, z: u32) -> Self {
        Self { x, z }
    }
}

/// Inclusive cell rectangle constraining a search.
#[derive(Clone, Copy, Debug)]
pub struct CellRect {
    pub x1: u32,
    pub z1: u32,
    pub x2: u32,
    pub z2: u32,
}

impl CellRect {
    pub fn contains(&self, x: u32, z: u32) -> bool {
        x >= self.x1 && x <= self.x2 && z >= self.z1 && z <= self.z2
    }

    fn width(&self) -> u32 {
        self.x2 - self.x1 + 1
    }

    fn height(&self) -> u32 {
        self.z2 - self.z1 + 1
    }

    fn index(&self, x: u32, z: u32) -> usize {
        ((z - self.z1) as usize) * (self.width() as usize) + ((x - self.x1) as usize)
    }
}

/// Outcome code of a search request, cached alongside the path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SearchResult {
    Ok = 0,
    GoalUnreachable = 1,
    Error = 2,
}

impl SearchResult {
    pub fn is_success(self) -> bool {
        matches!(self, SearchResult::Ok)
    }
}

/// A successful search: total traversal cost and the cell path, start first.
#[derive(Clone, Debug)]
pub struct SearchHit {
    pub cost: FixedNum,
    pub path: Vec<Node>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct OpenState {
    cost: FixedNum,
    node: Node,
}

// Reversed so BinaryHeap pops the cheapest state; ties broken on (z, x) to
// keep the pop order identical on every client.
impl Ord for OpenState {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.node.z.cmp(&self.node.z))
            .then_with(|| other.node.x.cmp(&self.node.x))
    }
}

impl PartialOrd for OpenState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Search service over one terrain map.
pub struct GridSearch<'a> {
    terrain: &'a TerrainMap,
}

impl<'a> GridSearch<'a> {
    pub fn new(terrain: &'a TerrainMap) -> Self {
        Self { terrain }
    }

    /// A* from `start` to within `goal_radius` cells of `goal`, restricted to
    /// `bounds`. Returns `None` when no route exists inside the rectangle.
    pub fn constrained_search(
        &self,
        class: &MobilityClass,
        start: Node,
        goal: Node,
        goal_radius: FixedNum,
        bounds: CellRect,
    ) -> Option<SearchHit> {
        if !bounds.contains(start.x, start.z) || !bounds.contains(goal.x, goal.z) {
            return None;
        }
        if self.terrain.inv_speed(class, start.x, start.z).is_none() {
            return None;
        }

        let area = (bounds.width() as usize) * (bounds.height() as usize);
        let radius_sq = goal_radius * goal_radius;
        let h_scale = class.min_inv_speed();

        let mut open = BinaryHeap::new();
        let mut closed = FixedBitSet::with_capacity(area);
        let mut g_score = vec![FixedNum::MAX; area];
        let mut came_from = vec![u32::MAX; area];

        g_score[bounds.index(start.x, start.z)] = FixedNum::ZERO;
        open.push(OpenState {
            cost: octile(start, goal) * h_scale,
            node: start,
        });

        let mut iterations = 0;
        while let Some(OpenState { cost: _, node: current }) = open.pop() {
            iterations += 1;
            if iterations > MAX_ITERATIONS {
                error!(
                    "[SEARCH] exceeded {} iterations, start {:?} goal {:?}",
                    MAX_ITERATIONS, start, goal
                );
                return None;
            }

            let current_idx = bounds.index(current.x, current.z);
            if closed.contains(current_idx) {
                continue;
            }
            closed.insert(current_idx);

            if reached_goal(current, goal, radius_sq) {
                return Some(SearchHit {
                    cost: g_score[current_idx],
                    path: reconstruct(&came_from, &bounds, current),
                });
            }

            let current_inv = match self.terrain.inv_speed(class, current.x, current.z) {
                Some(inv) => inv,
                None => continue,
            };
            let current_h = self.terrain.height_at(current.x, current.z);

            for (dx, dz) in NEIGHBOR_STEPS {
                let nx = current.x.wrapping_add_signed(dx);
                let nz = current.z.wrapping_add_signed(dz);
                if !bounds.contains(nx, nz) || !self.terrain.in_bounds(nx, nz) {
                    continue;
                }
                let neighbor_inv = match self.terrain.inv_speed(class, nx, nz) {
                    Some(inv) => inv,
                    None => continue,
                };
                // Diagonal steps may not cut a blocked corner.
                if dx != 0 && dz != 0 {
                    let side_a = self.terrain.is_blocked(class, nx, current.z);
                    let side_b = self.terrain.is_blocked(class, current.x, nz);
                    if side_a || side_b {
                        continue;
                    }
                }

                let factor = if dx != 0 && dz != 0 {
                    SQRT_TWO
                } else {
                    FixedNum::ONE
                };
                let mut step = factor * (current_inv + neighbor_inv) * HALF;
                if !class.direction_independent {
                    let rise = self.terrain.height_at(nx, nz) - current_h;
                    if rise > FixedNum::ZERO {
                        step += class.climb_penalty * rise;
                    }
                }

                let neighbor_idx = bounds.index(nx, nz);
                let tentative = g_score[current_idx] + step;
                if tentative < g_score[neighbor_idx] {
                    g_score[neighbor_idx] = tentative;
                    came_from[neighbor_idx] = current_idx as u32;
                    let neighbor = Node::new(nx, nz);
                    open.push(OpenState {
                        cost: tentative + octile(neighbor, goal) * h_scale,
                        node: neighbor,
                    });
                }
            }
        }
        None
    }
}

const NEIGHBOR_STEPS: [(i32, i32); 8] = [
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
    (-1, -1),
    (1, -1),
    (-1, 1),
    (1, 1),
];

fn reached_goal(current: Node, goal: Node, radius_sq: FixedNum) -> bool {
    if current == goal {
        return true;
    }
    let dx = current.x as i64 - goal.x as i64;
    let dz = current.z as i64 - goal.z as i64;
    FixedNum::from_num(dx * dx + dz * dz) <= radius_sq
}

/// Octile distance in cells: admissible for 8-way movement.
fn octile(a: Node, b: Node) -> FixedNum {
    let dx = FixedNum::from_num((a.x as i64 - b.x as i64).abs());
    let dz = FixedNum::from_num((a.z as i64 - b.z as i64).abs());
    let (min, max) = if dx < dz { (dx, dz) } else { (dz, dx) };
    max + (SQRT_TWO - FixedNum::ONE) * min
}

fn reconstruct(came_from: &[u32], bounds: &CellRect, end: Node) -> Vec<Node> {
    let width = (bounds.x2 - bounds.x1 + 1) as usize;
    let mut path = Vec::new();
    let mut idx = bounds.index(end.x, end.z);
    loop {
        let x = bounds.x1 + (idx % width) as u32;
        let z = bounds.z1 + (idx / width) as u32;
        path.push(Node::new(x, z));
        let prev = came_from[idx];
        if prev == u32::MAX {
            break;
        }
        idx = prev as usize;
    }
    path.reverse();
    path
}
