//! Per-instance cache of fine-grained search results.
//!
//! Keyed by (start block, goal block, goal radius, mobility class) packed
//! into one wide integer. The packing scheme is explicit: the default scheme
//! assigns each field a disjoint multiplier derived from the total block
//! count, so distinct tuples with integral radii in valid ranges can never
//! share a key; the legacy scheme shifts fields by 16 bits and is known to
//! collide once block indices exceed 65535. It exists for reference and for
//! exercising the collision handling. Either way the full tuple is stored
//! and revalidated on every lookup, and on a detected collision the first
//! inserted entry always wins.

use super::types::BlockPos;
use crate::math::FixedNum;
use crate::search::{Node, SearchResult};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use tracing::warn;

/// Lifetime of a cached successful search, in simulation frames. Failed
/// searches are kept half as long.
pub const CACHE_LIFETIME_FRAMES: u32 = 210;

/// Radius values are quantized to whole cells and must stay below this for
/// the exact scheme's injectivity guarantee.
const MAX_RADIUS_UNITS: u64 = 1 << 16;

/// Full lookup tuple. Kept alongside every entry for revalidation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheKey {
    pub start: BlockPos,
    pub goal: BlockPos,
    pub goal_radius: FixedNum,
    pub class: u8,
}

/// Key packing scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyScheme {
    /// Disjoint multipliers from the total block count; injective for
    /// integral radii below [`MAX_RADIUS_UNITS`].
    Exact,
    /// 16-bit shifted fields. Collides when a block index exceeds 65535.
    Legacy,
}

/// Outcome of a cache insertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheAddOutcome {
    Inserted,
    /// The key was already occupied by a different tuple; the existing entry
    /// was kept.
    Collision,
    /// The exact tuple is already cached.
    AlreadyCached,
}

/// A cached search result.
#[derive(Clone, Debug)]
pub struct CachedPath {
    pub result: SearchResult,
    pub path: Vec<Node>,
    pub(super) expiry: u32,
}

#[derive(Clone, Debug)]
struct CacheSlot {
    key: CacheKey,
    item: CachedPath,
}

/// Counters exposed for diagnostics.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub collisions: u64,
}

/// Bounded TTL cache from search tuples to search results.
///
/// Entries expire a constant number of frames after insertion, with separate
/// expiry FIFOs per outcome class so each queue stays in non-decreasing
/// expiry order and eviction is O(1) pops from the front.
pub struct PathCache {
    items: FxHashMap<u64, CacheSlot>,
    /// Expiry FIFOs: [successful results, failed results].
    expiry: [VecDeque<(u32, u64)>; 2],
    scheme: KeyScheme,
    blocks_x: u32,
    blocks_z: u32,
    max_items: usize,
    stats: CacheStats,
}

impl PathCache {
    pub fn new(scheme: KeyScheme, blocks_x: u32, blocks_z: u32, max_items: usize) -> Self {
        Self {
            items: FxHashMap::default(),
            expiry: [VecDeque::new(), VecDeque::new()],
            scheme,
            blocks_x,
            blocks_z,
            max_items,
            stats: CacheStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn block_index(&self, b: BlockPos) -> u64 {
        (b.z as u64) * (self.blocks_x as u64) + (b.x as u64)
    }

    /// Pack the tuple into the map key under the configured scheme.
    pub fn packed_key(&self, key: &CacheKey) -> u64 {
        let start = self.block_index(key.start);
        let goal = self.block_index(key.goal);
        let radius = key
            .goal_radius
            .to_num::<i64>()
            .clamp(0, MAX_RADIUS_UNITS as i64 - 1) as u64;
        match self.scheme {
            KeyScheme::Exact => {
                let num_blocks = (self.blocks_x as u64) * (self.blocks_z as u64);
                let packed = (start as u128)
                    + (goal as u128) * (num_blocks as u128)
                    + (radius as u128) * (num_blocks as u128) * (num_blocks as u128)
                    + (key.class as u128)
                        * (num_blocks as u128)
                        * (num_blocks as u128)
                        * (MAX_RADIUS_UNITS as u128);
                debug_assert!(packed <= u64::MAX as u128, "cache key space exceeds 64 bits");
                packed as u64
            }
            KeyScheme::Legacy => {
                (start & 0xFFFF)
                    | ((goal & 0xFFFF) << 16)
                    | ((radius & 0xFFFF) << 32)
                    | ((key.class as u64) << 48)
            }
        }
    }

    /// Insert a search result. When the cache is at capacity the single
    /// oldest entry is evicted first. A key collision rejects the insertion:
    /// the existing entry stays authoritative.
    pub fn add(
        &mut self,
        key: CacheKey,
        result: SearchResult,
        path: Vec<Node>,
        current_frame: u32,
    ) -> CacheAddOutcome {
        let packed = self.packed_key(&key);
        if let Some(existing) = self.items.get(&packed) {
            if existing.key == key {
                return CacheAddOutcome::AlreadyCached;
            }
            self.stats.collisions += 1;
            warn!(
                "[PATH CACHE] key collision: {:?} vs existing {:?}, insert dropped",
                key, existing.key
            );
            return CacheAddOutcome::Collision;
        }

        if self.items.len() >= self.max_items {
            self.evict_oldest();
        }

        let lifetime = if result.is_success() {
            CACHE_LIFETIME_FRAMES
        } else {
            CACHE_LIFETIME_FRAMES / 2
        };
        let expiry = current_frame + lifetime;
        let queue = !result.is_success() as usize;
        self.expiry[queue].push_back((expiry, packed));
        self.items.insert(
            packed,
            CacheSlot {
                key,
                item: CachedPath {
                    result,
                    path,
                    expiry,
                },
            },
        );
        CacheAddOutcome::Inserted
    }

    /// Look up a tuple. A packed-key hit with a different stored tuple is an
    /// undetected earlier collision and counts as a miss.
    pub fn get(&mut self, key: &CacheKey) -> Option<CachedPath> {
        let packed = self.packed_key(key);
        match self.items.get(&packed) {
            Some(slot) if slot.key == *key => {
                self.stats.hits += 1;
                Some(slot.item.clone())
            }
            _ => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Evict entries whose expiry is at or before the current frame. Each
    /// FIFO is in non-decreasing expiry order (constant TTL per outcome
    /// class, insertion order tracks simulation time), so this is a pop from
    /// the front.
    pub fn tick(&mut self, current_frame: u32) {
        for queue in &mut self.expiry {
            while let Some(&(expiry, packed)) = queue.front() {
                if expiry > current_frame {
                    break;
                }
                queue.pop_front();
                self.items.remove(&packed);
            }
        }
    }

    /// Remove the single oldest entry by insertion frame.
    fn evict_oldest(&mut self) {
        let age = |queue: usize| -> Option<u32> {
            let ttl = if queue == 0 {
                CACHE_LIFETIME_FRAMES
            } else {
                CACHE_LIFETIME_FRAMES / 2
            };
            self.expiry[queue].front().map(|&(expiry, _)| expiry.wrapping_sub(ttl))
        };
        let pick = match (age(0), age(1)) {
            (Some(a), Some(b)) => {
                if b < a {
                    1
                } else {
                    0
                }
            }
            (Some(_), None) => 0,
            (None, Some(_)) => 1,
            (None, None) => return,
        };
        if let Some((_, packed)) = self.expiry[pick].pop_front() {
            self.items.remove(&packed);
        }
    }
}
