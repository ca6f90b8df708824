use super::types::BlockOffset;
use crate::math::FixedNum;
use std::sync::Mutex;
use tracing::debug;

/// Backing storage for one estimator instance: offset array, cost array and
/// the change tracker's obsolete masks.
#[derive(Default)]
pub struct GridBuffers {
    pub(super) offsets: Vec<BlockOffset>,
    pub(super) costs: Vec<FixedNum>,
    pub(super) masks: Vec<u8>,
}

/// Free-list arena for estimator grid buffers.
///
/// Owned by the embedding pathfinding manager. An estimator claims a buffer
/// set at construction and returns it on drop, so tearing down and recreating
/// an estimator at the same slot (map reload, mod restart) reuses the
/// allocations instead of repeating them.
#[derive(Default)]
pub struct GridBufferArena {
    free: Mutex<Vec<GridBuffers>>,
}

impl GridBufferArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a buffer set, reusing a released one when available.
    pub fn claim(&self) -> GridBuffers {
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        match free.pop() {
            Some(buffers) => {
                debug!("[ARENA] reusing grid buffers ({} free)", free.len());
                buffers
            }
            None => GridBuffers::default(),
        }
    }

    /// Return a buffer set to the free list. Mask state is cleared here so a
    /// reused buffer never carries stale obsolete flags.
    pub fn release(&self, mut buffers: GridBuffers) {
        buffers.masks.iter_mut().for_each(|m| *m = 0);
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        free.push(buffers);
    }

    /// Number of buffer sets currently on the free list.
    pub fn free_count(&self) -> usize {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
