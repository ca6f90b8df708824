//! Deterministic fingerprints over grid state and its build inputs.
//!
//! Every client sharing a simulation computes these identically; the grid
//! checksum feeds the host's cross-client consistency check and the input
//! hash validates the persisted cache file.

use super::grid::CostGrid;
use super::types::FORMAT_VERSION;
use crate::terrain::{MobilityTable, TerrainMap};
use sha2::{Digest, Sha256};

/// Fold a digest into 32 bits: the first 16 bytes as four little-endian u32
/// words, XORed pairwise.
pub(super) fn fold_digest(digest: &[u8]) -> u32 {
    let word = |i: usize| {
        u32::from_le_bytes([digest[i], digest[i + 1], digest[i + 2], digest[i + 3]])
    };
    (word(0) ^ word(4)) ^ (word(8) ^ word(12))
}

/// 32-bit fingerprint of the in-memory grid: a SHA-256 over the concatenated
/// byte image of all offset and cost arrays, folded.
pub(super) fn grid_checksum(grid: &CostGrid) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(grid.byte_image());
    fold_digest(&hasher.finalize())
}

/// Validation hash over everything the persisted grid is a pure function of:
/// terrain content, the mobility table, the block size and the format
/// version. Any change to any input produces a different value and
/// invalidates the cache file.
pub(super) fn input_hash(terrain: &TerrainMap, table: &MobilityTable, block_size: u32) -> u32 {
    let mut bytes = Vec::new();
    terrain.content_bytes(&mut bytes);
    table.content_bytes(&mut bytes);
    bytes.extend_from_slice(&block_size.to_le_bytes());
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    fold_digest(&hasher.finalize())
}
