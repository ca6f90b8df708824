//! Persisted grid cache: one named entry in a zlib-compressed file.
//!
//! Layout inside the stream: the entry tag, then a header hash over the
//! build inputs, then the class-major offset array (16-bit cell pairs), then
//! the complete vertex-cost array. A stale or corrupt file is deleted by the
//! caller and the grid is recomputed; failing to write only costs the next
//! launch a recompute.

use super::grid::CostGrid;
use super::types::BlockOffset;
use crate::math::FixedNum;
use crate::terrain::MobilityTable;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize)]
struct CacheImage {
    hash: u32,
    offsets: Vec<BlockOffset>,
    costs: Vec<FixedNum>,
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    tag: String,
    image: CacheImage,
}

/// Cache file name: block-size tag, path-model tag (folded hash of the
/// mobility table) and map name.
pub(super) fn cache_file_path(
    cache_dir: &Path,
    map_name: &str,
    block_size: u32,
    table: &MobilityTable,
) -> PathBuf {
    let mut table_bytes = Vec::new();
    table.content_bytes(&mut table_bytes);
    let mut hasher = Sha256::new();
    hasher.update(&table_bytes);
    let model_tag = super::checksum::fold_digest(&hasher.finalize());
    cache_dir.join(format!("pe{}-{:08x}-{}.pcache", block_size, model_tag, map_name))
}

pub(super) fn write_grid(
    path: &Path,
    tag: &str,
    grid: &CostGrid,
    hash: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let mut encoder = ZlibEncoder::new(writer, Compression::default());
    let entry = CacheEntry {
        tag: tag.to_string(),
        image: CacheImage {
            hash,
            offsets: grid.offsets.clone(),
            costs: grid.costs.clone(),
        },
    };
    bincode::serialize_into(&mut encoder, &entry)?;
    encoder.finish()?;
    Ok(())
}

/// Fill `grid` from the cache file. `Ok(false)` is a clean miss (no file);
/// any mismatch (wrong tag, wrong array sizes, header hash differing from
/// the freshly computed `expected_hash`) is an error so the caller can
/// delete the stale file and recompute.
pub(super) fn read_grid(
    path: &Path,
    tag: &str,
    grid: &mut CostGrid,
    expected_hash: u32,
) -> Result<bool, Box<dyn std::error::Error>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    let reader = BufReader::new(file);
    let mut decoder = ZlibDecoder::new(reader);
    let entry: CacheEntry = bincode::deserialize_from(&mut decoder)?;

    if entry.tag != tag {
        return Err(format!("cache entry tag mismatch: {:?}", entry.tag).into());
    }
    if entry.image.offsets.len() != grid.offsets.len()
        || entry.image.costs.len() != grid.costs.len()
    {
        return Err("cache entry size mismatch".into());
    }
    if entry.image.hash != expected_hash {
        return Err(format!(
            "cache hash mismatch: file {:08x}, expected {:08x}",
            entry.image.hash, expected_hash
        )
        .into());
    }

    // Copy into the pooled buffers rather than replacing them.
    grid.offsets.copy_from_slice(&entry.image.offsets);
    grid.costs.copy_from_slice(&entry.image.costs);
    Ok(true)
}
