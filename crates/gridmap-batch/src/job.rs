use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::chunk::{ChunkCutter, ChunkRange};

#[derive(Debug, Clone)]
pub struct ChunkJob {
    pub chunk_id: String,
    pub index: usize,
    pub range: ChunkRange,
    pub output_dir: PathBuf,
}

/// Outcome of one chunk, as listed in the batch manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub first: i64,
    pub last: i64,
    pub status: String,
    pub error: Option<String>,
    pub artifacts: Vec<String>,
}

pub fn jobs_from_cutter(cutter: &ChunkCutter, output_root: &Path) -> Vec<ChunkJob> {
    cutter
        .ranges()
        .enumerate()
        .map(|(index, range)| {
            let chunk_id = format!("chunk-{index:04}");
            ChunkJob {
                output_dir: output_root.join(&chunk_id),
                chunk_id,
                index,
                range,
            }
        })
        .collect()
}
