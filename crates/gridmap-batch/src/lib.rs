pub mod chunk;
pub mod job;
pub mod manifest;
pub mod runner;

pub use chunk::{ChunkCutter, ChunkRange};
pub use job::{jobs_from_cutter, ChunkJob, ChunkRecord};
pub use manifest::{load_batch_manifest, write_batch_manifest, BatchManifest, MANIFEST_FILE_NAME};
pub use runner::{run_batch, BatchRunnerConfig, BatchSummary, LOG_FILE_NAME};
