//! Observers turning mapped values into files.

mod delta;
mod snapshot;

pub use delta::{delta_file_name, DeltaRecord, DeltaWriter};
pub use snapshot::{SnapshotExport, SnapshotWriter};
