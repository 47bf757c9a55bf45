//! Network file boundaries: JSON import and per-point snapshot export.

use std::fs;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::network::Network;

pub fn load_network(path: &Path) -> Result<Network> {
    let file =
        File::open(path).with_context(|| format!("opening network '{}'", path.display()))?;
    serde_json::from_reader(file).with_context(|| format!("parsing network '{}'", path.display()))
}

pub fn write_network(network: &Network, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("creating network file '{}'", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), network)
        .with_context(|| format!("writing network file '{}'", path.display()))
}

/// `<network id>_<version>_<yyyyMMdd_HHmm>.json`, the instant rendered in UTC.
pub fn snapshot_file_name(network_id: &str, version: i32, instant: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}.json",
        network_id,
        version,
        instant.format("%Y%m%d_%H%M")
    )
}

/// Export the working variant of `network` into `out_dir`.
pub fn export_snapshot(
    network: &Network,
    out_dir: &Path,
    version: i32,
    instant: DateTime<Utc>,
) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating snapshot directory '{}'", out_dir.display()))?;
    let path = out_dir.join(snapshot_file_name(network.id(), version, instant));
    write_network(network, &path)?;
    Ok(path)
}
