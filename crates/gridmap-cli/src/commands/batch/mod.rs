use std::time::Instant;

use anyhow::Result;
use gridmap_batch::{run_batch, BatchRunnerConfig};
use gridmap_cli::cli::BatchArgs;
use tracing::info;

use crate::commands::common::{load_inputs, LoadedInputs};

pub fn handle(args: &BatchArgs) -> Result<()> {
    let LoadedInputs {
        network,
        config,
        table,
        parameters,
        snapshots,
    } = load_inputs(&args.inputs)?;
    let config = BatchRunnerConfig {
        network,
        config,
        table,
        parameters,
        output_root: args.inputs.out.clone(),
        chunk_size: args.chunk_size,
        snapshots,
        threads: args.threads,
    };

    let start = Instant::now();
    let summary = run_batch(&config)?;
    info!("batch finished in {:.2?}", start.elapsed());
    println!(
        "batch map {} chunks -> {}/{} ok/fail",
        summary.chunks.len(),
        summary.success,
        summary.failure
    );
    println!("manifest: {}", summary.manifest_path.display());
    if let Some(path) = &summary.log_path {
        println!("log: {}", path.display());
    }
    Ok(())
}
