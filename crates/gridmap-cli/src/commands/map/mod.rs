use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use gridmap_cli::cli::{LogFormat, MapArgs};
use gridmap_mapping::{
    map_network, BalanceSummary, DeltaWriter, EquipmentValuesWriter, MappingLog, MappingObserver,
    SnapshotExport, SnapshotWriter,
};
use tracing::info;

use crate::commands::common::{load_inputs, LoadedInputs};

pub fn handle(args: &MapArgs) -> Result<()> {
    let LoadedInputs {
        mut network,
        config,
        mut table,
        parameters,
        snapshots,
    } = load_inputs(&args.inputs)?;
    let out = args.inputs.out.as_path();
    fs::create_dir_all(out)
        .with_context(|| format!("creating output directory '{}'", out.display()))?;

    let range = parameters
        .point_range
        .or_else(|| table.full_range())
        .ok_or_else(|| anyhow!("time series has no point"))?;

    let mut snapshot = (snapshots != SnapshotExport::None)
        .then(|| SnapshotWriter::new(out.join("snapshots"), snapshots));
    let mut delta = (!args.no_delta)
        .then(|| DeltaWriter::new(out, range.len(), config.contingencies.clone()));
    let mut balance = args.balance.then(BalanceSummary::new);
    let mut values = args
        .values
        .as_ref()
        .map(|prefix| EquipmentValuesWriter::new(out, prefix.as_str()));

    let mut log = MappingLog::new();
    let summary = {
        let mut observers: Vec<&mut dyn MappingObserver> = Vec::new();
        if let Some(writer) = snapshot.as_mut() {
            observers.push(writer);
        }
        if let Some(writer) = delta.as_mut() {
            observers.push(writer);
        }
        if let Some(summary) = balance.as_mut() {
            observers.push(summary);
        }
        if let Some(writer) = values.as_mut() {
            observers.push(writer);
        }
        map_network(
            &mut network,
            &config,
            &mut table,
            &parameters,
            &mut observers,
            &mut log,
        )?
    };

    let log_path = write_log(&log, out, args.log_format)?;
    println!(
        "mapped {} version(s) over points [{}, {}]: {} log entries -> {}",
        summary.versions.len(),
        range.first,
        range.last,
        log.len(),
        log_path.display()
    );
    if let Some(writer) = &delta {
        for path in writer.written() {
            println!("delta: {}", path.display());
        }
    }
    if let Some(writer) = &snapshot {
        info!("{} snapshots exported", writer.exported().len());
    }
    if let Some(summary) = &balance {
        let path = summary.write_csv(out)?;
        println!("balance: {}", path.display());
    }
    if let Some(writer) = &values {
        for path in writer.written() {
            println!("values: {}", path.display());
        }
    }
    Ok(())
}

fn write_log(log: &MappingLog, out: &Path, format: LogFormat) -> Result<std::path::PathBuf> {
    let path = match format {
        LogFormat::Csv => {
            let path = out.join("mapping_log.csv");
            log.write_csv(&path)?;
            path
        }
        LogFormat::Json => {
            let path = out.join("mapping_log.json");
            log.write_json(&path)?;
            path
        }
    };
    Ok(path)
}
