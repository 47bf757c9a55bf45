use std::collections::BTreeSet;

use anyhow::{anyhow, Context, Result};
use gridmap_cli::cli::MappingInputs;
use gridmap_core::io::load_network;
use gridmap_core::Network;
use gridmap_mapping::{
    load_config_from_path, load_parameters_from_path, load_timeseries_csv, MapperParameters,
    MappingConfig, PointRange, SnapshotExport, TimeSeriesTable,
};
use tracing::info;

pub struct LoadedInputs {
    pub network: Network,
    pub config: MappingConfig,
    pub table: TimeSeriesTable,
    pub parameters: MapperParameters,
    pub snapshots: SnapshotExport,
}

pub fn load_inputs(inputs: &MappingInputs) -> Result<LoadedInputs> {
    info!("Loading network {}", inputs.network.display());
    let network = load_network(&inputs.network)?;
    let config = load_config_from_path(&inputs.config)?;
    let table = load_timeseries_csv(&inputs.timeseries)?;
    let parameters = parameters(inputs, &table)?;
    let snapshots = parse_snapshots(inputs.snapshots.as_deref())?;
    info!(
        "{} series over {} points, versions {:?}",
        table.names().len(),
        table.point_count(),
        table.versions()
    );
    Ok(LoadedInputs {
        network,
        config,
        table,
        parameters,
        snapshots,
    })
}

/// Parameters file, overridden by the command line flags.
fn parameters(inputs: &MappingInputs, table: &TimeSeriesTable) -> Result<MapperParameters> {
    let mut parameters = match &inputs.parameters {
        Some(path) => load_parameters_from_path(path)?,
        None => MapperParameters::default(),
    };
    if !inputs.versions.is_empty() {
        parameters.versions = inputs.versions.clone();
    }
    if inputs.first.is_some() || inputs.last.is_some() {
        let full = table
            .full_range()
            .ok_or_else(|| anyhow!("time series '{}' has no point", inputs.timeseries.display()))?;
        let first = inputs.first.unwrap_or(full.first);
        let last = inputs.last.unwrap_or(full.last);
        parameters.point_range = Some(PointRange::new(first, last)?);
    }
    if let Some(policy) = inputs.policy {
        parameters.policy = policy.into();
    }
    if inputs.ignore_empty_filter {
        parameters.ignore_empty_filter = true;
    }
    if inputs.no_constant_detection {
        parameters.identify_constant_timeseries = false;
    }
    Ok(parameters)
}

pub fn parse_snapshots(spec: Option<&str>) -> Result<SnapshotExport> {
    let Some(spec) = spec.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(SnapshotExport::None);
    };
    if spec.eq_ignore_ascii_case("all") {
        return Ok(SnapshotExport::All);
    }
    let points = spec
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .with_context(|| format!("invalid snapshot point '{s}'"))
        })
        .collect::<Result<BTreeSet<usize>>>()?;
    Ok(SnapshotExport::Points(points))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_selection() {
        assert_eq!(parse_snapshots(None).unwrap(), SnapshotExport::None);
        assert_eq!(parse_snapshots(Some("ALL")).unwrap(), SnapshotExport::All);
        assert_eq!(
            parse_snapshots(Some("3, 1,,3")).unwrap(),
            SnapshotExport::Points(BTreeSet::from([1, 3]))
        );
        assert!(parse_snapshots(Some("1,x")).is_err());
    }
}
