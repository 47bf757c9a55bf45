//! Generation minus consumption at every point.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use gridmap_core::{
    Equipment, EquipmentKind, EquipmentVariable, GridMapResult, MappingVariable, Network,
};
use tracing::debug;

use crate::log::{format_decimal, BASE_CASE_POINT};
use crate::observer::{MappedValue, MappingObserver};
use crate::timeseries::TimeSeriesTable;

pub const BALANCE_FILE_NAME: &str = "balanceSummary.csv";

fn format_balance(value: f64) -> String {
    if value.is_nan() || value.abs() == f64::MAX {
        "?".to_string()
    } else {
        format_decimal(value)
    }
}

/// Per-version statistics over the evaluated points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceStats {
    pub version: i32,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: usize,
}

impl BalanceStats {
    fn new(version: i32) -> Self {
        Self {
            version,
            min: f64::MAX,
            max: -f64::MAX,
            sum: 0.0,
            count: 0,
        }
    }

    fn update(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.count += 1;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.sum / self.count as f64
        }
    }
}

#[derive(Debug, Default)]
pub struct BalanceSummary {
    balance: f64,
    constant_balance: f64,
    /// Loads whose p0 was already counted through one of its components.
    counted_loads: HashSet<String>,
    current: Option<BalanceStats>,
    stats: Vec<BalanceStats>,
    values: BTreeMap<DateTime<Utc>, BTreeMap<i32, f64>>,
}

impl BalanceSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &[BalanceStats] {
        &self.stats
    }

    /// Balance of `version` at `instant`, if evaluated.
    pub fn value(&self, instant: DateTime<Utc>, version: i32) -> Option<f64> {
        self.values.get(&instant)?.get(&version).copied()
    }

    /// Base-case value of an injection, used when the mapped value is NaN.
    fn network_injection(
        &mut self,
        network: &Network,
        value: &MappedValue<'_>,
        variable: EquipmentVariable,
    ) -> GridMapResult<f64> {
        Ok(match network.equipment(value.equipment)? {
            Equipment::Generator(g) => g.state.target_p,
            Equipment::BoundaryLine(b) => -b.p0,
            Equipment::Load(l) => match (variable, l.state.detail) {
                (EquipmentVariable::P0, _) => -l.state.p0,
                (EquipmentVariable::FixedActivePower, Some(d)) => -d.fixed_active_power,
                (EquipmentVariable::VariableActivePower, Some(d)) => -d.variable_active_power,
                (_, None) if self.counted_loads.insert(l.id.clone()) => -l.state.p0,
                _ => 0.0,
            },
            _ => 0.0,
        })
    }

    /// `Time;Version <v>...` with one row per evaluated instant.
    pub fn write_csv_to<W: Write>(&self, writer: W) -> Result<()> {
        let versions: Vec<i32> = self.stats.iter().map(|s| s.version).collect();
        let mut csv = csv::WriterBuilder::new()
            .delimiter(b';')
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);
        let mut header = vec!["Time".to_string()];
        header.extend(versions.iter().map(|v| format!("Version {v}")));
        csv.write_record(&header)?;
        for (instant, row) in &self.values {
            let mut record = vec![instant.to_rfc3339_opts(SecondsFormat::Secs, true)];
            record.extend(
                versions
                    .iter()
                    .map(|v| format_balance(row.get(v).copied().unwrap_or(f64::NAN))),
            );
            csv.write_record(&record)?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Writes [`BALANCE_FILE_NAME`] into `dir`.
    pub fn write_csv(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(BALANCE_FILE_NAME);
        let file = File::create(&path)
            .with_context(|| format!("creating balance summary '{}'", path.display()))?;
        self.write_csv_to(BufWriter::new(file))
            .with_context(|| format!("writing balance summary '{}'", path.display()))?;
        Ok(path)
    }

    /// `Version;Min;Max;Sum;Mean`
    pub fn write_stats_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::WriterBuilder::new()
            .delimiter(b';')
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);
        csv.write_record(["Version", "Min", "Max", "Sum", "Mean"])?;
        for stats in &self.stats {
            csv.write_record([
                stats.version.to_string(),
                format_balance(stats.min),
                format_balance(stats.max),
                format_balance(stats.sum),
                format_balance(stats.mean()),
            ])?;
        }
        csv.flush()?;
        Ok(())
    }
}

impl MappingObserver for BalanceSummary {
    fn version_start(&mut self, _network: &mut Network, version: i32) -> GridMapResult<()> {
        self.current = Some(BalanceStats::new(version));
        self.constant_balance = 0.0;
        Ok(())
    }

    fn point_start(
        &mut self,
        _network: &mut Network,
        _point: i32,
        _table: &TimeSeriesTable,
    ) -> GridMapResult<()> {
        self.balance = 0.0;
        self.counted_loads.clear();
        Ok(())
    }

    fn value_mapped(&mut self, network: &mut Network, value: &MappedValue<'_>) -> GridMapResult<()> {
        use EquipmentVariable as V;
        let MappingVariable::Equipment(variable) = value.variable else {
            return Ok(());
        };
        let sign = match (value.equipment.kind, variable) {
            (EquipmentKind::Generator, V::TargetP) => 1.0,
            (EquipmentKind::Load, V::P0 | V::FixedActivePower | V::VariableActivePower) => -1.0,
            (EquipmentKind::BoundaryLine, V::P0) => -1.0,
            _ => return Ok(()),
        };
        self.balance += if value.value.is_nan() {
            self.network_injection(network, value, variable)?
        } else {
            sign * value.value
        };
        Ok(())
    }

    fn point_end(
        &mut self,
        _network: &mut Network,
        point: i32,
        table: &TimeSeriesTable,
        balance: f64,
    ) -> GridMapResult<()> {
        self.balance += balance;
        if point == BASE_CASE_POINT {
            self.constant_balance = self.balance;
            return Ok(());
        }
        self.balance += self.constant_balance;
        if let Some(current) = self.current.as_mut() {
            current.update(self.balance);
            if let Some(instant) = table.instant(point) {
                self.values
                    .entry(instant)
                    .or_default()
                    .insert(current.version, self.balance);
            }
        }
        Ok(())
    }

    fn version_end(&mut self, _network: &mut Network, version: i32) -> GridMapResult<()> {
        if let Some(stats) = self.current.take() {
            debug!(
                version,
                min = stats.min,
                max = stats.max,
                mean = stats.mean(),
                "balance summary"
            );
            self.stats.push(stats);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EquipmentEntry, MapperParameters, MappingConfig, MappingSpec};
    use crate::evaluator::map_network;
    use crate::log::MappingLog;
    use gridmap_core::{BoundaryLine, Generator, Load};
    use tempfile::tempdir;

    fn run(network: &mut Network, config: &MappingConfig, table: &mut TimeSeriesTable) -> BalanceSummary {
        let mut summary = BalanceSummary::new();
        let mut log = MappingLog::new();
        {
            let mut observers: [&mut dyn MappingObserver; 1] = [&mut summary];
            map_network(
                network,
                config,
                table,
                &MapperParameters::default(),
                &mut observers,
                &mut log,
            )
            .unwrap();
        }
        summary
    }

    fn instants(n: usize) -> Vec<DateTime<Utc>> {
        let start: DateTime<Utc> = "2015-01-01T00:00:00Z".parse().unwrap();
        (0..n).map(|i| start + chrono::Duration::hours(i as i64)).collect()
    }

    fn spec(timeseries: &str, kind: EquipmentKind, id: &str) -> MappingSpec {
        MappingSpec {
            timeseries: timeseries.into(),
            kind,
            variable: None,
            equipments: vec![EquipmentEntry::Id(id.into())],
        }
    }

    #[test]
    fn balance_adds_constant_and_unmapped_parts() {
        let mut network = Network::new("n");
        network.add_generator(Generator::new("G1", 0.0, 500.0, 0.0)).unwrap();
        network.add_generator(Generator::new("G2", 0.0, 500.0, 30.0)).unwrap();
        network.add_load(Load::new("L1", 0.0)).unwrap();
        network.add_load(Load::new("L2", 5.0)).unwrap();
        network.add_boundary_line(BoundaryLine { id: "B1".into(), p0: 0.0 }).unwrap();
        let mut table = TimeSeriesTable::new(instants(2));
        table.add_series("prod", 1, vec![100.0, 200.0]).unwrap();
        table.add_series("cons", 1, vec![40.0, 40.0]).unwrap();
        table.add_series("export", 1, vec![10.0, 20.0]).unwrap();
        let config = MappingConfig {
            mappings: vec![
                spec("prod", EquipmentKind::Generator, "G1"),
                spec("cons", EquipmentKind::Load, "L1"),
                spec("export", EquipmentKind::BoundaryLine, "B1"),
            ],
            ..Default::default()
        };
        let summary = run(&mut network, &config, &mut table);

        // G2 and L2 unmapped: +30 - 5, L1 constant: -40
        let t0 = instants(1)[0];
        assert_eq!(summary.value(t0, 1), Some(100.0 - 10.0 + 30.0 - 5.0 - 40.0));
        let stats = summary.stats()[0];
        assert_eq!(stats.count, 2);
        assert_eq!(stats.min, 75.0);
        assert_eq!(stats.max, 165.0);
        assert_eq!(stats.mean(), 120.0);
    }

    #[test]
    fn csv_exports() {
        let mut network = Network::new("n");
        network.add_generator(Generator::new("G1", 0.0, 500.0, 0.0)).unwrap();
        let mut table = TimeSeriesTable::new(instants(2));
        table.add_series("prod", 1, vec![10.0, 12.4]).unwrap();
        table.add_series("prod", 2, vec![11.0, 13.0]).unwrap();
        let config = MappingConfig {
            mappings: vec![spec("prod", EquipmentKind::Generator, "G1")],
            ..Default::default()
        };
        let summary = run(&mut network, &config, &mut table);

        let dir = tempdir().unwrap();
        let path = summary.write_csv(dir.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "Time;Version 1;Version 2\n\
             2015-01-01T00:00:00Z;10;11\n\
             2015-01-01T01:00:00Z;12.4;13\n"
        );

        let mut stats = Vec::new();
        summary.write_stats_to(&mut stats).unwrap();
        assert_eq!(
            String::from_utf8(stats).unwrap(),
            "Version;Min;Max;Sum;Mean\n1;10;12.4;22.4;11.2\n2;11;13;24;12\n"
        );
    }

    #[test]
    fn empty_version_renders_unknown() {
        assert_eq!(format_balance(f64::MAX), "?");
        assert_eq!(format_balance(-f64::MAX), "?");
        assert_eq!(format_balance(f64::NAN), "?");
        assert!(BalanceStats::new(1).mean().is_nan());
    }
}
