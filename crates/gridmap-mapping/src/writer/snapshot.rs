//! Per-point network snapshots.
//!
//! Every point is evaluated on its own variant cloned from the initial one,
//! so values mapped at one point never leak into the next. Limits are not
//! isolated by variants: they are saved once the base case is complete and
//! put back after each point.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use gridmap_core::io::export_snapshot;
use gridmap_core::{GridMapError, GridMapResult, LimitSnapshot, Network, INITIAL_VARIANT_ID};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::log::BASE_CASE_POINT;
use crate::observer::{MappedValue, MappingObserver};
use crate::timeseries::TimeSeriesTable;

/// Points whose full network state is written to disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotExport {
    #[default]
    None,
    All,
    Points(BTreeSet<usize>),
}

impl SnapshotExport {
    pub fn includes(&self, point: usize) -> bool {
        match self {
            SnapshotExport::None => false,
            SnapshotExport::All => true,
            SnapshotExport::Points(points) => points.contains(&point),
        }
    }
}

/// Applies mapped values onto the network, one variant per point.
#[derive(Debug)]
pub struct SnapshotWriter {
    out_dir: PathBuf,
    export: SnapshotExport,
    version: i32,
    variant: Option<String>,
    limits: Option<LimitSnapshot>,
    exported: Vec<PathBuf>,
}

impl SnapshotWriter {
    pub fn new(out_dir: impl Into<PathBuf>, export: SnapshotExport) -> Self {
        Self {
            out_dir: out_dir.into(),
            export,
            version: 0,
            variant: None,
            limits: None,
            exported: Vec::new(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Files written so far, in export order.
    pub fn exported(&self) -> &[PathBuf] {
        &self.exported
    }

    fn variant_id(point: i32, table: &TimeSeriesTable) -> String {
        match table.instant(point) {
            Some(instant) => format!("point-{}", instant.to_rfc3339_opts(SecondsFormat::Secs, true)),
            None => format!("point-{point}"),
        }
    }
}

impl MappingObserver for SnapshotWriter {
    fn version_start(&mut self, network: &mut Network, version: i32) -> GridMapResult<()> {
        self.version = version;
        network.set_working_variant(INITIAL_VARIANT_ID)
    }

    fn point_start(
        &mut self,
        network: &mut Network,
        point: i32,
        table: &TimeSeriesTable,
    ) -> GridMapResult<()> {
        if point == BASE_CASE_POINT {
            return Ok(());
        }
        let id = Self::variant_id(point, table);
        network.clone_variant(INITIAL_VARIANT_ID, &id)?;
        network.set_working_variant(&id)?;
        self.variant = Some(id);
        Ok(())
    }

    fn value_mapped(&mut self, network: &mut Network, value: &MappedValue<'_>) -> GridMapResult<()> {
        // metrix variables have no network counterpart
        match value.variable.equipment() {
            Some(variable) => network.equipment_mut(value.equipment)?.apply(variable, value.value),
            None => Ok(()),
        }
    }

    fn point_end(
        &mut self,
        network: &mut Network,
        point: i32,
        table: &TimeSeriesTable,
        _balance: f64,
    ) -> GridMapResult<()> {
        if point == BASE_CASE_POINT {
            self.limits = Some(network.save_limits());
            return Ok(());
        }

        let index = usize::try_from(point)
            .map_err(|_| GridMapError::Export(format!("invalid point {point}")))?;
        if self.export.includes(index) {
            let instant = table.instant(point).ok_or_else(|| {
                GridMapError::Export(format!("no instant for point {point}"))
            })?;
            let path = export_snapshot(network, &self.out_dir, self.version, instant)
                .map_err(|e| GridMapError::Export(format!("{e:#}")))?;
            debug!(path = %path.display(), point, "snapshot exported");
            self.exported.push(path);
        }

        network.set_working_variant(INITIAL_VARIANT_ID)?;
        if let Some(id) = self.variant.take() {
            network.remove_variant(&id)?;
        }
        if let Some(limits) = &self.limits {
            network.restore_limits(limits);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MapperParameters, MappingConfig, MappingSpec, EquipmentEntry};
    use crate::evaluator::map_network;
    use crate::log::MappingLog;
    use chrono::{DateTime, Utc};
    use gridmap_core::io::load_network;
    use gridmap_core::{EquipmentKind, Generator, HvdcLine, Load};
    use tempfile::tempdir;

    fn table(values: Vec<f64>) -> TimeSeriesTable {
        let start: DateTime<Utc> = "2015-01-01T00:00:00Z".parse().unwrap();
        let instants = (0..values.len())
            .map(|i| start + chrono::Duration::hours(i as i64))
            .collect();
        let mut table = TimeSeriesTable::new(instants);
        table.add_series("demand", 1, values).unwrap();
        table
    }

    fn config() -> MappingConfig {
        MappingConfig {
            mappings: vec![MappingSpec {
                timeseries: "demand".into(),
                kind: EquipmentKind::Load,
                variable: None,
                equipments: vec![EquipmentEntry::Id("L1".into())],
            }],
            ..Default::default()
        }
    }

    fn network() -> Network {
        let mut network = Network::new("net");
        network.add_load(Load::new("L1", 10.0)).unwrap();
        network.add_generator(Generator::new("G1", 0.0, 100.0, 50.0)).unwrap();
        network
    }

    #[test]
    fn selected_points_are_exported_and_initial_state_kept() {
        let dir = tempdir().unwrap();
        let mut network = network();
        let mut writer = SnapshotWriter::new(
            dir.path(),
            SnapshotExport::Points(BTreeSet::from([1])),
        );
        let mut log = MappingLog::new();
        {
            let mut observers: [&mut dyn MappingObserver; 1] = [&mut writer];
            map_network(
                &mut network,
                &config(),
                &mut table(vec![20.0, 30.0, 40.0]),
                &MapperParameters::default(),
                &mut observers,
                &mut log,
            )
            .unwrap();
        }

        assert_eq!(writer.exported().len(), 1);
        let exported = load_network(&writer.exported()[0]).unwrap();
        assert_eq!(exported.load("L1").unwrap().state.p0, 30.0);
        assert!(writer.exported()[0].ends_with("net_1_20150101_0100.json"));

        // point variants are gone, the initial state is untouched
        assert_eq!(network.variant_ids(), vec![INITIAL_VARIANT_ID.to_string()]);
        assert_eq!(network.load("L1").unwrap().state.p0, 10.0);
    }

    #[test]
    fn constant_values_land_on_initial_variant() {
        let dir = tempdir().unwrap();
        let mut network = network();
        let mut writer = SnapshotWriter::new(dir.path(), SnapshotExport::All);
        let mut log = MappingLog::new();
        {
            let mut observers: [&mut dyn MappingObserver; 1] = [&mut writer];
            map_network(
                &mut network,
                &config(),
                &mut table(vec![25.0, 25.0]),
                &MapperParameters::default(),
                &mut observers,
                &mut log,
            )
            .unwrap();
        }

        assert_eq!(writer.exported().len(), 2);
        assert_eq!(network.load("L1").unwrap().state.p0, 25.0);
        for path in writer.exported() {
            assert_eq!(load_network(path).unwrap().load("L1").unwrap().state.p0, 25.0);
        }
    }

    #[test]
    fn widened_limits_do_not_survive_the_point() {
        let dir = tempdir().unwrap();
        let mut network = network();
        let mut table = table(vec![150.0, 80.0]);
        table.add_series("wind", 1, vec![150.0, 80.0]).unwrap();
        let config = MappingConfig {
            mappings: vec![MappingSpec {
                timeseries: "wind".into(),
                kind: EquipmentKind::Generator,
                variable: None,
                equipments: vec![EquipmentEntry::Id("G1".into())],
            }],
            ..Default::default()
        };
        let parameters = MapperParameters {
            policy: crate::config::ResolutionPolicy::WidenLimits,
            ..Default::default()
        };
        let mut writer = SnapshotWriter::new(dir.path(), SnapshotExport::All);
        let mut log = MappingLog::new();
        {
            let mut observers: [&mut dyn MappingObserver; 1] = [&mut writer];
            map_network(&mut network, &config, &mut table, &parameters, &mut observers, &mut log)
                .unwrap();
        }

        let first = load_network(&writer.exported()[0]).unwrap();
        assert_eq!(first.generator("G1").unwrap().state.target_p, 150.0);
        assert_eq!(first.generator("G1").unwrap().max_p, 151.0);
        assert_eq!(network.generator("G1").unwrap().max_p, 100.0);
    }

    /// Compares the shared limits with the base-case ones at every point
    /// boundary it sees.
    #[derive(Default)]
    struct LimitWatch {
        base: Option<LimitSnapshot>,
        starts: Vec<(i32, bool)>,
        ends: Vec<(i32, bool)>,
    }

    impl LimitWatch {
        fn matches_base(&self, network: &Network) -> bool {
            self.base.as_ref() == Some(&network.save_limits())
        }
    }

    impl MappingObserver for LimitWatch {
        fn point_start(
            &mut self,
            network: &mut Network,
            point: i32,
            _table: &TimeSeriesTable,
        ) -> GridMapResult<()> {
            if point != BASE_CASE_POINT {
                let matches = self.matches_base(network);
                self.starts.push((point, matches));
            }
            Ok(())
        }

        fn point_end(
            &mut self,
            network: &mut Network,
            point: i32,
            _table: &TimeSeriesTable,
            _balance: f64,
        ) -> GridMapResult<()> {
            if point == BASE_CASE_POINT {
                self.base = Some(network.save_limits());
            } else {
                let matches = self.matches_base(network);
                self.ends.push((point, matches));
            }
            Ok(())
        }
    }

    fn limit_spec(timeseries: &str, kind: EquipmentKind, variable: &str, id: &str) -> MappingSpec {
        MappingSpec {
            timeseries: timeseries.into(),
            kind,
            variable: Some(variable.parse().unwrap()),
            equipments: vec![EquipmentEntry::Id(id.into())],
        }
    }

    fn run_watched(
        network: &mut Network,
        config: &MappingConfig,
        table: &mut TimeSeriesTable,
        parameters: &MapperParameters,
    ) -> (LimitWatch, LimitWatch) {
        let dir = tempdir().unwrap();
        let mut before = LimitWatch::default();
        let mut writer = SnapshotWriter::new(dir.path(), SnapshotExport::None);
        let mut after = LimitWatch::default();
        let mut log = MappingLog::new();
        {
            let mut observers: [&mut dyn MappingObserver; 3] = [&mut before, &mut writer, &mut after];
            map_network(network, config, table, parameters, &mut observers, &mut log).unwrap();
        }
        (before, after)
    }

    #[test]
    fn mapped_limits_are_back_to_base_case_at_every_point() {
        let mut network = network();
        network.add_hvdc_line(HvdcLine::new("H1", 200.0, 10.0)).unwrap();
        let mut table = table(vec![20.0, 30.0, 40.0, 50.0]);
        table.add_series("gmax", 1, vec![120.0, 140.0, 130.0, 160.0]).unwrap();
        table.add_series("wind", 1, vec![110.0, 135.0, 60.0, 90.0]).unwrap();
        table.add_series("hcap", 1, vec![300.0, 250.0, 400.0, 220.0]).unwrap();
        table.add_series("hmin", 1, vec![-150.0, -260.0, -100.0, -210.0]).unwrap();
        let config = MappingConfig {
            mappings: vec![
                limit_spec("gmax", EquipmentKind::Generator, "maxP", "G1"),
                limit_spec("wind", EquipmentKind::Generator, "targetP", "G1"),
                limit_spec("hcap", EquipmentKind::HvdcLine, "maxP", "H1"),
                limit_spec("hmin", EquipmentKind::HvdcLine, "minP", "H1"),
            ],
            ..Default::default()
        };
        let base = network.save_limits();
        let (before, after) =
            run_watched(&mut network, &config, &mut table, &MapperParameters::default());

        // every point changed the shared limits before the writer closed it
        assert_eq!(before.ends, vec![(0, false), (1, false), (2, false), (3, false)]);
        assert_eq!(after.ends, vec![(0, true), (1, true), (2, true), (3, true)]);
        assert_eq!(after.starts, vec![(0, true), (1, true), (2, true), (3, true)]);
        assert_eq!(network.save_limits(), base);
        assert!(network.hvdc_line("H1").unwrap().power_range.is_none());
    }

    #[test]
    fn widened_limits_are_restored_after_every_point() {
        let mut network = network();
        let mut table = table(vec![20.0, 30.0, 40.0, 50.0]);
        table.add_series("wind", 1, vec![150.0, 80.0, 170.0, 90.0]).unwrap();
        let config = MappingConfig {
            mappings: vec![limit_spec("wind", EquipmentKind::Generator, "targetP", "G1")],
            ..Default::default()
        };
        let parameters = MapperParameters {
            policy: crate::config::ResolutionPolicy::WidenLimits,
            ..Default::default()
        };
        let base = network.save_limits();
        let (before, after) = run_watched(&mut network, &config, &mut table, &parameters);

        assert_eq!(before.ends[0], (0, false));
        assert_eq!(before.ends[2], (2, false));
        assert_eq!(after.ends, vec![(0, true), (1, true), (2, true), (3, true)]);
        // the first point starts from the base case
        assert_eq!(after.starts[0], (0, true));
        assert_eq!(network.save_limits(), base);
    }
}
