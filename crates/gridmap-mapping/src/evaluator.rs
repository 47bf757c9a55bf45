//! Point evaluator.
//!
//! Drives one run: for every version, correct the unmapped base case, map
//! the constant series once at the base-case point, then map the variable
//! series at every point of the range. Values go through the resolver, which
//! hands them to the observers.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use chrono::SecondsFormat;
use gridmap_core::{
    EquipmentKind, EquipmentVariable, GridMapError, GridMapResult, MappingVariable, Network,
};
use tracing::{debug, info};

use crate::basecase::{correct_unmapped_generator, correct_unmapped_hvdc_line, UnmappedLimits};
use crate::config::{MapperParameters, MappingConfig, PointRange};
use crate::index::{kind_rank, DirectMapping, MappedEquipment, MappingGroup, MappingIndex};
use crate::log::{Bound, LogEvent, LogLevel, MappingLog, BASE_CASE_POINT};
use crate::observer::{MappedValue, MappingObserver, Observers};
use crate::resolver::Resolver;
use crate::synthesis::VersionSynthesis;
use crate::timeseries::TimeSeriesTable;

/// Standard deviation below which a distributed series is constant.
const CONSTANT_GROUP_STD_DEV: f64 = 1e-6;
/// Standard deviation below which a direct equipment series is constant.
const CONSTANT_DIRECT_STD_DEV: f64 = 1e-5;

/// What a run did, per version.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub point_range: Option<PointRange>,
    pub versions: Vec<i32>,
    pub syntheses: BTreeMap<i32, VersionSynthesis>,
}

/// A group evaluated at the base case or at every point. A load component
/// group can be split between both: `members` then lists the equipment this
/// plan forwards, while the distribution still runs over the whole group.
#[derive(Debug, Clone)]
struct GroupPlan<'i> {
    group: &'i MappingGroup,
    members: Option<Vec<usize>>,
    equipments: Cow<'i, [MappedEquipment]>,
}

impl<'i> GroupPlan<'i> {
    fn whole(group: &'i MappingGroup) -> Self {
        Self {
            group,
            members: None,
            equipments: Cow::Borrowed(&group.equipments),
        }
    }

    fn part(group: &'i MappingGroup, members: Vec<usize>) -> Self {
        let equipments = members
            .iter()
            .map(|&i| group.equipments[i].clone())
            .collect::<Vec<_>>();
        Self {
            group,
            members: Some(members),
            equipments: Cow::Owned(equipments),
        }
    }
}

#[derive(Debug, Default)]
struct Plan<'i> {
    constant_groups: Vec<GroupPlan<'i>>,
    variable_groups: Vec<GroupPlan<'i>>,
    constant_direct: Vec<&'i DirectMapping>,
    variable_direct: Vec<&'i DirectMapping>,
}

impl Plan<'_> {
    fn has_constants(&self) -> bool {
        !self.constant_groups.is_empty() || !self.constant_direct.is_empty()
    }
}

pub struct TimeSeriesMapper<'a> {
    index: &'a MappingIndex,
    table: &'a TimeSeriesTable,
    parameters: &'a MapperParameters,
}

impl<'a> TimeSeriesMapper<'a> {
    pub fn new(
        index: &'a MappingIndex,
        table: &'a TimeSeriesTable,
        parameters: &'a MapperParameters,
    ) -> Self {
        Self {
            index,
            table,
            parameters,
        }
    }

    /// Points evaluated by the run.
    pub fn point_range(&self) -> GridMapResult<PointRange> {
        let full = self
            .table
            .full_range()
            .ok_or_else(|| GridMapError::Config("time series table has no point".to_string()))?;
        match self.parameters.point_range {
            None => Ok(full),
            Some(range) if range.last <= full.last => Ok(range),
            Some(range) => Err(GridMapError::Config(format!(
                "point range [{}, {}] exceeds the {} points of the time series",
                range.first,
                range.last,
                self.table.point_count()
            ))),
        }
    }

    /// Points a series is checked over for constant detection.
    fn detection_range(&self, evaluated: PointRange) -> GridMapResult<PointRange> {
        match self.parameters.constant_detection_range {
            None => Ok(evaluated),
            Some(range) if range.first <= evaluated.first && evaluated.last <= range.last => {
                match self.table.full_range() {
                    Some(full) if range.last <= full.last => Ok(range),
                    _ => Err(GridMapError::Config(format!(
                        "constant detection range [{}, {}] exceeds the time series",
                        range.first, range.last
                    ))),
                }
            }
            Some(range) => Err(GridMapError::Config(format!(
                "constant detection range [{}, {}] does not cover points [{}, {}]",
                range.first, range.last, evaluated.first, evaluated.last
            ))),
        }
    }

    /// Versions evaluated by the run.
    pub fn versions(&self) -> GridMapResult<Vec<i32>> {
        let available = self.table.versions();
        if self.parameters.versions.is_empty() {
            return Ok(available);
        }
        for version in &self.parameters.versions {
            if !available.contains(version) {
                return Err(GridMapError::Config(format!(
                    "version {version} not found in time series"
                )));
            }
        }
        Ok(self.parameters.versions.clone())
    }

    pub fn run(
        &self,
        network: &mut Network,
        observers: &mut [&mut dyn MappingObserver],
        log: &mut MappingLog,
    ) -> GridMapResult<RunSummary> {
        let range = self.point_range()?;
        let detection = self.detection_range(range)?;
        let versions = self.versions()?;
        let mut observers = Observers::new(observers);
        let mut resolver = Resolver::new(self.parameters.tolerance_threshold);
        let mut summary = RunSummary {
            point_range: Some(range),
            versions: versions.clone(),
            syntheses: BTreeMap::new(),
        };

        info!(
            network = network.id(),
            versions = versions.len(),
            first = range.first,
            last = range.last,
            "mapping time series"
        );
        observers.each(network, |o, n| o.start(n))?;

        for version in versions {
            debug!(version, "version start");
            observers.each(network, |o, n| o.version_start(n, version))?;
            resolver.version_start(version);

            let plan = self.plan(version, detection);
            self.correct_base_case(network, version, log)?;

            // base case
            resolver.point_start(network, &mut observers, BASE_CASE_POINT, self.table)?;
            if plan.has_constants() {
                for group in &plan.constant_groups {
                    self.map_group(
                        network,
                        &mut observers,
                        &mut resolver,
                        log,
                        group,
                        version,
                        BASE_CASE_POINT,
                        range.first,
                    )?;
                }
                for direct in &plan.constant_direct {
                    self.map_direct(network, &mut observers, direct, version, BASE_CASE_POINT, range.first)?;
                }
            }
            let balance = self.constant_balance(network)?;
            resolver.point_end(
                network,
                &mut observers,
                log,
                BASE_CASE_POINT,
                self.table,
                balance,
            )?;

            for point in range.points() {
                let at = point_id(point)?;
                resolver.point_start(network, &mut observers, at, self.table)?;
                for group in &plan.variable_groups {
                    self.map_group(
                        network,
                        &mut observers,
                        &mut resolver,
                        log,
                        group,
                        version,
                        at,
                        point,
                    )?;
                }
                observers.each(network, |o, n| o.map_point(n, version, point, self.table))?;
                for direct in &plan.variable_direct {
                    self.map_direct(network, &mut observers, direct, version, at, point)?;
                }
                resolver.point_end(network, &mut observers, log, at, self.table, 0.0)?;
            }

            let synthesis = resolver.version_end();
            if self.parameters.emit_synthesis {
                synthesis.render(log, version, None);
            }
            summary.syntheses.insert(version, synthesis);
            observers.each(network, |o, n| o.version_end(n, version))?;
            debug!(version, "version end");
        }

        observers.each(network, |o, n| o.end(n))?;
        log.log_synthesis();
        Ok(summary)
    }

    /// Split groups and direct mappings between the base case and the points,
    /// judging constancy over `range`.
    fn plan(&self, version: i32, range: PointRange) -> Plan<'_> {
        let mut plan = Plan::default();
        if !self.parameters.identify_constant_timeseries {
            plan.variable_groups = self.index.groups().iter().map(GroupPlan::whole).collect();
            plan.variable_direct = self.index.direct_mappings().iter().collect();
            return plan;
        }

        let is_constant = |column: usize, threshold: f64| {
            self.table.std_dev(version, column, range) < threshold
        };
        let mut components: Vec<&MappingGroup> = Vec::new();
        let mut variable_components: BTreeSet<&str> = BTreeSet::new();

        for group in self.index.groups() {
            let variable = group.variable.equipment();
            let constant = !group.has_timeseries_keys()
                && !group.variable.is_power()
                && match (group.kind, variable) {
                    (EquipmentKind::Load, Some(EquipmentVariable::P0)) => {
                        is_constant(group.column, CONSTANT_GROUP_STD_DEV)
                    }
                    (EquipmentKind::Load, Some(v)) if v.is_load_active_component() => {
                        if is_constant(group.column, CONSTANT_GROUP_STD_DEV) {
                            components.push(group);
                            continue;
                        }
                        variable_components
                            .extend(group.equipments.iter().map(|e| e.equipment.id.as_str()));
                        false
                    }
                    (EquipmentKind::Load, _) => false,
                    _ => is_constant(group.column, CONSTANT_GROUP_STD_DEV),
                };
            if constant {
                debug!(timeseries = %group.timeseries, version, "constant time series");
                plan.constant_groups.push(GroupPlan::whole(group));
            } else {
                plan.variable_groups.push(GroupPlan::whole(group));
            }
        }

        for group in components {
            let (variable, constant): (Vec<usize>, Vec<usize>) = (0..group.equipments.len())
                .partition(|&i| variable_components.contains(group.equipments[i].equipment.id.as_str()));
            let (has_constant, has_variable) = (!constant.is_empty(), !variable.is_empty());
            if has_constant {
                debug!(timeseries = %group.timeseries, version, "constant time series");
                plan.constant_groups.push(if has_variable {
                    GroupPlan::part(group, constant)
                } else {
                    GroupPlan::whole(group)
                });
            }
            if has_variable {
                plan.variable_groups.push(if !has_constant {
                    GroupPlan::whole(group)
                } else {
                    GroupPlan::part(group, variable)
                });
            }
        }
        // split groups were appended, restore kind order
        plan.variable_groups.sort_by_key(|g| kind_rank(g.group.kind));

        for direct in self.index.direct_mappings() {
            if is_constant(direct.column, CONSTANT_DIRECT_STD_DEV) {
                plan.constant_direct.push(direct);
            } else {
                plan.variable_direct.push(direct);
            }
        }
        plan
    }

    fn correct_base_case(
        &self,
        network: &mut Network,
        version: i32,
        log: &mut MappingLog,
    ) -> GridMapResult<()> {
        let unmapped = self.index.unmapped();
        let widen = self.parameters.widen_limits();
        for id in &unmapped.generators {
            let limits = UnmappedLimits {
                min: unmapped.generators_min_p.contains(id),
                max: unmapped.generators_max_p.contains(id),
            };
            correct_unmapped_generator(network.generator_mut(id)?, limits, widen, version, log)?;
        }
        for id in &unmapped.hvdc_lines {
            let limits = UnmappedLimits {
                min: unmapped.hvdc_lines_min_p.contains(id),
                max: unmapped.hvdc_lines_max_p.contains(id),
            };
            correct_unmapped_hvdc_line(network.hvdc_line_mut(id)?, limits, widen, version, log)?;
        }
        Ok(())
    }

    /// Injection balance of the equipment no series drives.
    fn constant_balance(&self, network: &Network) -> GridMapResult<f64> {
        let unmapped = self.index.unmapped();
        let mut balance = 0.0;
        for id in &unmapped.generators {
            if unmapped.generators_min_p.contains(id) && unmapped.generators_max_p.contains(id) {
                balance += network.generator(id)?.state.target_p;
            }
        }
        for id in &unmapped.loads {
            balance -= network.load(id)?.state.p0;
        }
        for id in unmapped.loads_fixed_active_power.difference(&unmapped.loads) {
            balance -= network
                .load(id)?
                .state
                .detail
                .map_or(0.0, |d| d.fixed_active_power);
        }
        for id in unmapped.loads_variable_active_power.difference(&unmapped.loads) {
            balance -= network
                .load(id)?
                .state
                .detail
                .map_or(0.0, |d| d.variable_active_power);
        }
        for id in &unmapped.boundary_lines {
            balance -= network.boundary_line(id)?.p0;
        }
        Ok(balance)
    }

    /// Distribute the value of one series at `value_point` and hand the
    /// result to the resolver as point `point`.
    #[allow(clippy::too_many_arguments)]
    fn map_group(
        &self,
        network: &mut Network,
        observers: &mut Observers<'_, '_>,
        resolver: &mut Resolver,
        log: &mut MappingLog,
        plan: &GroupPlan<'_>,
        version: i32,
        point: i32,
        value_point: usize,
    ) -> GridMapResult<()> {
        let group = plan.group;
        let timeseries = group.timeseries.as_str();
        let value = self.table.value(version, group.column, value_point);
        if !value.is_finite() {
            let instant = self
                .table
                .instant(point_id(value_point)?)
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default();
            return Err(GridMapError::Mapping(format!(
                "Impossible to scale down {value} of ts {timeseries} at time index '{instant}' and version {version}"
            )));
        }
        let time = self.table.instant(point);

        let mut values = vec![0.0; group.equipments.len()];
        if value.abs() > 0.0 {
            if group.equipments.is_empty() {
                let event = LogEvent::EmptyFilter { value, timeseries };
                let message = event.render().1;
                log.record(LogLevel::Warning, version, point, time, event);
                if self.parameters.ignore_empty_filter {
                    return Ok(());
                }
                return Err(GridMapError::Mapping(message));
            }

            let mut keys: Vec<f64> = group
                .equipments
                .iter()
                .map(|e| e.key.weight(self.table, version, value_point))
                .collect();
            let mut sum: f64 = keys.iter().sum();
            if sum == 0.0 {
                keys.iter_mut().for_each(|k| *k = 1.0);
                sum = keys.len() as f64;
                let ids: Vec<String> = group
                    .equipments
                    .iter()
                    .map(|e| e.equipment.id.clone())
                    .collect();
                log.record(
                    LogLevel::Info,
                    version,
                    point,
                    time,
                    LogEvent::ZeroDistributionKey {
                        value,
                        timeseries,
                        ids: &ids,
                    },
                );
            }

            if group.kind == EquipmentKind::HvdcLine {
                let sign_problem = match group.variable {
                    MappingVariable::Equipment(EquipmentVariable::MaxP) if value < 0.0 => {
                        Some(Bound::Max)
                    }
                    MappingVariable::Equipment(EquipmentVariable::MinP) if value > 0.0 => {
                        Some(Bound::Min)
                    }
                    _ => None,
                };
                if let Some(bound) = sign_problem {
                    log.record(
                        LogLevel::Warning,
                        version,
                        point,
                        time,
                        LogEvent::Sign {
                            variable: group.variable.as_str(),
                            value,
                            timeseries,
                            bound,
                        },
                    );
                    return Ok(());
                }
            }

            for (slot, key) in values.iter_mut().zip(&keys) {
                *slot = value * key / sum;
            }
        }

        let values = match &plan.members {
            None => values,
            Some(members) => members.iter().map(|&i| values[i]).collect(),
        };
        let ignore_limits = self.parameters.widen_limits()
            || (group.variable.is_power() && self.index.ignores_limits(timeseries));
        resolver.group_mapped(
            network,
            observers,
            point,
            timeseries,
            value,
            &plan.equipments,
            group.variable,
            &values,
            ignore_limits,
        )
    }

    /// Forward one direct equipment series as-is.
    fn map_direct(
        &self,
        network: &mut Network,
        observers: &mut Observers<'_, '_>,
        direct: &DirectMapping,
        version: i32,
        point: i32,
        value_point: usize,
    ) -> GridMapResult<()> {
        let value = self.table.value(version, direct.column, value_point);
        for (equipment, variable) in &direct.targets {
            let mapped = MappedValue {
                version,
                point,
                timeseries: &direct.timeseries,
                equipment,
                variable: *variable,
                value,
            };
            observers.each(network, |o, n| o.value_mapped(n, &mapped))?;
        }
        Ok(())
    }
}

/// Build the index for `config` and run it. Configuration constants are
/// added to `table` first.
pub fn map_network(
    network: &mut Network,
    config: &MappingConfig,
    table: &mut TimeSeriesTable,
    parameters: &MapperParameters,
    observers: &mut [&mut dyn MappingObserver],
    log: &mut MappingLog,
) -> GridMapResult<RunSummary> {
    table.add_constants(&config.constants)?;
    let index = MappingIndex::build(config, network, table)?;
    TimeSeriesMapper::new(&index, table, parameters).run(network, observers, log)
}

fn point_id(point: usize) -> GridMapResult<i32> {
    i32::try_from(point).map_err(|_| GridMapError::Config(format!("point {point} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DistributionKeySpec, EquipmentEntry, MappingSpec, ResolutionPolicy,
    };
    use chrono::{DateTime, Utc};
    use gridmap_core::{ConvertersMode, Generator, HvdcLine, Load};

    /// Applies every value to the working variant and remembers it.
    #[derive(Default)]
    struct Applier {
        values: Vec<(i32, String, String, f64)>,
        point_ends: Vec<(i32, f64)>,
    }

    impl MappingObserver for Applier {
        fn value_mapped(&mut self, network: &mut Network, value: &MappedValue<'_>) -> GridMapResult<()> {
            if let Some(variable) = value.variable.equipment() {
                network.equipment_mut(value.equipment)?.apply(variable, value.value)?;
            }
            self.values.push((
                value.point,
                value.equipment.id.clone(),
                value.variable.as_str().to_string(),
                value.value,
            ));
            Ok(())
        }

        fn point_end(
            &mut self,
            _network: &mut Network,
            point: i32,
            _table: &TimeSeriesTable,
            balance: f64,
        ) -> GridMapResult<()> {
            self.point_ends.push((point, balance));
            Ok(())
        }
    }

    fn instants(n: usize) -> Vec<DateTime<Utc>> {
        let start: DateTime<Utc> = "2015-01-01T00:00:00Z".parse().unwrap();
        (0..n).map(|i| start + chrono::Duration::hours(i as i64)).collect()
    }

    fn spec(timeseries: &str, kind: EquipmentKind, variable: Option<&str>, ids: &[&str]) -> MappingSpec {
        MappingSpec {
            timeseries: timeseries.to_string(),
            kind,
            variable: variable.map(|v| v.parse().unwrap()),
            equipments: ids.iter().map(|id| EquipmentEntry::Id(id.to_string())).collect(),
        }
    }

    fn run(
        network: &mut Network,
        config: &MappingConfig,
        table: &mut TimeSeriesTable,
        parameters: &MapperParameters,
    ) -> (Applier, MappingLog, GridMapResult<RunSummary>) {
        let mut applier = Applier::default();
        let mut log = MappingLog::new();
        let result = {
            let mut observers: [&mut dyn MappingObserver; 1] = [&mut applier];
            map_network(network, config, table, parameters, &mut observers, &mut log)
        };
        (applier, log, result)
    }

    #[test]
    fn zero_keys_fall_back_to_uniform_distribution() {
        let mut network = Network::new("n");
        network.add_load(Load::new("L1", 10.0)).unwrap();
        network.add_load(Load::new("L2", 10.0)).unwrap();
        let mut table = TimeSeriesTable::new(instants(2));
        table.add_series("demand", 1, vec![300.0, 200.0]).unwrap();
        let config = MappingConfig {
            mappings: vec![MappingSpec {
                timeseries: "demand".into(),
                kind: EquipmentKind::Load,
                variable: None,
                equipments: vec![
                    EquipmentEntry::Weighted {
                        id: "L1".into(),
                        key: DistributionKeySpec::Number(0.0),
                    },
                    EquipmentEntry::Weighted {
                        id: "L2".into(),
                        key: DistributionKeySpec::Number(0.0),
                    },
                ],
            }],
            ..Default::default()
        };
        let (applier, log, result) = run(&mut network, &config, &mut table, &MapperParameters::default());
        result.unwrap();

        let first: Vec<f64> = applier
            .values
            .iter()
            .filter(|(p, ..)| *p == 0)
            .map(|(.., v)| *v)
            .collect();
        assert_eq!(first, vec![150.0, 150.0]);
        let zero_key = log
            .entries()
            .iter()
            .find(|e| e.label == "zero distribution key warning")
            .unwrap();
        assert_eq!(zero_key.level, LogLevel::Info);
        assert!(zero_key.message.contains("[L1, L2]"));
    }

    #[test]
    fn distribution_follows_keys() {
        let mut network = Network::new("n");
        for id in ["G1", "G2", "G3"] {
            network.add_generator(Generator::new(id, 0.0, 1000.0, 0.0)).unwrap();
        }
        let mut table = TimeSeriesTable::new(instants(3));
        table.add_series("wind", 1, vec![60.0, 120.0, 7.0]).unwrap();
        table.add_series("share", 1, vec![1.0, 2.0, -1.0]).unwrap();
        let config = MappingConfig {
            mappings: vec![MappingSpec {
                timeseries: "wind".into(),
                kind: EquipmentKind::Generator,
                variable: None,
                equipments: vec![
                    EquipmentEntry::Id("G1".into()),
                    EquipmentEntry::Weighted {
                        id: "G2".into(),
                        key: DistributionKeySpec::Number(2.0),
                    },
                    EquipmentEntry::Weighted {
                        id: "G3".into(),
                        key: DistributionKeySpec::TimeSeries("share".into()),
                    },
                ],
            }],
            ..Default::default()
        };
        let (applier, _, result) = run(&mut network, &config, &mut table, &MapperParameters::default());
        result.unwrap();

        for (point, total) in [(0, 60.0), (1, 120.0), (2, 7.0)] {
            let sum: f64 = applier
                .values
                .iter()
                .filter(|(p, ..)| *p == point)
                .map(|(.., v)| *v)
                .sum();
            assert!((sum - total).abs() < 1e-9, "point {point}: {sum}");
        }
        // key of G3 is |share| = 2 at point 1
        let g3 = applier
            .values
            .iter()
            .find(|(p, id, ..)| *p == 1 && id == "G3")
            .unwrap();
        assert!((g3.3 - 48.0).abs() < 1e-9);
    }

    #[test]
    fn unmapped_generator_below_min_is_only_reported() {
        let mut network = Network::new("n");
        network.add_generator(Generator::new("G1", 100.0, 200.0, 50.0)).unwrap();
        network.add_generator(Generator::new("G2", 0.0, 200.0, 50.0)).unwrap();
        let mut table = TimeSeriesTable::new(instants(1));
        table.add_series("zero", 1, vec![0.0]).unwrap();
        let config = MappingConfig {
            mappings: vec![spec("zero", EquipmentKind::Generator, None, &["G2"])],
            ..Default::default()
        };
        let (_, log, result) = run(&mut network, &config, &mut table, &MapperParameters::default());
        result.unwrap();

        let entry = log
            .entries()
            .iter()
            .find(|e| e.label.ends_with("base case minP violated by base case targetP"))
            .unwrap();
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.point, BASE_CASE_POINT);
        assert_eq!(network.generator("G1").unwrap().min_p, 100.0);
    }

    #[test]
    fn mapped_zero_below_min_is_reported_in_synthesis() {
        let mut network = Network::new("n");
        network.add_generator(Generator::new("G1", 100.0, 200.0, 150.0)).unwrap();
        let mut table = TimeSeriesTable::new(instants(2));
        table.add_series("low", 1, vec![0.0, 10.0]).unwrap();
        let config = MappingConfig {
            mappings: vec![spec("low", EquipmentKind::Generator, None, &["G1"])],
            ..Default::default()
        };
        let (applier, log, result) = run(&mut network, &config, &mut table, &MapperParameters::default());
        let summary = result.unwrap();

        // targetP kept, minP untouched
        let targets: Vec<f64> = applier.values.iter().map(|(.., v)| *v).collect();
        assert_eq!(targets, vec![0.0, 10.0]);
        assert_eq!(network.generator("G1").unwrap().min_p, 100.0);
        assert!(log.entries().iter().any(|e| e.label
            == "scaling down / base case minP violated by mapped targetP / TS synthesis"
            && e.level == LogLevel::Info));
        assert!(!summary.syntheses[&1].is_empty());
    }

    #[test]
    fn negative_hvdc_setpoint_flips_converters() {
        let mut network = Network::new("n");
        network.add_hvdc_line(HvdcLine::new("H1", 200.0, 10.0)).unwrap();
        let mut table = TimeSeriesTable::new(instants(1));
        table.add_series("flow", 1, vec![-150.0]).unwrap();
        let config = MappingConfig {
            mappings: vec![spec("flow", EquipmentKind::HvdcLine, None, &["H1"])],
            ..Default::default()
        };
        let (_, _, result) = run(&mut network, &config, &mut table, &MapperParameters::default());
        result.unwrap();

        let line = network.hvdc_line("H1").unwrap();
        assert_eq!(
            line.state.converters_mode,
            ConvertersMode::Side1InverterSide2Rectifier
        );
        assert_eq!(line.state.active_power_setpoint, 150.0);
    }

    #[test]
    fn p0_then_fixed_component_creates_decomposition() {
        let mut network = Network::new("n");
        network.add_load(Load::new("L1", 80.0)).unwrap();
        let mut table = TimeSeriesTable::new(instants(2));
        table.add_series("total", 1, vec![100.0, 110.0]).unwrap();
        table.add_series("fixed", 1, vec![30.0, 40.0]).unwrap();
        let config = MappingConfig {
            mappings: vec![
                spec("total", EquipmentKind::Load, Some("p0"), &["L1"]),
                spec("fixed", EquipmentKind::Load, Some("fixedActivePower"), &["L1"]),
            ],
            ..Default::default()
        };
        let (_, _, result) = run(&mut network, &config, &mut table, &MapperParameters::default());
        result.unwrap();

        let load = network.load("L1").unwrap();
        let detail = load.state.detail.unwrap();
        assert_eq!(detail.fixed_active_power, 40.0);
        assert_eq!(detail.variable_active_power, 0.0);
        assert_eq!(load.state.p0, 40.0);
    }

    #[test]
    fn empty_filter_fails_unless_ignored() {
        let mut network = Network::new("n");
        network.add_generator(Generator::new("G1", 0.0, 100.0, 0.0)).unwrap();
        let mut table = TimeSeriesTable::new(instants(2));
        table.add_series("orphan", 1, vec![5.0, 6.0]).unwrap();
        let config = MappingConfig {
            mappings: vec![spec("orphan", EquipmentKind::Generator, None, &[])],
            ..Default::default()
        };

        let (_, log, result) = run(&mut network, &config, &mut table.clone(), &MapperParameters::default());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("to empty equipment list"));
        assert_eq!(log.entries()[0].label, "empty filter error");

        let parameters = MapperParameters {
            ignore_empty_filter: true,
            ..Default::default()
        };
        let (_, log, result) = run(&mut network, &config, &mut table, &parameters);
        result.unwrap();
        assert_eq!(log.entries()[0].level, LogLevel::Warning);
        assert_eq!(log.entries()[0].point, 0);
    }

    #[test]
    fn negative_hvdc_max_is_a_sign_problem() {
        let mut network = Network::new("n");
        network.add_hvdc_line(HvdcLine::new("H1", 200.0, 10.0)).unwrap();
        let mut table = TimeSeriesTable::new(instants(2));
        table.add_series("cap", 1, vec![-50.0, 80.0]).unwrap();
        let config = MappingConfig {
            mappings: vec![spec("cap", EquipmentKind::HvdcLine, Some("maxP"), &["H1"])],
            ..Default::default()
        };
        let (applier, log, result) = run(&mut network, &config, &mut table, &MapperParameters::default());
        result.unwrap();

        let sign = log
            .entries()
            .iter()
            .find(|e| e.label == "mapping sign problem / ")
            .unwrap();
        assert_eq!(sign.point, 0);
        assert!(!applier
            .values
            .iter()
            .any(|(p, _, var, _)| *p == 0 && var == "maxP"));
        assert!(applier
            .values
            .iter()
            .any(|(p, _, var, v)| *p == 1 && var == "maxP" && *v == 80.0));
    }

    #[test]
    fn non_finite_value_is_a_mapping_error() {
        let mut network = Network::new("n");
        network.add_generator(Generator::new("G1", 0.0, 100.0, 0.0)).unwrap();
        let mut table = TimeSeriesTable::new(instants(2));
        table.add_series("wind", 1, vec![1.0, f64::NAN]).unwrap();
        let config = MappingConfig {
            mappings: vec![spec("wind", EquipmentKind::Generator, None, &["G1"])],
            ..Default::default()
        };
        let (_, _, result) = run(&mut network, &config, &mut table, &MapperParameters::default());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Impossible to scale down NaN of ts wind"));
        assert!(err.contains("2015-01-01T01:00:00Z"));
    }

    #[test]
    fn constant_series_are_mapped_once_at_base_case() {
        let mut network = Network::new("n");
        network.add_load(Load::new("L1", 10.0)).unwrap();
        network.add_load(Load::new("L2", 20.0)).unwrap();
        network.add_generator(Generator::new("G1", 0.0, 500.0, 100.0)).unwrap();
        let mut table = TimeSeriesTable::new(instants(3));
        table.add_series("flat", 1, vec![40.0, 40.0, 40.0]).unwrap();
        let config = MappingConfig {
            mappings: vec![spec("flat", EquipmentKind::Load, None, &["L1"])],
            ..Default::default()
        };
        let (applier, _, result) = run(&mut network, &config, &mut table, &MapperParameters::default());
        result.unwrap();

        let points: Vec<i32> = applier.values.iter().map(|(p, ..)| *p).collect();
        assert_eq!(points, vec![BASE_CASE_POINT]);
        // G1 fully unmapped, L2 unmapped
        assert_eq!(applier.point_ends[0], (BASE_CASE_POINT, 80.0));
        assert!(applier.point_ends[1..].iter().all(|(_, b)| *b == 0.0));
    }

    #[test]
    fn component_constant_only_when_no_sibling_is_variable() {
        let mut network = Network::new("n");
        network.add_load(Load::new("L1", 0.0)).unwrap();
        network.add_load(Load::new("L2", 0.0)).unwrap();
        let mut table = TimeSeriesTable::new(instants(2));
        table.add_series("fixed", 1, vec![10.0, 10.0]).unwrap();
        table.add_series("var", 1, vec![1.0, 2.0]).unwrap();
        let config = MappingConfig {
            mappings: vec![
                spec("fixed", EquipmentKind::Load, Some("fixedActivePower"), &["L1", "L2"]),
                spec("var", EquipmentKind::Load, Some("variableActivePower"), &["L2"]),
            ],
            ..Default::default()
        };
        let (applier, _, result) = run(&mut network, &config, &mut table, &MapperParameters::default());
        result.unwrap();

        let fixed: Vec<(i32, &str, f64)> = applier
            .values
            .iter()
            .filter(|(_, _, var, _)| var == "fixedActivePower")
            .map(|(p, id, _, v)| (*p, id.as_str(), *v))
            .collect();
        assert_eq!(
            fixed,
            vec![(BASE_CASE_POINT, "L1", 5.0), (0, "L2", 5.0), (1, "L2", 5.0)]
        );
    }

    #[test]
    fn rerun_is_idempotent() {
        let build = || {
            let mut network = Network::new("n");
            network.add_generator(Generator::new("G1", 0.0, 100.0, 0.0)).unwrap();
            network.add_generator(Generator::new("G2", 0.0, 50.0, 0.0)).unwrap();
            network
        };
        let mut table = TimeSeriesTable::new(instants(3));
        table.add_series("wind", 1, vec![80.0, 200.0, 120.0]).unwrap();
        let config = MappingConfig {
            mappings: vec![spec("wind", EquipmentKind::Generator, None, &["G1", "G2"])],
            ..Default::default()
        };

        let (first, first_log, _) = run(&mut build(), &config, &mut table.clone(), &MapperParameters::default());
        let (second, second_log, _) = run(&mut build(), &config, &mut table, &MapperParameters::default());
        assert_eq!(first.values, second.values);
        assert_eq!(first_log.entries(), second_log.entries());
        assert!(!first_log.is_empty());
    }

    #[test]
    fn widen_policy_keeps_mapped_values() {
        let mut network = Network::new("n");
        network.add_generator(Generator::new("G1", 0.0, 100.0, 0.0)).unwrap();
        let mut table = TimeSeriesTable::new(instants(2));
        table.add_series("wind", 1, vec![150.0, 120.0]).unwrap();
        let config = MappingConfig {
            mappings: vec![spec("wind", EquipmentKind::Generator, None, &["G1"])],
            ..Default::default()
        };
        let parameters = MapperParameters {
            policy: ResolutionPolicy::WidenLimits,
            ..Default::default()
        };
        let (applier, log, result) = run(&mut network, &config, &mut table, &parameters);
        let summary = result.unwrap();

        let targets: Vec<f64> = applier.values.iter().map(|(.., v)| *v).collect();
        assert_eq!(targets, vec![150.0, 120.0]);
        let change = summary.syntheses[&1]
            .limits
            .get(&(crate::synthesis::LimitTarget::GeneratorMaxP, "G1".to_string()))
            .unwrap();
        assert_eq!(change.limit, 150.0);
        assert_eq!(change.violations, 2);
        assert!(log.entries().iter().any(|e| e.message
            == "maxP of G1 lower than targetP for 2 variants, maxP increased from 100 to 150"));
    }

    #[test]
    fn constant_detection_over_a_wider_range() {
        let mut network = Network::new("n");
        network.add_load(Load::new("L1", 10.0)).unwrap();
        let mut table = TimeSeriesTable::new(instants(4));
        table.add_series("demand", 1, vec![40.0, 40.0, 55.0, 60.0]).unwrap();
        let config = MappingConfig {
            mappings: vec![spec("demand", EquipmentKind::Load, None, &["L1"])],
            ..Default::default()
        };
        let parameters = MapperParameters {
            point_range: Some(PointRange::new(0, 1).unwrap()),
            constant_detection_range: Some(PointRange::new(0, 3).unwrap()),
            ..Default::default()
        };
        let (applier, _, result) = run(&mut network, &config, &mut table.clone(), &parameters);
        result.unwrap();
        let points: Vec<i32> = applier.values.iter().map(|(p, ..)| *p).collect();
        assert_eq!(points, vec![0, 1]);

        let parameters = MapperParameters {
            point_range: Some(PointRange::new(0, 3).unwrap()),
            constant_detection_range: Some(PointRange::new(0, 1).unwrap()),
            ..Default::default()
        };
        let (_, _, result) = run(&mut network, &config, &mut table, &parameters);
        assert!(result.unwrap_err().is_config());
    }

    #[test]
    fn point_range_outside_table_is_rejected() {
        let mut network = Network::new("n");
        network.add_generator(Generator::new("G1", 0.0, 100.0, 0.0)).unwrap();
        let mut table = TimeSeriesTable::new(instants(2));
        table.add_series("wind", 1, vec![1.0, 2.0]).unwrap();
        let parameters = MapperParameters {
            point_range: Some(PointRange::new(0, 5).unwrap()),
            ..Default::default()
        };
        let (_, _, result) = run(&mut network, &MappingConfig::default(), &mut table, &parameters);
        assert!(result.unwrap_err().is_config());
    }
}
