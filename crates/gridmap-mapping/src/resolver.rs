//! Limit & sign resolver.
//!
//! Sits between the evaluator and the observers. Non-power values pass
//! straight through. Generator targetP and HVDC set points are held until the
//! end of the point, then checked against their (mapped or network) limits
//! and either clipped (scaling down) or kept with the limit widened, before
//! observers hear about them.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use gridmap_core::{
    EquipmentKind, EquipmentRef, EquipmentVariable, GridMapError, GridMapResult, MappingVariable,
    Network,
};
use tracing::debug;

use crate::index::MappedEquipment;
use crate::log::{LogEvent, LogLevel, MappingLog, Scope, BASE_CASE_POINT};
use crate::observer::{MappedValue, Observers};
use crate::synthesis::{
    LimitChange, LimitTarget, PowerKind, ScalingDownLimitViolation, ScalingDownPowerChange,
    ScalingDownRecord, VersionSynthesis, MAX_P, MIN_P, SETPOINT, TARGET_P,
};
use crate::timeseries::TimeSeriesTable;

/// Power and limits mapped onto one generator or HVDC line during a point.
#[derive(Debug, Clone, Default, PartialEq)]
struct MappedPower {
    min: Option<f64>,
    max: Option<f64>,
    p: Option<f64>,
    timeseries: Option<String>,
    ignore_limits: bool,
}

/// Equipment one power series was distributed over at the current point.
#[derive(Debug, Clone)]
struct MappedEquipments {
    value: f64,
    equipments: BTreeSet<EquipmentRef>,
    record: ScalingDownRecord,
}

/// Limits and flags of the equipment being corrected.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    min: f64,
    max: f64,
    mapped_min: bool,
    mapped_max: bool,
    ok_min: bool,
    ok_max: bool,
    ignore_limits: bool,
}

impl Bounds {
    fn new(power: &MappedPower, min: f64, max: f64, value: f64, tolerance: f64) -> Self {
        Self {
            min,
            max,
            mapped_min: power.min.is_some(),
            mapped_max: power.max.is_some(),
            ok_min: value >= min - tolerance,
            ok_max: value <= max + tolerance,
            ignore_limits: power.ignore_limits,
        }
    }

    /// Move a mapped value sitting on a bound just inside it.
    fn pull_inside(&self, mapped: bool, value: f64, tolerance: f64) -> f64 {
        if self.ignore_limits || !mapped {
            return value;
        }
        if self.ok_max && value >= self.max - tolerance {
            self.max - tolerance
        } else if self.ok_min && value <= self.min + tolerance {
            self.min + tolerance
        } else {
            value
        }
    }
}

/// Where and when the current point is, for log entries.
#[derive(Debug, Clone, Copy)]
struct PointContext {
    version: i32,
    point: i32,
    time: Option<DateTime<Utc>>,
}

pub(crate) struct Resolver {
    tolerance: f64,
    version: i32,
    /// Whether each HVDC line had an operator range when first mapped.
    hvdc_ranges: HashMap<String, bool>,
    constant_powers: BTreeMap<EquipmentRef, MappedPower>,
    powers: BTreeMap<EquipmentRef, MappedPower>,
    mapped: BTreeMap<(PowerKind, String), MappedEquipments>,
    synthesis: VersionSynthesis,
}

impl Resolver {
    pub(crate) fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            version: 0,
            hvdc_ranges: HashMap::new(),
            constant_powers: BTreeMap::new(),
            powers: BTreeMap::new(),
            mapped: BTreeMap::new(),
            synthesis: VersionSynthesis::default(),
        }
    }

    pub(crate) fn version_start(&mut self, version: i32) {
        self.version = version;
        self.constant_powers.clear();
        self.powers.clear();
        self.mapped.clear();
        self.synthesis = VersionSynthesis::default();
    }

    /// Re-apply the limits widened earlier in the version, then seed the point
    /// with the powers mapped by constant series.
    pub(crate) fn point_start(
        &mut self,
        network: &mut Network,
        observers: &mut Observers<'_, '_>,
        point: i32,
        table: &TimeSeriesTable,
    ) -> GridMapResult<()> {
        for ((target, id), change) in self.synthesis.widened_limits() {
            let limit = change.limit;
            match target {
                LimitTarget::GeneratorMaxP => network.generator_mut(id)?.max_p = limit,
                LimitTarget::GeneratorMinP => network.generator_mut(id)?.min_p = limit,
                LimitTarget::HvdcMaxP => network.hvdc_line_mut(id)?.max_p = limit,
                LimitTarget::HvdcMinP => network.hvdc_line_mut(id)?.max_p = limit.abs(),
                LimitTarget::HvdcCs1ToCs2 => {
                    network.hvdc_line_mut(id)?.ensure_power_range().cs1_to_cs2 = limit
                }
                LimitTarget::HvdcCs2ToCs1 => {
                    network.hvdc_line_mut(id)?.ensure_power_range().cs2_to_cs1 = limit.abs()
                }
            }
        }

        observers.each(network, |o, n| o.point_start(n, point, table))?;

        if point != BASE_CASE_POINT {
            self.powers = self.constant_powers.clone();
        }
        Ok(())
    }

    /// Take the values one series produced for its equipment.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn group_mapped(
        &mut self,
        network: &mut Network,
        observers: &mut Observers<'_, '_>,
        point: i32,
        timeseries: &str,
        timeseries_value: f64,
        equipments: &[MappedEquipment],
        variable: MappingVariable,
        values: &[f64],
        ignore_limits: bool,
    ) -> GridMapResult<()> {
        let power_kind = match variable.equipment() {
            Some(EquipmentVariable::TargetP) => Some(PowerKind::TargetP),
            Some(EquipmentVariable::ActivePowerSetpoint) => Some(PowerKind::Setpoint),
            _ => None,
        };
        if let Some(kind) = power_kind {
            self.mapped.insert(
                (kind, timeseries.to_string()),
                MappedEquipments {
                    value: timeseries_value,
                    equipments: equipments.iter().map(|e| e.equipment.clone()).collect(),
                    record: ScalingDownRecord::default(),
                },
            );
        }

        for (mapped, &value) in equipments.iter().zip(values) {
            let equipment = &mapped.equipment;
            if variable.is_power_or_limit() {
                let powers = if point == BASE_CASE_POINT {
                    &mut self.constant_powers
                } else {
                    &mut self.powers
                };
                let power = powers.entry(equipment.clone()).or_default();
                power.ignore_limits = ignore_limits;
                match variable.equipment() {
                    Some(EquipmentVariable::MinP) => power.min = Some(value),
                    Some(EquipmentVariable::MaxP) => power.max = Some(value),
                    _ => {
                        power.timeseries = Some(timeseries.to_string());
                        power.p = Some(value);
                    }
                }
            }

            if equipment.kind == EquipmentKind::HvdcLine && !self.hvdc_ranges.contains_key(&equipment.id) {
                let has_range = network.hvdc_line(&equipment.id)?.power_range.is_some();
                self.hvdc_ranges.insert(equipment.id.clone(), has_range);
            }

            if !variable.is_power() {
                let mapped_value = MappedValue {
                    version: self.version,
                    point,
                    timeseries,
                    equipment,
                    variable,
                    value,
                };
                observers.each(network, |o, n| o.value_mapped(n, &mapped_value))?;
            }
        }
        Ok(())
    }

    /// Correct and announce every held power, log the scaling down of the
    /// point, then close the point for the observers.
    pub(crate) fn point_end(
        &mut self,
        network: &mut Network,
        observers: &mut Observers<'_, '_>,
        log: &mut MappingLog,
        point: i32,
        table: &TimeSeriesTable,
        balance: f64,
    ) -> GridMapResult<()> {
        let context = PointContext {
            version: self.version,
            point,
            time: table.instant(point),
        };
        let mut powers = std::mem::take(&mut self.powers);
        for (equipment, power) in powers.iter_mut() {
            let (value, variable) = match equipment.kind {
                EquipmentKind::Generator => (
                    self.correct_generator(network, context, &equipment.id, power, log)?,
                    EquipmentVariable::TargetP,
                ),
                EquipmentKind::HvdcLine => (
                    self.correct_hvdc_line(network, context, &equipment.id, power, log)?,
                    EquipmentVariable::ActivePowerSetpoint,
                ),
                kind => {
                    return Err(GridMapError::Mapping(format!(
                        "unsupported equipment type {kind} for id {}",
                        equipment.id
                    )))
                }
            };
            power.p = Some(value);
            let mapped_value = MappedValue {
                version: self.version,
                point,
                timeseries: power.timeseries.as_deref().unwrap_or(""),
                equipment,
                variable: variable.into(),
                value,
            };
            observers.each(network, |o, n| o.value_mapped(n, &mapped_value))?;
        }

        let mapped = std::mem::take(&mut self.mapped);
        for ((kind, timeseries), entry) in &mapped {
            if !entry.record.changes.is_empty() {
                let sum: f64 = entry
                    .equipments
                    .iter()
                    .map(|e| match powers.get(e).and_then(|p| p.p) {
                        Some(p) => Ok(p),
                        None => network_power(network, e),
                    })
                    .sum::<GridMapResult<f64>>()?;
                for change in &entry.record.changes {
                    log.record(
                        LogLevel::Warning,
                        context.version,
                        point,
                        context.time,
                        change.event(kind.name(), timeseries, Some(entry.value), Some(sum)),
                    );
                }
            }
            if !entry.record.is_empty() {
                self.synthesis
                    .add_scaling_down(*kind, timeseries, &entry.record);
            }
        }

        observers.each(network, |o, n| o.point_end(n, point, table, balance))
    }

    /// Hand over the version's synthesis and forget the version state.
    pub(crate) fn version_end(&mut self) -> VersionSynthesis {
        self.constant_powers.clear();
        self.powers.clear();
        self.mapped.clear();
        std::mem::take(&mut self.synthesis)
    }

    fn record_for(&mut self, kind: PowerKind, timeseries: Option<&str>) -> Option<&mut ScalingDownRecord> {
        let timeseries = timeseries?;
        self.mapped
            .get_mut(&(kind, timeseries.to_string()))
            .map(|m| &mut m.record)
    }

    fn add_change(&mut self, kind: PowerKind, timeseries: Option<&str>, change: ScalingDownPowerChange) {
        if let Some(record) = self.record_for(kind, timeseries) {
            record.changes.insert(change);
        }
    }

    fn add_violation(
        &mut self,
        kind: PowerKind,
        timeseries: Option<&str>,
        violation: ScalingDownLimitViolation,
    ) {
        if let Some(record) = self.record_for(kind, timeseries) {
            record.violations.insert(violation);
        }
    }

    fn track_limit(&mut self, target: LimitTarget, id: &str, current: f64, value: f64) {
        self.synthesis
            .limits
            .entry((target, id.to_string()))
            .or_insert_with(|| LimitChange::new(current))
            .record(target.bound(), current, value, self.tolerance);
    }

    fn base_case_limit(&self, target: LimitTarget, id: &str) -> Option<f64> {
        self.synthesis
            .limits
            .get(&(target, id.to_string()))
            .map(|c| c.base_case_limit)
    }

    fn correct_generator(
        &mut self,
        network: &mut Network,
        context: PointContext,
        id: &str,
        power: &MappedPower,
        log: &mut MappingLog,
    ) -> GridMapResult<f64> {
        let generator = network.generator_mut(id)?;
        let min = power.min.unwrap_or(generator.min_p);
        let max = power.max.unwrap_or(generator.max_p);
        if min > max {
            return Err(GridMapError::Mapping(format!(
                "Equipment '{id}' : invalid active limits [{min}, {max}] at point {}",
                context.point
            )));
        }
        let mapped_target = power.p.is_some();
        let raw = power.p.unwrap_or(generator.state.target_p);
        let bounds = Bounds::new(power, min, max, raw, self.tolerance);
        let target = bounds.pull_inside(mapped_target, raw, self.tolerance);
        let ts = power.timeseries.as_deref();

        if bounds.ignore_limits && mapped_target {
            if !bounds.mapped_max {
                let current = generator.max_p;
                self.track_limit(LimitTarget::GeneratorMaxP, id, current, target);
            }
            if !bounds.mapped_min && min <= 0.0 {
                let current = generator.min_p;
                self.track_limit(LimitTarget::GeneratorMinP, id, current, target);
            }
        }

        if !mapped_target {
            let result = correct_unmapped_power(&bounds, context, id, target, TARGET_P, false, log);
            if !result.is_nan() {
                return Ok(result);
            }
        }

        if bounds.ignore_limits {
            use ScalingDownLimitViolation as V;
            use ScalingDownPowerChange as C;
            if !bounds.ok_max && !bounds.mapped_max {
                generator.max_p = (target + 1.0).floor();
                self.add_violation(PowerKind::TargetP, ts, V::MaxPByTargetP);
                return Ok(target);
            } else if !bounds.ok_max {
                self.add_change(PowerKind::TargetP, ts, C::MappedMaxPDisabled);
                return Ok(max);
            } else if !bounds.ok_min && min <= 0.0 && !bounds.mapped_min {
                generator.min_p = (target - 0.5).floor();
                self.add_violation(PowerKind::TargetP, ts, V::MinPByTargetP);
                return Ok(target);
            } else if !bounds.ok_min && min <= 0.0 {
                self.add_change(PowerKind::TargetP, ts, C::MappedMinPDisabled);
                return Ok(min);
            } else if !bounds.ok_min && target < 0.0 {
                self.add_change(PowerKind::TargetP, ts, C::ZeroDisabled);
                return Ok(0.0);
            }
        }

        let clipped = if !bounds.ok_max {
            Some((
                if bounds.mapped_max {
                    ScalingDownPowerChange::MappedMaxP
                } else {
                    ScalingDownPowerChange::BaseCaseMaxP
                },
                max,
            ))
        } else if !bounds.ok_min && min <= 0.0 {
            Some((
                if bounds.mapped_min {
                    ScalingDownPowerChange::MappedMinP
                } else {
                    ScalingDownPowerChange::BaseCaseMinP
                },
                min,
            ))
        } else if !bounds.ok_min && target < 0.0 {
            Some((ScalingDownPowerChange::Zero, 0.0))
        } else {
            None
        };
        if let Some((change, value)) = clipped {
            self.add_change(PowerKind::TargetP, ts, change);
            return Ok(value);
        }
        if !bounds.ok_min {
            let violation = if bounds.mapped_min {
                ScalingDownLimitViolation::MappedMinPByTargetP
            } else {
                ScalingDownLimitViolation::BaseCaseMinPByTargetP
            };
            self.add_violation(PowerKind::TargetP, ts, violation);
            return Ok(target);
        }
        Ok(if mapped_target { target } else { f64::NAN })
    }

    fn correct_hvdc_line(
        &mut self,
        network: &mut Network,
        context: PointContext,
        id: &str,
        power: &MappedPower,
        log: &mut MappingLog,
    ) -> GridMapResult<f64> {
        let line = network.hvdc_line_mut(id)?;
        let min = power.min.unwrap_or(line.min());
        let max = power.max.unwrap_or(line.max());
        let mapped_setpoint = power.p.is_some();
        let is_range = self
            .hvdc_ranges
            .get(id)
            .copied()
            .unwrap_or(line.power_range.is_some());
        let raw = power.p.unwrap_or(line.setpoint());
        let bounds = Bounds::new(power, min, max, raw, self.tolerance);
        let setpoint = bounds.pull_inside(mapped_setpoint, raw, self.tolerance);
        let ts = power.timeseries.as_deref();

        if line.max_p < 0.0 {
            return Err(GridMapError::Mapping(format!(
                "Equipment '{id}' : invalid active limit maxP {} at point {}",
                line.max_p, context.point
            )));
        }
        if is_range && (min > 0.0 || max < 0.0) {
            return Err(GridMapError::Mapping(format!(
                "Equipment '{id}' : invalid active limits [{min}, {max}] at point {}",
                context.point
            )));
        }

        if bounds.ignore_limits && mapped_setpoint {
            let (max_target, min_target) = if is_range {
                (LimitTarget::HvdcCs1ToCs2, LimitTarget::HvdcCs2ToCs1)
            } else {
                (LimitTarget::HvdcMaxP, LimitTarget::HvdcMinP)
            };
            let (current_max, current_min) = (line.max(), line.min());
            if !bounds.mapped_max {
                self.track_limit(max_target, id, current_max, setpoint);
            }
            if !bounds.mapped_min {
                self.track_limit(min_target, id, current_min, setpoint);
            }
        }

        if !mapped_setpoint {
            let result = correct_unmapped_power(&bounds, context, id, setpoint, SETPOINT, true, log);
            if !result.is_nan() {
                return Ok(result);
            }
        }

        if bounds.ignore_limits {
            use ScalingDownLimitViolation as V;
            let round = (setpoint.abs() + 1.0).floor();
            if !bounds.ok_max && !bounds.mapped_max {
                let opposite = self.base_case_limit(LimitTarget::HvdcMinP, id);
                let range = line.ensure_power_range();
                if !is_range {
                    if let Some(base) = opposite {
                        range.cs1_to_cs2 = base.abs();
                    }
                }
                line.set_max(round);
                let violation = if is_range {
                    V::Cs1ToCs2ByActivePower
                } else {
                    V::MaxPByActivePower
                };
                self.add_violation(PowerKind::Setpoint, ts, violation);
                return Ok(setpoint);
            } else if !bounds.ok_max {
                self.add_change(PowerKind::Setpoint, ts, ScalingDownPowerChange::MappedMaxPDisabled);
                return Ok(max);
            } else if !bounds.ok_min && !bounds.mapped_min {
                let opposite = self.base_case_limit(LimitTarget::HvdcMaxP, id);
                let range = line.ensure_power_range();
                if !is_range {
                    if let Some(base) = opposite {
                        range.cs2_to_cs1 = base.abs();
                    }
                }
                line.set_min(round);
                let violation = if is_range {
                    V::Cs2ToCs1ByActivePower
                } else {
                    V::MinPByActivePower
                };
                self.add_violation(PowerKind::Setpoint, ts, violation);
                return Ok(setpoint);
            } else if !bounds.ok_min {
                self.add_change(PowerKind::Setpoint, ts, ScalingDownPowerChange::MappedMinPDisabled);
                return Ok(min);
            }
        }

        use ScalingDownPowerChange as C;
        let clipped = if !bounds.ok_max && bounds.mapped_max {
            Some((C::MappedMaxP, max))
        } else if !bounds.ok_max {
            Some((if is_range { C::BaseCaseCs1ToCs2 } else { C::BaseCaseMaxP }, max))
        } else if !bounds.ok_min && bounds.mapped_min {
            Some((C::MappedMinP, min))
        } else if !bounds.ok_min {
            Some((if is_range { C::BaseCaseCs2ToCs1 } else { C::BaseCaseMinusMaxP }, min))
        } else {
            None
        };
        if let Some((change, value)) = clipped {
            self.add_change(PowerKind::Setpoint, ts, change);
            return Ok(value);
        }
        Ok(if mapped_setpoint { setpoint } else { f64::NAN })
    }
}

/// Current network power of a generator or HVDC line.
fn network_power(network: &Network, equipment: &EquipmentRef) -> GridMapResult<f64> {
    let variable = match equipment.kind {
        EquipmentKind::HvdcLine => EquipmentVariable::ActivePowerSetpoint,
        _ => EquipmentVariable::TargetP,
    };
    network
        .equipment(equipment)?
        .value(variable)
        .ok_or_else(|| GridMapError::Network(format!("'{}' carries no active power", equipment.id)))
}

/// A power that was not mapped but whose mapped limits no longer contain it.
/// Returns the corrected value, or NaN when nothing had to change.
fn correct_unmapped_power(
    bounds: &Bounds,
    context: PointContext,
    id: &str,
    value: f64,
    variable: &str,
    hvdc: bool,
    log: &mut MappingLog,
) -> f64 {
    let (to, new_value) = if !bounds.ok_max {
        (MAX_P, bounds.max)
    } else if (!bounds.ok_min && bounds.min <= 0.0) || (hvdc && !bounds.ok_min) {
        (MIN_P, bounds.min)
    } else if !bounds.ok_min && value < 0.0 {
        ("", 0.0)
    } else if !bounds.ok_min {
        log.record(
            LogLevel::Info,
            context.version,
            context.point,
            context.time,
            LogEvent::MinPViolatedByTargetP {
                scope: Scope::Mapping,
                id,
                not_included: TARGET_P,
                min: bounds.min,
                max: bounds.max,
                value,
            },
        );
        return value;
    } else {
        return f64::NAN;
    };
    debug!(id, variable, new_value, "unmapped power moved inside mapped limits");
    log.record(
        LogLevel::Warning,
        context.version,
        context.point,
        context.time,
        LogEvent::RangeChanged {
            scope: Scope::Mapping,
            id,
            not_included: variable,
            old: variable,
            to,
            min: bounds.min,
            max: bounds.max,
            value,
            new_value,
            disabled: bounds.ignore_limits,
        },
    );
    new_value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::DistributionKey;
    use crate::observer::MappingObserver;
    use gridmap_core::{Generator, HvdcLine};

    #[derive(Default)]
    struct Recorder {
        values: Vec<(String, String, f64)>,
    }

    impl MappingObserver for Recorder {
        fn value_mapped(&mut self, _network: &mut Network, value: &MappedValue<'_>) -> GridMapResult<()> {
            self.values.push((
                value.equipment.id.clone(),
                value.variable.as_str().to_string(),
                value.value,
            ));
            Ok(())
        }
    }

    fn network() -> Network {
        let mut network = Network::new("test");
        network.add_generator(Generator::new("G1", 0.0, 100.0, 50.0)).unwrap();
        network.add_generator(Generator::new("G2", 0.0, 100.0, 50.0)).unwrap();
        network.add_hvdc_line(HvdcLine::new("H1", 100.0, 0.0)).unwrap();
        network
    }

    fn table() -> TimeSeriesTable {
        let start: DateTime<Utc> = "2015-01-01T00:00:00Z".parse().unwrap();
        TimeSeriesTable::new(vec![start])
    }

    fn mapped(kind: EquipmentKind, ids: &[&str]) -> Vec<MappedEquipment> {
        ids.iter()
            .map(|id| MappedEquipment {
                equipment: EquipmentRef::new(kind, *id),
                key: DistributionKey::Number(1.0),
            })
            .collect()
    }

    /// Run one point with a single group and return observer values and log.
    fn run_point(
        network: &mut Network,
        resolver: &mut Resolver,
        equipments: &[MappedEquipment],
        variable: EquipmentVariable,
        ts_value: f64,
        values: &[f64],
        ignore_limits: bool,
    ) -> (Vec<(String, String, f64)>, MappingLog) {
        let table = table();
        let mut recorder = Recorder::default();
        let mut log = MappingLog::new();
        {
            let mut list: [&mut dyn MappingObserver; 1] = [&mut recorder];
            let mut observers = Observers::new(&mut list);
            resolver.point_start(network, &mut observers, 0, &table).unwrap();
            resolver
                .group_mapped(
                    network,
                    &mut observers,
                    0,
                    "ts",
                    ts_value,
                    equipments,
                    variable.into(),
                    values,
                    ignore_limits,
                )
                .unwrap();
            resolver
                .point_end(network, &mut observers, &mut log, 0, &table, 0.0)
                .unwrap();
        }
        (recorder.values, log)
    }

    #[test]
    fn targets_above_max_are_scaled_down() {
        let mut network = network();
        let mut resolver = Resolver::new(0.0001);
        resolver.version_start(1);
        let equipments = mapped(EquipmentKind::Generator, &["G1", "G2"]);
        let (values, log) = run_point(
            &mut network,
            &mut resolver,
            &equipments,
            EquipmentVariable::TargetP,
            300.0,
            &[150.0, 150.0],
            false,
        );

        assert_eq!(values.len(), 2);
        assert!(values.iter().all(|(_, var, v)| var == "targetP" && *v == 100.0));
        assert_eq!(log.len(), 1);
        let entry = &log.entries()[0];
        assert_eq!(entry.level, LogLevel::Warning);
        assert_eq!(entry.label, "scaling down / at least one targetP changed to base case maxP");
        assert_eq!(
            entry.message,
            "Impossible to scale down 300 of ts ts, targetP 200 has been applied"
        );

        let synthesis = resolver.version_end();
        let record = &synthesis.scaling_down[&(PowerKind::TargetP, "ts".to_string())];
        assert!(record.changes.contains(&ScalingDownPowerChange::BaseCaseMaxP));
    }

    #[test]
    fn value_on_the_bound_is_pulled_inside() {
        let mut network = network();
        let mut resolver = Resolver::new(0.0001);
        resolver.version_start(1);
        let equipments = mapped(EquipmentKind::Generator, &["G1"]);
        let (values, log) = run_point(
            &mut network,
            &mut resolver,
            &equipments,
            EquipmentVariable::TargetP,
            100.0,
            &[100.0],
            false,
        );
        assert!((values[0].2 - 99.9999).abs() < 1e-9);
        assert!(log.is_empty());
    }

    #[test]
    fn widen_limits_raises_max_and_tracks_change() {
        let mut network = network();
        let mut resolver = Resolver::new(0.0001);
        resolver.version_start(1);
        let equipments = mapped(EquipmentKind::Generator, &["G1"]);
        let (values, log) = run_point(
            &mut network,
            &mut resolver,
            &equipments,
            EquipmentVariable::TargetP,
            150.5,
            &[150.5],
            true,
        );
        assert_eq!(values[0].2, 150.5);
        assert!(log.is_empty());
        assert_eq!(network.generator("G1").unwrap().max_p, 151.0);

        let synthesis = resolver.version_end();
        let change = synthesis.limits[&(LimitTarget::GeneratorMaxP, "G1".to_string())];
        assert_eq!(change.base_case_limit, 100.0);
        assert_eq!(change.limit, 150.5);
        assert_eq!(change.violations, 1);
        let record = &synthesis.scaling_down[&(PowerKind::TargetP, "ts".to_string())];
        assert!(record.violations.contains(&ScalingDownLimitViolation::MaxPByTargetP));

        let mut log = MappingLog::new();
        synthesis.render(&mut log, 1, None);
        assert_eq!(log.entries()[0].label, "limit change / maxP");
    }

    #[test]
    fn widened_limit_is_reapplied_at_point_start() {
        let mut network = network();
        let mut resolver = Resolver::new(0.0001);
        resolver.version_start(1);
        let equipments = mapped(EquipmentKind::Generator, &["G1"]);
        run_point(
            &mut network,
            &mut resolver,
            &equipments,
            EquipmentVariable::TargetP,
            150.0,
            &[150.0],
            true,
        );
        network.generator_mut("G1").unwrap().max_p = 100.0;

        let mut list: [&mut dyn MappingObserver; 0] = [];
        let mut observers = Observers::new(&mut list);
        resolver
            .point_start(&mut network, &mut observers, 1, &table())
            .unwrap();
        assert_eq!(network.generator("G1").unwrap().max_p, 150.0);
    }

    #[test]
    fn mapped_max_below_network_target_moves_target() {
        let mut network = network();
        let mut resolver = Resolver::new(0.0001);
        resolver.version_start(1);
        let equipments = mapped(EquipmentKind::Generator, &["G1"]);
        let (values, log) = run_point(
            &mut network,
            &mut resolver,
            &equipments,
            EquipmentVariable::MaxP,
            20.0,
            &[20.0],
            false,
        );
        // maxP is announced immediately, the corrected targetP afterwards
        assert_eq!(values[0], ("G1".to_string(), "maxP".to_string(), 20.0));
        assert_eq!(values[1], ("G1".to_string(), "targetP".to_string(), 20.0));
        assert_eq!(
            log.entries()[0].label,
            "mapping range problem / targetP changed to mapped maxP"
        );
    }

    #[test]
    fn hvdc_setpoint_clipped_to_max() {
        let mut network = network();
        let mut resolver = Resolver::new(0.0001);
        resolver.version_start(1);
        let equipments = mapped(EquipmentKind::HvdcLine, &["H1"]);
        let (values, log) = run_point(
            &mut network,
            &mut resolver,
            &equipments,
            EquipmentVariable::ActivePowerSetpoint,
            -150.0,
            &[-150.0],
            false,
        );
        assert_eq!(values[0].2, -100.0);
        assert_eq!(
            log.entries()[0].label,
            "scaling down / at least one activePowerSetpoint changed to base case -maxP"
        );
    }

    #[test]
    fn hvdc_widening_adds_range() {
        let mut network = network();
        let mut resolver = Resolver::new(0.0001);
        resolver.version_start(1);
        let equipments = mapped(EquipmentKind::HvdcLine, &["H1"]);
        let (values, _) = run_point(
            &mut network,
            &mut resolver,
            &equipments,
            EquipmentVariable::ActivePowerSetpoint,
            130.0,
            &[130.0],
            true,
        );
        assert_eq!(values[0].2, 130.0);
        let line = network.hvdc_line("H1").unwrap();
        assert_eq!(line.max(), 131.0);
        assert_eq!(line.min(), -100.0);

        let synthesis = resolver.version_end();
        let record = &synthesis.scaling_down[&(PowerKind::Setpoint, "ts".to_string())];
        assert!(record.violations.contains(&ScalingDownLimitViolation::MaxPByActivePower));
    }

    #[test]
    fn invalid_mapped_limits_fail() {
        let mut network = network();
        let mut resolver = Resolver::new(0.0001);
        resolver.version_start(1);
        let table = table();
        let equipments = mapped(EquipmentKind::Generator, &["G1"]);
        let mut list: [&mut dyn MappingObserver; 0] = [];
        let mut observers = Observers::new(&mut list);
        resolver.point_start(&mut network, &mut observers, 0, &table).unwrap();
        resolver
            .group_mapped(
                &mut network,
                &mut observers,
                0,
                "low",
                200.0,
                &equipments,
                EquipmentVariable::MinP.into(),
                &[200.0],
                false,
            )
            .unwrap();
        let err = resolver
            .point_end(&mut network, &mut observers, &mut MappingLog::new(), 0, &table, 0.0)
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("Equipment 'G1' : invalid active limits [200, 100] at point 0"));
    }
}
