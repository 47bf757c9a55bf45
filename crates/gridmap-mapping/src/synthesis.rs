//! Per-version accumulation of scaling-down outcomes and widened limits.
//!
//! A [`VersionSynthesis`] is a plain value: chunked runs of the same version
//! each produce one and [`VersionSynthesis::merge`] folds them together before
//! [`VersionSynthesis::render`] writes the synthesis entries once.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::log::{Bound, LogEvent, LogLevel, MappingLog, Scope, SYNTHESIS_POINT};

pub(crate) const TARGET_P: &str = "targetP";
pub(crate) const SETPOINT: &str = "activePowerSetpoint";
pub(crate) const MIN_P: &str = "minP";
pub(crate) const MAX_P: &str = "maxP";
pub(crate) const MINUS_MAX_P: &str = "-maxP";
pub(crate) const CS1_TO_CS2: &str = "CS1toCS2";
pub(crate) const MINUS_CS2_TO_CS1: &str = "-CS2toCS1";

/// Value a mapped power was clipped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScalingDownPowerChange {
    BaseCaseMinP,
    BaseCaseMaxP,
    Zero,
    MappedMinP,
    MappedMaxP,
    MappedMinPDisabled,
    MappedMaxPDisabled,
    ZeroDisabled,
    BaseCaseCs1ToCs2,
    BaseCaseCs2ToCs1,
    BaseCaseMinusMaxP,
}

impl ScalingDownPowerChange {
    /// (target variable, scope, limits disabled)
    fn describe(&self) -> (&'static str, Option<Scope>, bool) {
        use ScalingDownPowerChange::*;
        match self {
            Zero => ("0", None, false),
            ZeroDisabled => ("0", None, true),
            BaseCaseMinP => (MIN_P, Some(Scope::BaseCase), false),
            BaseCaseMaxP => (MAX_P, Some(Scope::BaseCase), false),
            MappedMinP => (MIN_P, Some(Scope::Mapping), false),
            MappedMaxP => (MAX_P, Some(Scope::Mapping), false),
            MappedMinPDisabled => (MIN_P, Some(Scope::Mapping), true),
            MappedMaxPDisabled => (MAX_P, Some(Scope::Mapping), true),
            BaseCaseCs1ToCs2 => (CS1_TO_CS2, Some(Scope::BaseCase), false),
            BaseCaseCs2ToCs1 => (MINUS_CS2_TO_CS1, Some(Scope::BaseCase), false),
            BaseCaseMinusMaxP => (MINUS_MAX_P, Some(Scope::BaseCase), false),
        }
    }

    pub fn event<'a>(
        &self,
        changed: &'a str,
        timeseries: &'a str,
        value: Option<f64>,
        sum: Option<f64>,
    ) -> LogEvent<'a> {
        let (to, scope, disabled) = self.describe();
        LogEvent::ScalingDown {
            changed,
            to,
            scope,
            disabled,
            synthesis: value.is_none(),
            timeseries,
            value,
            sum,
        }
    }
}

/// Limit left violated, or widened, while scaling down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScalingDownLimitViolation {
    BaseCaseMinPByTargetP,
    MappedMinPByTargetP,
    MaxPByTargetP,
    MaxPByActivePower,
    Cs1ToCs2ByActivePower,
    MinPByTargetP,
    MinPByActivePower,
    Cs2ToCs1ByActivePower,
}

impl ScalingDownLimitViolation {
    pub fn event<'a>(&self, timeseries: &'a str) -> LogEvent<'a> {
        use ScalingDownLimitViolation::*;
        let widened = |violated, bound, variable| LogEvent::LimitViolationSynthesis {
            violated,
            bound,
            variable,
            timeseries,
        };
        match self {
            BaseCaseMinPByTargetP => LogEvent::NotModifiedSynthesis {
                scope: Scope::BaseCase,
                timeseries,
            },
            MappedMinPByTargetP => LogEvent::NotModifiedSynthesis {
                scope: Scope::Mapping,
                timeseries,
            },
            MaxPByTargetP => widened(MAX_P, Bound::Max, TARGET_P),
            MaxPByActivePower => widened(MAX_P, Bound::Max, SETPOINT),
            Cs1ToCs2ByActivePower => widened(CS1_TO_CS2, Bound::Max, SETPOINT),
            MinPByTargetP => widened(MIN_P, Bound::Min, TARGET_P),
            MinPByActivePower => widened(MINUS_MAX_P, Bound::Min, SETPOINT),
            Cs2ToCs1ByActivePower => widened(MINUS_CS2_TO_CS1, Bound::Min, SETPOINT),
        }
    }
}

/// Limit being widened, in version-end reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LimitTarget {
    GeneratorMinP,
    GeneratorMaxP,
    HvdcMinP,
    HvdcMaxP,
    HvdcCs2ToCs1,
    HvdcCs1ToCs2,
}

impl LimitTarget {
    pub fn bound(&self) -> Bound {
        match self {
            LimitTarget::GeneratorMinP | LimitTarget::HvdcMinP | LimitTarget::HvdcCs2ToCs1 => {
                Bound::Min
            }
            LimitTarget::GeneratorMaxP | LimitTarget::HvdcMaxP | LimitTarget::HvdcCs1ToCs2 => {
                Bound::Max
            }
        }
    }

    fn limit_name(&self) -> &'static str {
        match self {
            LimitTarget::GeneratorMinP => MIN_P,
            LimitTarget::GeneratorMaxP | LimitTarget::HvdcMaxP => MAX_P,
            LimitTarget::HvdcMinP => MINUS_MAX_P,
            LimitTarget::HvdcCs2ToCs1 => MINUS_CS2_TO_CS1,
            LimitTarget::HvdcCs1ToCs2 => CS1_TO_CS2,
        }
    }

    fn variable(&self) -> &'static str {
        match self {
            LimitTarget::GeneratorMinP | LimitTarget::GeneratorMaxP => TARGET_P,
            _ => SETPOINT,
        }
    }
}

/// Base-case value of a limit, the widest value it was pushed to in the
/// version (NaN while never widened) and how many variants went past the
/// base case.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitChange {
    pub base_case_limit: f64,
    pub limit: f64,
    pub violations: usize,
}

impl LimitChange {
    pub fn new(base_case_limit: f64) -> Self {
        Self {
            base_case_limit,
            limit: f64::NAN,
            violations: 0,
        }
    }

    /// Record `new` against the current limit `old`.
    pub fn record(&mut self, bound: Bound, old: f64, new: f64, tolerance: f64) {
        let widened = match bound {
            Bound::Max => new > old + tolerance,
            Bound::Min => new < old - tolerance,
        };
        if widened {
            self.limit = new;
        }
        let beyond_base = match bound {
            Bound::Max => new > self.base_case_limit,
            Bound::Min => new < self.base_case_limit,
        };
        if !self.limit.is_nan() && beyond_base {
            self.violations += 1;
        }
    }

    /// Fold a change recorded by another chunk of the same version.
    pub fn merge(&mut self, other: &LimitChange, bound: Bound) {
        self.violations += other.violations;
        self.limit = match (self.limit.is_nan(), other.limit.is_nan()) {
            (true, _) => other.limit,
            (false, true) => self.limit,
            (false, false) => match bound {
                Bound::Max => self.limit.max(other.limit),
                Bound::Min => self.limit.min(other.limit),
            },
        };
    }
}

/// Power variable a scaling-down record is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PowerKind {
    TargetP,
    Setpoint,
}

impl PowerKind {
    pub fn name(&self) -> &'static str {
        match self {
            PowerKind::TargetP => TARGET_P,
            PowerKind::Setpoint => SETPOINT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScalingDownRecord {
    pub changes: BTreeSet<ScalingDownPowerChange>,
    pub violations: BTreeSet<ScalingDownLimitViolation>,
}

impl ScalingDownRecord {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.violations.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionSynthesis {
    pub limits: BTreeMap<(LimitTarget, String), LimitChange>,
    pub scaling_down: BTreeMap<(PowerKind, String), ScalingDownRecord>,
}

impl VersionSynthesis {
    pub fn is_empty(&self) -> bool {
        self.limits.is_empty() && self.scaling_down.is_empty()
    }

    /// Limits actually widened during the version.
    pub fn widened_limits(&self) -> impl Iterator<Item = (&(LimitTarget, String), &LimitChange)> {
        self.limits.iter().filter(|(_, change)| !change.limit.is_nan())
    }

    pub fn add_scaling_down(&mut self, kind: PowerKind, timeseries: &str, record: &ScalingDownRecord) {
        let entry = self
            .scaling_down
            .entry((kind, timeseries.to_string()))
            .or_default();
        entry.changes.extend(record.changes.iter().copied());
        entry.violations.extend(record.violations.iter().copied());
    }

    pub fn merge(&mut self, other: &VersionSynthesis) {
        for ((target, id), change) in &other.limits {
            match self.limits.get_mut(&(*target, id.clone())) {
                Some(existing) => existing.merge(change, target.bound()),
                None => {
                    self.limits.insert((*target, id.clone()), *change);
                }
            }
        }
        for ((kind, timeseries), record) in &other.scaling_down {
            self.add_scaling_down(*kind, timeseries, record);
        }
    }

    /// Write the limit change entries, then the scaling-down synthesis: power
    /// changes before violations, targetP before setpoint.
    pub fn render(&self, log: &mut MappingLog, version: i32, time: Option<DateTime<Utc>>) {
        for ((target, id), change) in self.widened_limits() {
            log.record(
                LogLevel::Info,
                version,
                SYNTHESIS_POINT,
                time,
                LogEvent::LimitChanged {
                    id,
                    limit: target.limit_name(),
                    variable: target.variable(),
                    bound: target.bound(),
                    variants: change.violations,
                    old: change.base_case_limit,
                    new: change.limit,
                },
            );
        }
        for kind in [PowerKind::TargetP, PowerKind::Setpoint] {
            let records = || self.scaling_down.iter().filter(move |((k, _), _)| *k == kind);
            for ((_, timeseries), record) in records() {
                for change in &record.changes {
                    log.record(
                        LogLevel::Warning,
                        version,
                        SYNTHESIS_POINT,
                        time,
                        change.event(kind.name(), timeseries, None, None),
                    );
                }
            }
            for ((_, timeseries), record) in records() {
                for violation in &record.violations {
                    log.record(
                        LogLevel::Info,
                        version,
                        SYNTHESIS_POINT,
                        time,
                        violation.event(timeseries),
                    );
                }
            }
        }
    }
}
