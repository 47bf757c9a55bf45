//! Base-case correction of equipment whose power is not driven by a series.
//!
//! Runs once per version before the base case is evaluated. A base-case
//! targetP or set point outside its limits is either clipped to the limit or,
//! when limits are widened, kept and the limit moved instead. Every change is
//! logged at [`BASE_CASE_POINT`].

use gridmap_core::{GridMapError, GridMapResult, Generator, HvdcLine};

use crate::log::{LogEvent, LogLevel, MappingLog, Scope, BASE_CASE_POINT};
use crate::synthesis::{
    CS1_TO_CS2, MAX_P, MINUS_CS2_TO_CS1, MINUS_MAX_P, MIN_P, SETPOINT, TARGET_P,
};

/// Which limits of the corrected equipment no series drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnmappedLimits {
    pub min: bool,
    pub max: bool,
}

struct BaseCaseLog<'l> {
    log: &'l mut MappingLog,
    version: i32,
}

impl BaseCaseLog<'_> {
    fn record(&mut self, level: LogLevel, event: LogEvent<'_>) {
        self.log
            .record(level, self.version, BASE_CASE_POINT, None, event);
    }
}

#[allow(clippy::too_many_arguments)]
fn range_changed<'a>(
    id: &'a str,
    not_included: &'a str,
    old: &'a str,
    to: &'a str,
    min: f64,
    max: f64,
    value: f64,
    new_value: f64,
    disabled: bool,
) -> LogEvent<'a> {
    LogEvent::RangeChanged {
        scope: Scope::BaseCase,
        id,
        not_included,
        old,
        to,
        min,
        max,
        value,
        new_value,
        disabled,
    }
}

/// Bring an unmapped generator's targetP back inside [minP, maxP], or widen
/// the unmapped limit when `widen` is set.
pub fn correct_unmapped_generator(
    generator: &mut Generator,
    unmapped: UnmappedLimits,
    widen: bool,
    version: i32,
    log: &mut MappingLog,
) -> GridMapResult<()> {
    let (min, max, target) = (generator.min_p, generator.max_p, generator.state.target_p);
    if min > max {
        return Err(GridMapError::Mapping(format!(
            "Equipment '{}' : invalid active limits [{min}, {max}] in base case",
            generator.id
        )));
    }
    let ok_min = target >= min;
    let ok_max = target <= max;
    let id = generator.id.clone();
    let mut log = BaseCaseLog { log, version };
    let changed = |old, to, new_value, disabled| {
        range_changed(&id, TARGET_P, old, to, min, max, target, new_value, disabled)
    };
    let violated = LogEvent::MinPViolatedByTargetP {
        scope: Scope::BaseCase,
        id: &id,
        not_included: TARGET_P,
        min,
        max,
        value: target,
    };

    if widen {
        if !ok_max && unmapped.max {
            log.record(LogLevel::Info, changed(MAX_P, TARGET_P, target, false));
            generator.max_p = target;
        } else if !ok_min && unmapped.min && min <= 0.0 {
            log.record(LogLevel::Info, changed(MIN_P, TARGET_P, target, false));
            generator.min_p = target;
        } else if !ok_min && unmapped.min && target < 0.0 {
            log.record(LogLevel::Warning, changed(TARGET_P, "", 0.0, true));
            generator.state.target_p = 0.0;
        } else if !ok_min && unmapped.min {
            log.record(LogLevel::Info, violated);
        }
        return Ok(());
    }

    if !ok_max && unmapped.max {
        log.record(LogLevel::Warning, changed(TARGET_P, MAX_P, max, false));
        generator.state.target_p = max;
    } else if !ok_min && unmapped.min && min <= 0.0 {
        log.record(LogLevel::Warning, changed(TARGET_P, MIN_P, min, false));
        generator.state.target_p = min;
    } else if !ok_min && unmapped.min && target < 0.0 {
        log.record(LogLevel::Warning, changed(TARGET_P, "", 0.0, false));
        generator.state.target_p = 0.0;
    } else if !ok_min && unmapped.min {
        log.record(LogLevel::Info, violated);
    }
    Ok(())
}

/// Reconcile an unmapped HVDC line's operator range with maxP, then bring
/// the set point inside the range (or widen the range when `widen` is set).
///
/// The line always leaves with an operator range.
pub fn correct_unmapped_hvdc_line(
    line: &mut HvdcLine,
    unmapped: UnmappedLimits,
    widen: bool,
    version: i32,
    log: &mut MappingLog,
) -> GridMapResult<()> {
    let is_range = line.power_range.is_some();
    let (min, max, line_max_p, setpoint) = (line.min(), line.max(), line.max_p, line.setpoint());
    let (max_name, min_name) = if is_range {
        (CS1_TO_CS2, MINUS_CS2_TO_CS1)
    } else {
        (MAX_P, MINUS_MAX_P)
    };

    if line_max_p < 0.0 {
        return Err(GridMapError::Mapping(format!(
            "Equipment '{}' : invalid active limit maxP {line_max_p} in base case",
            line.id
        )));
    }
    if is_range && (min > 0.0 || max < 0.0) {
        return Err(GridMapError::Mapping(format!(
            "Equipment '{}' : invalid active limits [{min}, {max}] in base case",
            line.id
        )));
    }

    let id = line.id.clone();
    let mut log = BaseCaseLog { log, version };
    let mut corrected_max = max;
    let mut corrected_min = min;
    line.ensure_power_range();

    // operator range wider than maxP
    if is_range && (max > line_max_p || -min > line_max_p) {
        if widen {
            if max > line_max_p && (-min <= line_max_p || max > -min) {
                log.record(
                    LogLevel::Info,
                    range_changed(&id, max_name, MAX_P, max_name, 0.0, line_max_p, max, max, false),
                );
            } else if -min > line_max_p && max <= line_max_p {
                log.record(
                    LogLevel::Info,
                    range_changed(
                        &id, min_name, MINUS_MAX_P, min_name, -line_max_p, 0.0, min, min, false,
                    ),
                );
            }
            line.max_p = max.max(-min);
        } else {
            if max > line_max_p {
                log.record(
                    LogLevel::Warning,
                    range_changed(
                        &id, max_name, max_name, MAX_P, 0.0, line_max_p, max, line_max_p, false,
                    ),
                );
                line.ensure_power_range().cs1_to_cs2 = line_max_p;
                corrected_max = line_max_p;
            }
            if min < -line_max_p {
                log.record(
                    LogLevel::Warning,
                    range_changed(
                        &id,
                        min_name,
                        min_name,
                        MINUS_MAX_P,
                        -line_max_p,
                        0.0,
                        min,
                        -line_max_p,
                        false,
                    ),
                );
                line.ensure_power_range().cs2_to_cs1 = line_max_p;
                corrected_min = -line_max_p;
            }
        }
    }

    if setpoint > corrected_max && unmapped.max {
        if widen {
            log.record(
                LogLevel::Info,
                range_changed(&id, SETPOINT, max_name, SETPOINT, min, max, setpoint, setpoint, false),
            );
            line.set_max(setpoint);
        } else {
            log.record(
                LogLevel::Warning,
                range_changed(
                    &id,
                    SETPOINT,
                    SETPOINT,
                    max_name,
                    min,
                    max,
                    setpoint,
                    corrected_max,
                    false,
                ),
            );
            line.set_setpoint(corrected_max);
        }
    } else if setpoint < corrected_min && unmapped.min {
        if widen {
            log.record(
                LogLevel::Info,
                range_changed(&id, SETPOINT, min_name, SETPOINT, min, max, setpoint, setpoint, false),
            );
            line.set_min(setpoint);
        } else {
            log.record(
                LogLevel::Warning,
                range_changed(
                    &id,
                    SETPOINT,
                    SETPOINT,
                    min_name,
                    min,
                    max,
                    setpoint,
                    corrected_min,
                    false,
                ),
            );
            line.set_setpoint(corrected_min);
        }
    }
    Ok(())
}
