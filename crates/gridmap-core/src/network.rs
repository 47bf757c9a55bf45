//! In-memory network model with named variants.
//!
//! Equipment is stored per kind. Each equipment splits its attributes in two:
//! a *state* part (set points, open/closed flags, tap positions) that is
//! copied per variant, and limit attributes that live outside the variant
//! mechanism and are shared by every variant:
//!
//! - generator `min_p` / `max_p`
//! - HVDC line `max_p`
//! - HVDC operator active power range (both directions, and its presence)
//!
//! Anything that clones a variant, mutates limits and then drops the variant
//! has to save and restore those attributes itself ([`Network::save_limits`],
//! [`Network::restore_limits`]).

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GridMapError, GridMapResult};
use crate::variable::{EquipmentKind, EquipmentVariable};

/// Variant every network starts with.
pub const INITIAL_VARIANT_ID: &str = "InitialState";

/// Mapped value meaning "switch open".
pub const SWITCH_OPEN: f64 = 0.0;

/// Mapped value meaning "equipment disconnected".
pub const DISCONNECTED_VALUE: f64 = 0.0;

fn default_true() -> bool {
    true
}

// ============================================================================
// Equipment
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorState {
    pub target_p: f64,
    #[serde(default)]
    pub target_q: f64,
    #[serde(default)]
    pub voltage_regulator_on: bool,
    #[serde(default)]
    pub target_v: f64,
    #[serde(default = "default_true")]
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    pub id: String,
    pub min_p: f64,
    pub max_p: f64,
    #[serde(flatten)]
    pub state: GeneratorState,
}

impl Generator {
    pub fn new(id: impl Into<String>, min_p: f64, max_p: f64, target_p: f64) -> Self {
        Self {
            id: id.into(),
            min_p,
            max_p,
            state: GeneratorState {
                target_p,
                target_q: 0.0,
                voltage_regulator_on: false,
                target_v: 0.0,
                connected: true,
            },
        }
    }
}

/// Fixed/variable decomposition of a load's demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadDetail {
    #[serde(default)]
    pub fixed_active_power: f64,
    #[serde(default)]
    pub variable_active_power: f64,
    #[serde(default)]
    pub fixed_reactive_power: f64,
    #[serde(default)]
    pub variable_reactive_power: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadState {
    pub p0: f64,
    #[serde(default)]
    pub q0: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<LoadDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Load {
    pub id: String,
    #[serde(flatten)]
    pub state: LoadState,
}

impl Load {
    pub fn new(id: impl Into<String>, p0: f64) -> Self {
        Self {
            id: id.into(),
            state: LoadState {
                p0,
                q0: 0.0,
                detail: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvertersMode {
    Side1RectifierSide2Inverter,
    Side1InverterSide2Rectifier,
}

/// Angle-droop active power control extension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleDroopControl {
    pub p0: f64,
    pub droop: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl AngleDroopControl {
    /// The controller only drives the line when enabled with a positive droop.
    pub fn is_active(&self) -> bool {
        self.enabled && self.droop > 0.0
    }
}

/// Operator active power range: per-direction bounds, both stored positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivePowerRange {
    pub cs1_to_cs2: f64,
    pub cs2_to_cs1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HvdcState {
    pub active_power_setpoint: f64,
    pub converters_mode: ConvertersMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub droop_control: Option<AngleDroopControl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HvdcLine {
    pub id: String,
    pub max_p: f64,
    #[serde(default)]
    pub nominal_v: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_range: Option<ActivePowerRange>,
    #[serde(flatten)]
    pub state: HvdcState,
}

impl HvdcLine {
    pub fn new(id: impl Into<String>, max_p: f64, setpoint: f64) -> Self {
        let mut line = Self {
            id: id.into(),
            max_p,
            nominal_v: 0.0,
            power_range: None,
            state: HvdcState {
                active_power_setpoint: 0.0,
                converters_mode: ConvertersMode::Side1RectifierSide2Inverter,
                droop_control: None,
            },
        };
        line.set_setpoint(setpoint);
        line
    }

    fn active_droop(&self) -> Option<&AngleDroopControl> {
        self.state.droop_control.as_ref().filter(|c| c.is_active())
    }

    /// Signed set point: droop controller p0 when active, otherwise the
    /// magnitude signed by the converters mode.
    pub fn setpoint(&self) -> f64 {
        if let Some(control) = self.active_droop() {
            return control.p0;
        }
        match self.state.converters_mode {
            ConvertersMode::Side1InverterSide2Rectifier => -self.state.active_power_setpoint,
            ConvertersMode::Side1RectifierSide2Inverter => self.state.active_power_setpoint,
        }
    }

    pub fn set_setpoint(&mut self, value: f64) {
        if let Some(control) = self.state.droop_control.as_mut().filter(|c| c.is_active()) {
            control.p0 = value;
            return;
        }
        if value >= 0.0 {
            self.state.converters_mode = ConvertersMode::Side1RectifierSide2Inverter;
            self.state.active_power_setpoint = value;
        } else {
            self.state.converters_mode = ConvertersMode::Side1InverterSide2Rectifier;
            self.state.active_power_setpoint = -value;
        }
    }

    /// Upper bound in side-1 to side-2 direction.
    pub fn max(&self) -> f64 {
        match &self.power_range {
            Some(range) => range.cs1_to_cs2,
            None => self.max_p,
        }
    }

    /// Lower bound (negative) in side-2 to side-1 direction.
    pub fn min(&self) -> f64 {
        match &self.power_range {
            Some(range) => -range.cs2_to_cs1,
            None => -self.max_p,
        }
    }

    /// Adds the range extension initialised to |maxP| on both sides when absent.
    pub fn ensure_power_range(&mut self) -> &mut ActivePowerRange {
        let max_p = self.max_p.abs();
        self.power_range.get_or_insert(ActivePowerRange {
            cs1_to_cs2: max_p,
            cs2_to_cs1: max_p,
        })
    }

    /// Sets the side-1 to side-2 bound (when a range exists) and raises maxP
    /// if needed.
    pub fn set_max(&mut self, max: f64) {
        if let Some(range) = self.power_range.as_mut() {
            range.cs1_to_cs2 = max.abs();
        }
        self.max_p = self.max_p.max(max.abs());
    }

    /// Sets the side-2 to side-1 bound (when a range exists) and raises maxP
    /// if needed.
    pub fn set_min(&mut self, min: f64) {
        if let Some(range) = self.power_range.as_mut() {
            range.cs2_to_cs1 = min.abs();
        }
        self.max_p = self.max_p.max(min.abs());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Switch {
    pub id: String,
    pub open: bool,
    /// Branch opened or closed by this switch, when it maps onto one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseRegulationMode {
    CurrentLimiter,
    ActivePowerControl,
    FixedTap,
}

impl PhaseRegulationMode {
    fn from_value(value: f64) -> Option<Self> {
        match value.round() as i64 {
            0 => Some(PhaseRegulationMode::CurrentLimiter),
            1 => Some(PhaseRegulationMode::ActivePowerControl),
            2 => Some(PhaseRegulationMode::FixedTap),
            _ => None,
        }
    }

    fn value(&self) -> f64 {
        match self {
            PhaseRegulationMode::CurrentLimiter => 0.0,
            PhaseRegulationMode::ActivePowerControl => 1.0,
            PhaseRegulationMode::FixedTap => 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseShifterState {
    pub tap_position: i32,
    #[serde(default)]
    pub regulating: bool,
    #[serde(default = "default_regulation_mode")]
    pub regulation_mode: PhaseRegulationMode,
    #[serde(default)]
    pub target_deadband: f64,
}

fn default_regulation_mode() -> PhaseRegulationMode {
    PhaseRegulationMode::FixedTap
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseShiftingTransformer {
    pub id: String,
    pub low_tap: i32,
    pub high_tap: i32,
    #[serde(flatten)]
    pub state: PhaseShifterState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryLine {
    pub id: String,
    pub p0: f64,
}

/// Reference to one piece of equipment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EquipmentRef {
    pub kind: EquipmentKind,
    pub id: String,
}

impl EquipmentRef {
    pub fn new(kind: EquipmentKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// Read access to one piece of equipment, one variant per kind.
#[derive(Debug, Clone, Copy)]
pub enum Equipment<'a> {
    Generator(&'a Generator),
    Load(&'a Load),
    HvdcLine(&'a HvdcLine),
    Switch(&'a Switch),
    PhaseShiftingTransformer(&'a PhaseShiftingTransformer),
    BoundaryLine(&'a BoundaryLine),
}

impl Equipment<'_> {
    pub fn id(&self) -> &str {
        match self {
            Equipment::Generator(g) => &g.id,
            Equipment::Load(l) => &l.id,
            Equipment::HvdcLine(h) => &h.id,
            Equipment::Switch(s) => &s.id,
            Equipment::PhaseShiftingTransformer(t) => &t.id,
            Equipment::BoundaryLine(b) => &b.id,
        }
    }

    pub fn kind(&self) -> EquipmentKind {
        match self {
            Equipment::Generator(_) => EquipmentKind::Generator,
            Equipment::Load(_) => EquipmentKind::Load,
            Equipment::HvdcLine(_) => EquipmentKind::HvdcLine,
            Equipment::Switch(_) => EquipmentKind::Switch,
            Equipment::PhaseShiftingTransformer(_) => EquipmentKind::PhaseShiftingTransformer,
            Equipment::BoundaryLine(_) => EquipmentKind::BoundaryLine,
        }
    }

    /// Current value of a variable, `None` when the kind does not carry it.
    pub fn value(&self, variable: EquipmentVariable) -> Option<f64> {
        use EquipmentVariable as V;
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        match (self, variable) {
            (Equipment::Generator(g), V::TargetP) => Some(g.state.target_p),
            (Equipment::Generator(g), V::TargetQ) => Some(g.state.target_q),
            (Equipment::Generator(g), V::MinP) => Some(g.min_p),
            (Equipment::Generator(g), V::MaxP) => Some(g.max_p),
            (Equipment::Generator(g), V::VoltageRegulatorOn) => {
                Some(flag(g.state.voltage_regulator_on))
            }
            (Equipment::Generator(g), V::TargetV) => Some(g.state.target_v),
            (Equipment::Generator(g), V::Disconnected) => Some(flag(g.state.connected)),
            (Equipment::Load(l), V::P0) => Some(l.state.p0),
            (Equipment::Load(l), V::Q0) => Some(l.state.q0),
            (Equipment::Load(l), V::FixedActivePower) => {
                Some(l.state.detail.map_or(0.0, |d| d.fixed_active_power))
            }
            (Equipment::Load(l), V::VariableActivePower) => {
                Some(l.state.detail.map_or(0.0, |d| d.variable_active_power))
            }
            (Equipment::Load(l), V::FixedReactivePower) => {
                Some(l.state.detail.map_or(0.0, |d| d.fixed_reactive_power))
            }
            (Equipment::Load(l), V::VariableReactivePower) => {
                Some(l.state.detail.map_or(0.0, |d| d.variable_reactive_power))
            }
            (Equipment::HvdcLine(h), V::ActivePowerSetpoint) => Some(h.setpoint()),
            (Equipment::HvdcLine(h), V::MinP) => Some(h.min()),
            (Equipment::HvdcLine(h), V::MaxP) => Some(h.max()),
            (Equipment::HvdcLine(h), V::NominalV) => Some(h.nominal_v),
            (Equipment::Switch(s), V::Open) => Some(if s.open { SWITCH_OPEN } else { 1.0 }),
            (Equipment::PhaseShiftingTransformer(t), V::PhaseTapPosition) => {
                Some(f64::from(t.state.tap_position))
            }
            (Equipment::PhaseShiftingTransformer(t), V::PhaseRegulating) => {
                Some(flag(t.state.regulating))
            }
            (Equipment::PhaseShiftingTransformer(t), V::RegulationMode) => {
                Some(t.state.regulation_mode.value())
            }
            (Equipment::PhaseShiftingTransformer(t), V::TargetDeadband) => {
                Some(t.state.target_deadband)
            }
            (Equipment::BoundaryLine(b), V::P0) => Some(b.p0),
            _ => None,
        }
    }
}

/// Write access to one piece of equipment; [`EquipmentMut::apply`] is the
/// per-kind setter contract.
#[derive(Debug)]
pub enum EquipmentMut<'a> {
    Generator(&'a mut Generator),
    Load(&'a mut Load),
    HvdcLine(&'a mut HvdcLine),
    Switch(&'a mut Switch),
    PhaseShiftingTransformer(&'a mut PhaseShiftingTransformer),
    BoundaryLine(&'a mut BoundaryLine),
}

impl EquipmentMut<'_> {
    /// Write a resolved value. Not-a-number values are ignored; a variable the
    /// kind does not carry is a configuration error.
    pub fn apply(self, variable: EquipmentVariable, value: f64) -> GridMapResult<()> {
        use EquipmentVariable as V;
        if value.is_nan() {
            return Ok(());
        }
        match (self, variable) {
            (EquipmentMut::Generator(g), V::TargetP) => g.state.target_p = value,
            (EquipmentMut::Generator(g), V::TargetQ) => g.state.target_q = value,
            (EquipmentMut::Generator(g), V::MinP) => g.min_p = value,
            (EquipmentMut::Generator(g), V::MaxP) => g.max_p = value,
            (EquipmentMut::Generator(g), V::VoltageRegulatorOn) => {
                g.state.voltage_regulator_on = value != 0.0
            }
            (EquipmentMut::Generator(g), V::TargetV) => g.state.target_v = value,
            (EquipmentMut::Generator(g), V::Disconnected) => {
                g.state.connected = value != DISCONNECTED_VALUE
            }
            (EquipmentMut::Load(l), V::P0) => {
                l.state.p0 = value;
                if let Some(detail) = l.state.detail.as_mut() {
                    detail.fixed_active_power = 0.0;
                    detail.variable_active_power = 0.0;
                }
            }
            (EquipmentMut::Load(l), V::Q0) => {
                l.state.q0 = value;
                if let Some(detail) = l.state.detail.as_mut() {
                    detail.fixed_reactive_power = 0.0;
                    detail.variable_reactive_power = 0.0;
                }
            }
            (EquipmentMut::Load(l), component @ (V::FixedActivePower | V::VariableActivePower)) => {
                let detail = l.state.detail.get_or_insert_with(LoadDetail::default);
                if component == V::FixedActivePower {
                    detail.fixed_active_power = value;
                } else {
                    detail.variable_active_power = value;
                }
                l.state.p0 = detail.fixed_active_power + detail.variable_active_power;
            }
            (
                EquipmentMut::Load(l),
                component @ (V::FixedReactivePower | V::VariableReactivePower),
            ) => {
                let detail = l.state.detail.get_or_insert_with(LoadDetail::default);
                if component == V::FixedReactivePower {
                    detail.fixed_reactive_power = value;
                } else {
                    detail.variable_reactive_power = value;
                }
                l.state.q0 = detail.fixed_reactive_power + detail.variable_reactive_power;
            }
            (EquipmentMut::HvdcLine(h), V::ActivePowerSetpoint) => h.set_setpoint(value),
            (EquipmentMut::HvdcLine(h), V::MinP) => {
                let widest = {
                    let range = h.ensure_power_range();
                    range.cs2_to_cs1 = value.abs();
                    range.cs2_to_cs1.max(range.cs1_to_cs2)
                };
                if widest > h.max_p {
                    h.max_p = widest;
                }
            }
            (EquipmentMut::HvdcLine(h), V::MaxP) => {
                let widest = {
                    let range = h.ensure_power_range();
                    range.cs1_to_cs2 = value.abs();
                    range.cs1_to_cs2.max(range.cs2_to_cs1)
                };
                if widest > h.max_p {
                    h.max_p = widest;
                }
            }
            (EquipmentMut::HvdcLine(h), V::NominalV) => h.nominal_v = value,
            (EquipmentMut::Switch(s), V::Open) => s.open = value == SWITCH_OPEN,
            (EquipmentMut::PhaseShiftingTransformer(t), V::PhaseTapPosition) => {
                t.state.tap_position = value as i32
            }
            (EquipmentMut::PhaseShiftingTransformer(t), V::PhaseRegulating) => {
                t.state.regulating = value != 0.0
            }
            (EquipmentMut::PhaseShiftingTransformer(t), V::RegulationMode) => {
                t.state.regulation_mode = PhaseRegulationMode::from_value(value).ok_or_else(
                    || {
                        GridMapError::Mapping(format!(
                            "invalid regulation mode {value} for '{}'",
                            t.id
                        ))
                    },
                )?
            }
            (EquipmentMut::PhaseShiftingTransformer(t), V::TargetDeadband) => {
                t.state.target_deadband = value
            }
            (EquipmentMut::BoundaryLine(b), V::P0) => b.p0 = value,
            (other, variable) => {
                return Err(GridMapError::Config(format!(
                    "Variable type {variable} not compatible with equipment type {}",
                    other.kind()
                )))
            }
        }
        Ok(())
    }

    fn kind(&self) -> EquipmentKind {
        match self {
            EquipmentMut::Generator(_) => EquipmentKind::Generator,
            EquipmentMut::Load(_) => EquipmentKind::Load,
            EquipmentMut::HvdcLine(_) => EquipmentKind::HvdcLine,
            EquipmentMut::Switch(_) => EquipmentKind::Switch,
            EquipmentMut::PhaseShiftingTransformer(_) => EquipmentKind::PhaseShiftingTransformer,
            EquipmentMut::BoundaryLine(_) => EquipmentKind::BoundaryLine,
        }
    }
}

// ============================================================================
// Variants and limits
// ============================================================================

#[derive(Debug, Clone, Default)]
struct VariantState {
    generators: Vec<GeneratorState>,
    loads: Vec<LoadState>,
    hvdc_lines: Vec<HvdcState>,
    switches: Vec<bool>,
    phase_shifters: Vec<PhaseShifterState>,
    boundary_lines: Vec<f64>,
}

#[derive(Debug, Clone)]
struct VariantStore {
    working: String,
    parked: BTreeMap<String, VariantState>,
}

impl Default for VariantStore {
    fn default() -> Self {
        Self {
            working: INITIAL_VARIANT_ID.to_string(),
            parked: BTreeMap::new(),
        }
    }
}

/// Copy of the limit attributes that variants do not isolate.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitSnapshot {
    generators: Vec<(f64, f64)>,
    hvdc_lines: Vec<(f64, Option<ActivePowerRange>)>,
}

// ============================================================================
// Network
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NetworkData {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    case_date: Option<DateTime<Utc>>,
    #[serde(default)]
    generators: Vec<Generator>,
    #[serde(default)]
    loads: Vec<Load>,
    #[serde(default)]
    hvdc_lines: Vec<HvdcLine>,
    #[serde(default)]
    switches: Vec<Switch>,
    #[serde(default)]
    phase_shifters: Vec<PhaseShiftingTransformer>,
    #[serde(default)]
    boundary_lines: Vec<BoundaryLine>,
}

/// Network container.
///
/// Equipment ids are unique across kinds. The equipment vectors always hold
/// the working variant's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "NetworkData", into = "NetworkData")]
pub struct Network {
    id: String,
    case_date: Option<DateTime<Utc>>,
    generators: Vec<Generator>,
    loads: Vec<Load>,
    hvdc_lines: Vec<HvdcLine>,
    switches: Vec<Switch>,
    phase_shifters: Vec<PhaseShiftingTransformer>,
    boundary_lines: Vec<BoundaryLine>,
    lookup: HashMap<String, (EquipmentKind, usize)>,
    variants: VariantStore,
}

impl TryFrom<NetworkData> for Network {
    type Error = GridMapError;

    fn try_from(data: NetworkData) -> Result<Self, Self::Error> {
        let mut network = Network::new(data.id);
        network.case_date = data.case_date;
        for g in data.generators {
            network.add_generator(g)?;
        }
        for l in data.loads {
            network.add_load(l)?;
        }
        for h in data.hvdc_lines {
            network.add_hvdc_line(h)?;
        }
        for s in data.switches {
            network.add_switch(s)?;
        }
        for t in data.phase_shifters {
            network.add_phase_shifter(t)?;
        }
        for b in data.boundary_lines {
            network.add_boundary_line(b)?;
        }
        Ok(network)
    }
}

impl From<Network> for NetworkData {
    fn from(network: Network) -> Self {
        NetworkData {
            id: network.id,
            case_date: network.case_date,
            generators: network.generators,
            loads: network.loads,
            hvdc_lines: network.hvdc_lines,
            switches: network.switches,
            phase_shifters: network.phase_shifters,
            boundary_lines: network.boundary_lines,
        }
    }
}

impl Network {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            case_date: None,
            generators: Vec::new(),
            loads: Vec::new(),
            hvdc_lines: Vec::new(),
            switches: Vec::new(),
            phase_shifters: Vec::new(),
            boundary_lines: Vec::new(),
            lookup: HashMap::new(),
            variants: VariantStore::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn case_date(&self) -> Option<DateTime<Utc>> {
        self.case_date
    }

    pub fn with_case_date(mut self, date: DateTime<Utc>) -> Self {
        self.case_date = Some(date);
        self
    }

    fn register(&mut self, id: &str, kind: EquipmentKind, index: usize) -> GridMapResult<()> {
        if self.lookup.contains_key(id) {
            return Err(GridMapError::Network(format!(
                "duplicate equipment id '{id}' in network '{}'",
                self.id
            )));
        }
        self.lookup.insert(id.to_string(), (kind, index));
        Ok(())
    }

    pub fn add_generator(&mut self, generator: Generator) -> GridMapResult<()> {
        self.register(&generator.id, EquipmentKind::Generator, self.generators.len())?;
        self.generators.push(generator);
        Ok(())
    }

    pub fn add_load(&mut self, load: Load) -> GridMapResult<()> {
        self.register(&load.id, EquipmentKind::Load, self.loads.len())?;
        self.loads.push(load);
        Ok(())
    }

    pub fn add_hvdc_line(&mut self, line: HvdcLine) -> GridMapResult<()> {
        self.register(&line.id, EquipmentKind::HvdcLine, self.hvdc_lines.len())?;
        self.hvdc_lines.push(line);
        Ok(())
    }

    pub fn add_switch(&mut self, switch: Switch) -> GridMapResult<()> {
        self.register(&switch.id, EquipmentKind::Switch, self.switches.len())?;
        self.switches.push(switch);
        Ok(())
    }

    pub fn add_phase_shifter(&mut self, transformer: PhaseShiftingTransformer) -> GridMapResult<()> {
        self.register(
            &transformer.id,
            EquipmentKind::PhaseShiftingTransformer,
            self.phase_shifters.len(),
        )?;
        self.phase_shifters.push(transformer);
        Ok(())
    }

    pub fn add_boundary_line(&mut self, line: BoundaryLine) -> GridMapResult<()> {
        self.register(&line.id, EquipmentKind::BoundaryLine, self.boundary_lines.len())?;
        self.boundary_lines.push(line);
        Ok(())
    }

    pub fn generators(&self) -> &[Generator] {
        &self.generators
    }

    pub fn loads(&self) -> &[Load] {
        &self.loads
    }

    pub fn hvdc_lines(&self) -> &[HvdcLine] {
        &self.hvdc_lines
    }

    pub fn switches(&self) -> &[Switch] {
        &self.switches
    }

    pub fn phase_shifters(&self) -> &[PhaseShiftingTransformer] {
        &self.phase_shifters
    }

    pub fn boundary_lines(&self) -> &[BoundaryLine] {
        &self.boundary_lines
    }

    /// Ids of every equipment of a kind, in insertion order.
    pub fn ids_of_kind(&self, kind: EquipmentKind) -> Vec<&str> {
        match kind {
            EquipmentKind::Generator => self.generators.iter().map(|e| e.id.as_str()).collect(),
            EquipmentKind::Load => self.loads.iter().map(|e| e.id.as_str()).collect(),
            EquipmentKind::HvdcLine => self.hvdc_lines.iter().map(|e| e.id.as_str()).collect(),
            EquipmentKind::Switch => self.switches.iter().map(|e| e.id.as_str()).collect(),
            EquipmentKind::PhaseShiftingTransformer => {
                self.phase_shifters.iter().map(|e| e.id.as_str()).collect()
            }
            EquipmentKind::BoundaryLine => {
                self.boundary_lines.iter().map(|e| e.id.as_str()).collect()
            }
        }
    }

    pub fn kind_of(&self, id: &str) -> Option<EquipmentKind> {
        self.lookup.get(id).map(|(kind, _)| *kind)
    }

    fn index_of(&self, equipment: &EquipmentRef) -> GridMapResult<usize> {
        match self.lookup.get(&equipment.id) {
            Some((kind, index)) if *kind == equipment.kind => Ok(*index),
            Some((kind, _)) => Err(GridMapError::Network(format!(
                "equipment '{}' is a {kind}, not a {}",
                equipment.id, equipment.kind
            ))),
            None => Err(GridMapError::Network(format!(
                "{} '{}' not found",
                equipment.kind, equipment.id
            ))),
        }
    }

    pub fn equipment(&self, equipment: &EquipmentRef) -> GridMapResult<Equipment<'_>> {
        let index = self.index_of(equipment)?;
        Ok(match equipment.kind {
            EquipmentKind::Generator => Equipment::Generator(&self.generators[index]),
            EquipmentKind::Load => Equipment::Load(&self.loads[index]),
            EquipmentKind::HvdcLine => Equipment::HvdcLine(&self.hvdc_lines[index]),
            EquipmentKind::Switch => Equipment::Switch(&self.switches[index]),
            EquipmentKind::PhaseShiftingTransformer => {
                Equipment::PhaseShiftingTransformer(&self.phase_shifters[index])
            }
            EquipmentKind::BoundaryLine => Equipment::BoundaryLine(&self.boundary_lines[index]),
        })
    }

    pub fn equipment_mut(&mut self, equipment: &EquipmentRef) -> GridMapResult<EquipmentMut<'_>> {
        let index = self.index_of(equipment)?;
        Ok(match equipment.kind {
            EquipmentKind::Generator => EquipmentMut::Generator(&mut self.generators[index]),
            EquipmentKind::Load => EquipmentMut::Load(&mut self.loads[index]),
            EquipmentKind::HvdcLine => EquipmentMut::HvdcLine(&mut self.hvdc_lines[index]),
            EquipmentKind::Switch => EquipmentMut::Switch(&mut self.switches[index]),
            EquipmentKind::PhaseShiftingTransformer => {
                EquipmentMut::PhaseShiftingTransformer(&mut self.phase_shifters[index])
            }
            EquipmentKind::BoundaryLine => {
                EquipmentMut::BoundaryLine(&mut self.boundary_lines[index])
            }
        })
    }

    pub fn generator(&self, id: &str) -> GridMapResult<&Generator> {
        let index = self.index_of(&EquipmentRef::new(EquipmentKind::Generator, id))?;
        Ok(&self.generators[index])
    }

    pub fn generator_mut(&mut self, id: &str) -> GridMapResult<&mut Generator> {
        let index = self.index_of(&EquipmentRef::new(EquipmentKind::Generator, id))?;
        Ok(&mut self.generators[index])
    }

    pub fn load(&self, id: &str) -> GridMapResult<&Load> {
        let index = self.index_of(&EquipmentRef::new(EquipmentKind::Load, id))?;
        Ok(&self.loads[index])
    }

    pub fn hvdc_line(&self, id: &str) -> GridMapResult<&HvdcLine> {
        let index = self.index_of(&EquipmentRef::new(EquipmentKind::HvdcLine, id))?;
        Ok(&self.hvdc_lines[index])
    }

    pub fn hvdc_line_mut(&mut self, id: &str) -> GridMapResult<&mut HvdcLine> {
        let index = self.index_of(&EquipmentRef::new(EquipmentKind::HvdcLine, id))?;
        Ok(&mut self.hvdc_lines[index])
    }

    pub fn boundary_line(&self, id: &str) -> GridMapResult<&BoundaryLine> {
        let index = self.index_of(&EquipmentRef::new(EquipmentKind::BoundaryLine, id))?;
        Ok(&self.boundary_lines[index])
    }

    // ------------------------------------------------------------------------
    // Variants
    // ------------------------------------------------------------------------

    pub fn working_variant_id(&self) -> &str {
        &self.variants.working
    }

    pub fn variant_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.variants.parked.keys().cloned().collect();
        ids.push(self.variants.working.clone());
        ids.sort();
        ids
    }

    fn capture_state(&self) -> VariantState {
        VariantState {
            generators: self.generators.iter().map(|g| g.state.clone()).collect(),
            loads: self.loads.iter().map(|l| l.state.clone()).collect(),
            hvdc_lines: self.hvdc_lines.iter().map(|h| h.state.clone()).collect(),
            switches: self.switches.iter().map(|s| s.open).collect(),
            phase_shifters: self.phase_shifters.iter().map(|t| t.state.clone()).collect(),
            boundary_lines: self.boundary_lines.iter().map(|b| b.p0).collect(),
        }
    }

    fn install_state(&mut self, state: VariantState) {
        for (g, s) in self.generators.iter_mut().zip(state.generators) {
            g.state = s;
        }
        for (l, s) in self.loads.iter_mut().zip(state.loads) {
            l.state = s;
        }
        for (h, s) in self.hvdc_lines.iter_mut().zip(state.hvdc_lines) {
            h.state = s;
        }
        for (sw, open) in self.switches.iter_mut().zip(state.switches) {
            sw.open = open;
        }
        for (t, s) in self.phase_shifters.iter_mut().zip(state.phase_shifters) {
            t.state = s;
        }
        for (b, p0) in self.boundary_lines.iter_mut().zip(state.boundary_lines) {
            b.p0 = p0;
        }
    }

    /// Copy the state of `source` into a new variant `target`.
    pub fn clone_variant(&mut self, source: &str, target: &str) -> GridMapResult<()> {
        if target == self.variants.working || self.variants.parked.contains_key(target) {
            return Err(GridMapError::Network(format!(
                "variant '{target}' already exists"
            )));
        }
        let state = if source == self.variants.working {
            self.capture_state()
        } else {
            self.variants
                .parked
                .get(source)
                .cloned()
                .ok_or_else(|| GridMapError::Network(format!("variant '{source}' not found")))?
        };
        self.variants.parked.insert(target.to_string(), state);
        debug!(network = %self.id, source, target, "variant cloned");
        Ok(())
    }

    pub fn set_working_variant(&mut self, id: &str) -> GridMapResult<()> {
        if id == self.variants.working {
            return Ok(());
        }
        let next = self
            .variants
            .parked
            .remove(id)
            .ok_or_else(|| GridMapError::Network(format!("variant '{id}' not found")))?;
        let current = self.capture_state();
        let previous = std::mem::replace(&mut self.variants.working, id.to_string());
        self.variants.parked.insert(previous, current);
        self.install_state(next);
        Ok(())
    }

    pub fn remove_variant(&mut self, id: &str) -> GridMapResult<()> {
        if id == INITIAL_VARIANT_ID || id == self.variants.working {
            return Err(GridMapError::Network(format!(
                "cannot remove variant '{id}' while it is the initial or working variant"
            )));
        }
        self.variants
            .parked
            .remove(id)
            .ok_or_else(|| GridMapError::Network(format!("variant '{id}' not found")))?;
        debug!(network = %self.id, variant = id, "variant removed");
        Ok(())
    }

    /// Save the attributes that variants do not isolate.
    pub fn save_limits(&self) -> LimitSnapshot {
        LimitSnapshot {
            generators: self.generators.iter().map(|g| (g.min_p, g.max_p)).collect(),
            hvdc_lines: self
                .hvdc_lines
                .iter()
                .map(|h| (h.max_p, h.power_range))
                .collect(),
        }
    }

    /// Put back limits saved by [`Network::save_limits`]; a range extension
    /// that did not exist at save time is removed.
    pub fn restore_limits(&mut self, snapshot: &LimitSnapshot) {
        for (g, (min_p, max_p)) in self.generators.iter_mut().zip(&snapshot.generators) {
            g.min_p = *min_p;
            g.max_p = *max_p;
        }
        for (h, (max_p, range)) in self.hvdc_lines.iter_mut().zip(&snapshot.hvdc_lines) {
            h.max_p = *max_p;
            h.power_range = *range;
        }
        debug!(network = %self.id, "limits restored");
    }
}
