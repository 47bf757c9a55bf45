//! Equipment variable catalog.
//!
//! Enumerates the physical attributes a time series can drive, which attributes
//! are meaningful for each [`EquipmentKind`], and which attribute a mapping uses
//! when the configuration does not name one. Everything here is pure: the
//! catalog is a fixed table, and a kind/variable mismatch is a configuration
//! error rather than something the evaluator recovers from.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GridMapError, GridMapResult};

/// Equipment kinds the engine knows how to map onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentKind {
    Generator,
    Load,
    HvdcLine,
    Switch,
    PhaseShiftingTransformer,
    BoundaryLine,
}

impl EquipmentKind {
    pub const ALL: [EquipmentKind; 6] = [
        EquipmentKind::Generator,
        EquipmentKind::Load,
        EquipmentKind::HvdcLine,
        EquipmentKind::Switch,
        EquipmentKind::PhaseShiftingTransformer,
        EquipmentKind::BoundaryLine,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentKind::Generator => "generator",
            EquipmentKind::Load => "load",
            EquipmentKind::HvdcLine => "hvdc_line",
            EquipmentKind::Switch => "switch",
            EquipmentKind::PhaseShiftingTransformer => "phase_shifting_transformer",
            EquipmentKind::BoundaryLine => "boundary_line",
        }
    }
}

impl fmt::Display for EquipmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EquipmentKind {
    type Err = GridMapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EquipmentKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                GridMapError::Config(format!(
                    "unknown equipment kind '{s}'; supported values: generator, load, hvdc_line, switch, phase_shifting_transformer, boundary_line"
                ))
            })
    }
}

/// Physical attributes of network equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EquipmentVariable {
    TargetP,
    TargetQ,
    MinP,
    MaxP,
    P0,
    Q0,
    FixedActivePower,
    VariableActivePower,
    FixedReactivePower,
    VariableReactivePower,
    ActivePowerSetpoint,
    Open,
    PhaseTapPosition,
    RatioTapPosition,
    VoltageRegulatorOn,
    TargetV,
    NominalV,
    RegulationMode,
    RatedU1,
    RatedU2,
    LoadTapChangingCapabilities,
    PhaseRegulating,
    RatioRegulating,
    VoltageSetpoint,
    ReactivePowerSetpoint,
    PowerFactor,
    Disconnected,
    TargetDeadband,
}

impl EquipmentVariable {
    pub const ALL: [EquipmentVariable; 28] = [
        EquipmentVariable::TargetP,
        EquipmentVariable::TargetQ,
        EquipmentVariable::MinP,
        EquipmentVariable::MaxP,
        EquipmentVariable::P0,
        EquipmentVariable::Q0,
        EquipmentVariable::FixedActivePower,
        EquipmentVariable::VariableActivePower,
        EquipmentVariable::FixedReactivePower,
        EquipmentVariable::VariableReactivePower,
        EquipmentVariable::ActivePowerSetpoint,
        EquipmentVariable::Open,
        EquipmentVariable::PhaseTapPosition,
        EquipmentVariable::RatioTapPosition,
        EquipmentVariable::VoltageRegulatorOn,
        EquipmentVariable::TargetV,
        EquipmentVariable::NominalV,
        EquipmentVariable::RegulationMode,
        EquipmentVariable::RatedU1,
        EquipmentVariable::RatedU2,
        EquipmentVariable::LoadTapChangingCapabilities,
        EquipmentVariable::PhaseRegulating,
        EquipmentVariable::RatioRegulating,
        EquipmentVariable::VoltageSetpoint,
        EquipmentVariable::ReactivePowerSetpoint,
        EquipmentVariable::PowerFactor,
        EquipmentVariable::Disconnected,
        EquipmentVariable::TargetDeadband,
    ];

    /// Name used in configuration files and log messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentVariable::TargetP => "targetP",
            EquipmentVariable::TargetQ => "targetQ",
            EquipmentVariable::MinP => "minP",
            EquipmentVariable::MaxP => "maxP",
            EquipmentVariable::P0 => "p0",
            EquipmentVariable::Q0 => "q0",
            EquipmentVariable::FixedActivePower => "fixedActivePower",
            EquipmentVariable::VariableActivePower => "variableActivePower",
            EquipmentVariable::FixedReactivePower => "fixedReactivePower",
            EquipmentVariable::VariableReactivePower => "variableReactivePower",
            EquipmentVariable::ActivePowerSetpoint => "activePowerSetpoint",
            EquipmentVariable::Open => "open",
            EquipmentVariable::PhaseTapPosition => "phaseTapPosition",
            EquipmentVariable::RatioTapPosition => "ratioTapPosition",
            EquipmentVariable::VoltageRegulatorOn => "voltageRegulatorOn",
            EquipmentVariable::TargetV => "targetV",
            EquipmentVariable::NominalV => "nominalV",
            EquipmentVariable::RegulationMode => "regulationMode",
            EquipmentVariable::RatedU1 => "ratedU1",
            EquipmentVariable::RatedU2 => "ratedU2",
            EquipmentVariable::LoadTapChangingCapabilities => "loadTapChangingCapabilities",
            EquipmentVariable::PhaseRegulating => "phaseRegulating",
            EquipmentVariable::RatioRegulating => "ratioRegulating",
            EquipmentVariable::VoltageSetpoint => "voltageSetpoint",
            EquipmentVariable::ReactivePowerSetpoint => "reactivePowerSetpoint",
            EquipmentVariable::PowerFactor => "powerFactor",
            EquipmentVariable::Disconnected => "disconnected",
            EquipmentVariable::TargetDeadband => "targetDeadband",
        }
    }

    /// targetP and activePowerSetpoint: the values the resolver may clip.
    pub fn is_power(&self) -> bool {
        matches!(
            self,
            EquipmentVariable::TargetP | EquipmentVariable::ActivePowerSetpoint
        )
    }

    /// Power variables plus the minP/maxP limits that bound them.
    pub fn is_power_or_limit(&self) -> bool {
        self.is_power() || matches!(self, EquipmentVariable::MinP | EquipmentVariable::MaxP)
    }

    /// Load active-power decomposition components.
    pub fn is_load_active_component(&self) -> bool {
        matches!(
            self,
            EquipmentVariable::FixedActivePower | EquipmentVariable::VariableActivePower
        )
    }
}

impl fmt::Display for EquipmentVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Market and security variables forwarded to the optimizer input
/// (costs, thresholds). They are not applied to the network model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetrixVariable {
    OffGridCostDown,
    OffGridCostUp,
    OnGridCostDown,
    OnGridCostUp,
    AnalysisThresholdN,
    AnalysisThresholdNk,
    AnalysisThresholdNEndOr,
    AnalysisThresholdNkEndOr,
    ThresholdN,
    ThresholdN1,
    ThresholdNk,
    #[serde(rename = "thresholdITAM")]
    ThresholdItam,
    #[serde(rename = "thresholdITAMNk")]
    ThresholdItamNk,
    ThresholdNEndOr,
    ThresholdN1EndOr,
    ThresholdNkEndOr,
    #[serde(rename = "thresholdITAMEndOr")]
    ThresholdItamEndOr,
    #[serde(rename = "thresholdITAMNkEndOr")]
    ThresholdItamNkEndOr,
    CurativeCostDown,
}

impl MetrixVariable {
    pub const ALL: [MetrixVariable; 19] = [
        MetrixVariable::OffGridCostDown,
        MetrixVariable::OffGridCostUp,
        MetrixVariable::OnGridCostDown,
        MetrixVariable::OnGridCostUp,
        MetrixVariable::AnalysisThresholdN,
        MetrixVariable::AnalysisThresholdNk,
        MetrixVariable::AnalysisThresholdNEndOr,
        MetrixVariable::AnalysisThresholdNkEndOr,
        MetrixVariable::ThresholdN,
        MetrixVariable::ThresholdN1,
        MetrixVariable::ThresholdNk,
        MetrixVariable::ThresholdItam,
        MetrixVariable::ThresholdItamNk,
        MetrixVariable::ThresholdNEndOr,
        MetrixVariable::ThresholdN1EndOr,
        MetrixVariable::ThresholdNkEndOr,
        MetrixVariable::ThresholdItamEndOr,
        MetrixVariable::ThresholdItamNkEndOr,
        MetrixVariable::CurativeCostDown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetrixVariable::OffGridCostDown => "offGridCostDown",
            MetrixVariable::OffGridCostUp => "offGridCostUp",
            MetrixVariable::OnGridCostDown => "onGridCostDown",
            MetrixVariable::OnGridCostUp => "onGridCostUp",
            MetrixVariable::AnalysisThresholdN => "analysisThresholdN",
            MetrixVariable::AnalysisThresholdNk => "analysisThresholdNk",
            MetrixVariable::AnalysisThresholdNEndOr => "analysisThresholdNEndOr",
            MetrixVariable::AnalysisThresholdNkEndOr => "analysisThresholdNkEndOr",
            MetrixVariable::ThresholdN => "thresholdN",
            MetrixVariable::ThresholdN1 => "thresholdN1",
            MetrixVariable::ThresholdNk => "thresholdNk",
            MetrixVariable::ThresholdItam => "thresholdITAM",
            MetrixVariable::ThresholdItamNk => "thresholdITAMNk",
            MetrixVariable::ThresholdNEndOr => "thresholdNEndOr",
            MetrixVariable::ThresholdN1EndOr => "thresholdN1EndOr",
            MetrixVariable::ThresholdNkEndOr => "thresholdNkEndOr",
            MetrixVariable::ThresholdItamEndOr => "thresholdITAMEndOr",
            MetrixVariable::ThresholdItamNkEndOr => "thresholdITAMNkEndOr",
            MetrixVariable::CurativeCostDown => "curativeCostDown",
        }
    }

    fn is_threshold(&self) -> bool {
        !matches!(
            self,
            MetrixVariable::OffGridCostDown
                | MetrixVariable::OffGridCostUp
                | MetrixVariable::OnGridCostDown
                | MetrixVariable::OnGridCostUp
                | MetrixVariable::CurativeCostDown
        )
    }
}

impl fmt::Display for MetrixVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any attribute a time series can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MappingVariable {
    Equipment(EquipmentVariable),
    Metrix(MetrixVariable),
}

impl MappingVariable {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingVariable::Equipment(v) => v.as_str(),
            MappingVariable::Metrix(v) => v.as_str(),
        }
    }

    pub fn equipment(&self) -> Option<EquipmentVariable> {
        match self {
            MappingVariable::Equipment(v) => Some(*v),
            MappingVariable::Metrix(_) => None,
        }
    }

    pub fn is_power(&self) -> bool {
        self.equipment().is_some_and(|v| v.is_power())
    }

    pub fn is_power_or_limit(&self) -> bool {
        self.equipment().is_some_and(|v| v.is_power_or_limit())
    }
}

impl From<EquipmentVariable> for MappingVariable {
    fn from(v: EquipmentVariable) -> Self {
        MappingVariable::Equipment(v)
    }
}

impl From<MetrixVariable> for MappingVariable {
    fn from(v: MetrixVariable) -> Self {
        MappingVariable::Metrix(v)
    }
}

impl fmt::Display for MappingVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MappingVariable {
    type Err = GridMapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(v) = EquipmentVariable::ALL.iter().find(|v| v.as_str() == s) {
            return Ok(MappingVariable::Equipment(*v));
        }
        if let Some(v) = MetrixVariable::ALL.iter().find(|v| v.as_str() == s) {
            return Ok(MappingVariable::Metrix(*v));
        }
        Err(GridMapError::Config(format!("unknown mapping variable '{s}'")))
    }
}

impl TryFrom<String> for MappingVariable {
    type Error = GridMapError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MappingVariable> for String {
    fn from(v: MappingVariable) -> Self {
        v.as_str().to_string()
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Variable used when a mapping does not name one.
pub fn default_variable(kind: EquipmentKind) -> EquipmentVariable {
    match kind {
        EquipmentKind::Generator => EquipmentVariable::TargetP,
        EquipmentKind::HvdcLine => EquipmentVariable::ActivePowerSetpoint,
        EquipmentKind::Load | EquipmentKind::BoundaryLine => EquipmentVariable::P0,
        EquipmentKind::Switch => EquipmentVariable::Open,
        EquipmentKind::PhaseShiftingTransformer => EquipmentVariable::PhaseTapPosition,
    }
}

/// Default variable set: the default variable, plus the fixed/variable
/// active-power pair for loads.
pub fn default_variables(kind: EquipmentKind) -> BTreeSet<EquipmentVariable> {
    let mut variables = BTreeSet::from([default_variable(kind)]);
    if kind == EquipmentKind::Load {
        variables.insert(EquipmentVariable::FixedActivePower);
        variables.insert(EquipmentVariable::VariableActivePower);
    }
    variables
}

/// Equipment variables meaningful for a kind.
pub fn compatible_variables(kind: EquipmentKind) -> &'static [EquipmentVariable] {
    use EquipmentVariable::*;
    match kind {
        EquipmentKind::Generator => &[
            TargetP,
            TargetQ,
            MinP,
            MaxP,
            VoltageRegulatorOn,
            TargetV,
            Disconnected,
        ],
        EquipmentKind::HvdcLine => &[ActivePowerSetpoint, MinP, MaxP, NominalV],
        EquipmentKind::Load => &[
            P0,
            Q0,
            FixedActivePower,
            VariableActivePower,
            FixedReactivePower,
            VariableReactivePower,
        ],
        EquipmentKind::BoundaryLine => &[P0],
        EquipmentKind::Switch => &[Open],
        EquipmentKind::PhaseShiftingTransformer => &[
            PhaseTapPosition,
            PhaseRegulating,
            RegulationMode,
            TargetDeadband,
        ],
    }
}

fn is_metrix_compatible(kind: EquipmentKind, variable: MetrixVariable) -> bool {
    match kind {
        EquipmentKind::Generator => matches!(
            variable,
            MetrixVariable::OffGridCostDown
                | MetrixVariable::OffGridCostUp
                | MetrixVariable::OnGridCostDown
                | MetrixVariable::OnGridCostUp
        ),
        EquipmentKind::Load => variable == MetrixVariable::CurativeCostDown,
        EquipmentKind::PhaseShiftingTransformer | EquipmentKind::HvdcLine => {
            variable.is_threshold()
        }
        EquipmentKind::Switch | EquipmentKind::BoundaryLine => false,
    }
}

/// Fails with a configuration error when `variable` is not in the kind's
/// compatible set.
pub fn check_compatible(kind: EquipmentKind, variable: MappingVariable) -> GridMapResult<()> {
    let compatible = match variable {
        MappingVariable::Equipment(v) => compatible_variables(kind).contains(&v),
        MappingVariable::Metrix(v) => is_metrix_compatible(kind, v),
    };
    if compatible {
        Ok(())
    } else {
        Err(GridMapError::Config(format!(
            "Variable type {variable} not compatible with equipment type {kind}"
        )))
    }
}

/// Default variable when none is given, otherwise the validated variable.
pub fn resolve(
    kind: EquipmentKind,
    variable: Option<MappingVariable>,
) -> GridMapResult<MappingVariable> {
    match variable {
        None => Ok(default_variable(kind).into()),
        Some(v) => {
            check_compatible(kind, v)?;
            Ok(v)
        }
    }
}

/// Set form of [`resolve`]: an empty request yields [`default_variables`].
pub fn resolve_all(
    kind: EquipmentKind,
    variables: &[MappingVariable],
) -> GridMapResult<BTreeSet<MappingVariable>> {
    if variables.is_empty() {
        return Ok(default_variables(kind).into_iter().map(Into::into).collect());
    }
    variables
        .iter()
        .map(|v| check_compatible(kind, *v).map(|_| *v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_per_kind() {
        assert_eq!(default_variable(EquipmentKind::Generator), EquipmentVariable::TargetP);
        assert_eq!(
            default_variable(EquipmentKind::HvdcLine),
            EquipmentVariable::ActivePowerSetpoint
        );
        assert_eq!(default_variable(EquipmentKind::BoundaryLine), EquipmentVariable::P0);
        assert_eq!(default_variable(EquipmentKind::Switch), EquipmentVariable::Open);
        assert_eq!(
            default_variable(EquipmentKind::PhaseShiftingTransformer),
            EquipmentVariable::PhaseTapPosition
        );
    }

    #[test]
    fn load_default_variables_include_active_components() {
        let vars = default_variables(EquipmentKind::Load);
        assert_eq!(vars.len(), 3);
        assert!(vars.contains(&EquipmentVariable::P0));
        assert!(vars.contains(&EquipmentVariable::FixedActivePower));
        assert!(vars.contains(&EquipmentVariable::VariableActivePower));
        assert_eq!(default_variables(EquipmentKind::Generator).len(), 1);
    }

    #[test]
    fn every_default_is_compatible() {
        for kind in EquipmentKind::ALL {
            for v in default_variables(kind) {
                assert!(check_compatible(kind, v.into()).is_ok(), "{kind} {v}");
            }
        }
    }

    #[test]
    fn incompatible_variable_is_config_error() {
        let err = check_compatible(EquipmentKind::Switch, EquipmentVariable::TargetP.into())
            .unwrap_err();
        assert!(err.is_config());
        assert_eq!(
            err.to_string(),
            "Configuration error: Variable type targetP not compatible with equipment type switch"
        );
    }

    #[test]
    fn resolve_validates_or_defaults() {
        assert_eq!(
            resolve(EquipmentKind::Load, None).unwrap(),
            MappingVariable::Equipment(EquipmentVariable::P0)
        );
        assert_eq!(
            resolve(EquipmentKind::Generator, Some(EquipmentVariable::MaxP.into())).unwrap(),
            MappingVariable::Equipment(EquipmentVariable::MaxP)
        );
        assert!(resolve(EquipmentKind::Generator, Some(EquipmentVariable::P0.into())).is_err());
        assert_eq!(resolve_all(EquipmentKind::Load, &[]).unwrap().len(), 3);
        assert!(resolve_all(
            EquipmentKind::HvdcLine,
            &[EquipmentVariable::MinP.into(), EquipmentVariable::Open.into()]
        )
        .is_err());
    }

    #[test]
    fn metrix_variables_follow_kind() {
        assert!(check_compatible(EquipmentKind::Generator, MetrixVariable::OnGridCostUp.into()).is_ok());
        assert!(check_compatible(
            EquipmentKind::PhaseShiftingTransformer,
            MetrixVariable::ThresholdN1.into()
        )
        .is_ok());
        assert!(check_compatible(EquipmentKind::Switch, MetrixVariable::ThresholdN.into()).is_err());
    }

    #[test]
    fn variable_names_parse_back() {
        for v in EquipmentVariable::ALL {
            assert_eq!(v.as_str().parse::<MappingVariable>().unwrap(), MappingVariable::Equipment(v));
        }
        let parsed: MappingVariable = serde_json::from_str("\"thresholdITAMNk\"").unwrap();
        assert_eq!(parsed, MappingVariable::Metrix(MetrixVariable::ThresholdItamNk));
        assert!("bogus".parse::<MappingVariable>().is_err());
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("HVDC_LINE".parse::<EquipmentKind>().unwrap(), EquipmentKind::HvdcLine);
        assert!("line".parse::<EquipmentKind>().is_err());
    }
}
