//! Mapping Index: configuration resolved against a network and a time-series
//! table.
//!
//! Built once per run and read-only afterwards. Building validates the whole
//! configuration, so every configuration error surfaces before the first
//! point is evaluated.

use std::collections::{BTreeMap, BTreeSet};

use gridmap_core::{
    check_compatible, resolve, EquipmentKind, EquipmentRef, EquipmentVariable, GridMapError,
    GridMapResult, MappingVariable, Network,
};

use crate::config::{DistributionKeySpec, MappingConfig};
use crate::timeseries::TimeSeriesTable;

/// (variable, equipment id): unique per mapped attribute.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MappingKey {
    pub variable: MappingVariable,
    pub id: String,
}

impl MappingKey {
    pub fn new(variable: impl Into<MappingVariable>, id: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistributionKey {
    Number(f64),
    /// Absolute value of another series at the evaluated point.
    Column(usize),
}

impl DistributionKey {
    pub fn weight(&self, table: &TimeSeriesTable, version: i32, point: usize) -> f64 {
        match self {
            DistributionKey::Number(value) => *value,
            DistributionKey::Column(column) => table.value(version, *column, point).abs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappedEquipment {
    pub equipment: EquipmentRef,
    pub key: DistributionKey,
}

/// One time series distributed over equipment of one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingGroup {
    pub timeseries: String,
    pub column: usize,
    pub kind: EquipmentKind,
    pub variable: MappingVariable,
    pub equipments: Vec<MappedEquipment>,
}

impl MappingGroup {
    pub fn has_timeseries_keys(&self) -> bool {
        self.equipments
            .iter()
            .any(|e| matches!(e.key, DistributionKey::Column(_)))
    }
}

/// One time series copied onto a set of (equipment, variable) pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectMapping {
    pub timeseries: String,
    pub column: usize,
    pub targets: Vec<(EquipmentRef, MappingVariable)>,
}

/// Equipment whose attribute keeps its base-case value because no series
/// drives it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnmappedEquipments {
    pub generators: BTreeSet<String>,
    pub generators_min_p: BTreeSet<String>,
    pub generators_max_p: BTreeSet<String>,
    pub loads: BTreeSet<String>,
    pub loads_fixed_active_power: BTreeSet<String>,
    pub loads_variable_active_power: BTreeSet<String>,
    pub boundary_lines: BTreeSet<String>,
    pub hvdc_lines: BTreeSet<String>,
    pub hvdc_lines_min_p: BTreeSet<String>,
    pub hvdc_lines_max_p: BTreeSet<String>,
}

impl UnmappedEquipments {
    fn from_network(network: &Network) -> Self {
        let ids = |kind| -> BTreeSet<String> {
            network.ids_of_kind(kind).into_iter().map(str::to_string).collect()
        };
        let generators = ids(EquipmentKind::Generator);
        let loads = ids(EquipmentKind::Load);
        let hvdc_lines = ids(EquipmentKind::HvdcLine);
        Self {
            generators_min_p: generators.clone(),
            generators_max_p: generators.clone(),
            generators,
            loads_fixed_active_power: loads.clone(),
            loads_variable_active_power: loads.clone(),
            loads,
            boundary_lines: ids(EquipmentKind::BoundaryLine),
            hvdc_lines_min_p: hvdc_lines.clone(),
            hvdc_lines_max_p: hvdc_lines.clone(),
            hvdc_lines,
        }
    }

    fn mark_mapped(&mut self, kind: EquipmentKind, variable: EquipmentVariable, id: &str) {
        use EquipmentVariable as V;
        match (kind, variable) {
            (EquipmentKind::Generator, V::TargetP) => {
                self.generators.remove(id);
            }
            (EquipmentKind::Generator, V::MinP) => {
                self.generators_min_p.remove(id);
            }
            (EquipmentKind::Generator, V::MaxP) => {
                self.generators_max_p.remove(id);
            }
            (EquipmentKind::Load, V::P0) => {
                self.loads.remove(id);
                self.loads_fixed_active_power.remove(id);
                self.loads_variable_active_power.remove(id);
            }
            (EquipmentKind::Load, V::FixedActivePower) => {
                self.loads.remove(id);
                self.loads_fixed_active_power.remove(id);
            }
            (EquipmentKind::Load, V::VariableActivePower) => {
                self.loads.remove(id);
                self.loads_variable_active_power.remove(id);
            }
            (EquipmentKind::BoundaryLine, V::P0) => {
                self.boundary_lines.remove(id);
            }
            (EquipmentKind::HvdcLine, V::ActivePowerSetpoint) => {
                self.hvdc_lines.remove(id);
            }
            (EquipmentKind::HvdcLine, V::MinP) => {
                self.hvdc_lines_min_p.remove(id);
            }
            (EquipmentKind::HvdcLine, V::MaxP) => {
                self.hvdc_lines_max_p.remove(id);
            }
            _ => {}
        }
    }
}

/// Evaluation order of group kinds within a point.
pub(crate) fn kind_rank(kind: EquipmentKind) -> usize {
    match kind {
        EquipmentKind::Load => 0,
        EquipmentKind::Generator => 1,
        EquipmentKind::BoundaryLine => 2,
        EquipmentKind::HvdcLine => 3,
        EquipmentKind::PhaseShiftingTransformer => 4,
        EquipmentKind::Switch => 5,
    }
}

#[derive(Debug, Clone)]
pub struct MappingIndex {
    groups: Vec<MappingGroup>,
    direct: Vec<DirectMapping>,
    unmapped: UnmappedEquipments,
    keys: BTreeMap<MappingKey, String>,
    ignore_limits: BTreeSet<String>,
}

impl MappingIndex {
    /// Resolve `config` against `network` and `table`. Configuration constants
    /// must already be in the table.
    pub fn build(
        config: &MappingConfig,
        network: &Network,
        table: &TimeSeriesTable,
    ) -> GridMapResult<Self> {
        let mut unmapped = UnmappedEquipments::from_network(network);
        let mut keys: BTreeMap<MappingKey, String> = BTreeMap::new();
        let mut groups: Vec<MappingGroup> = Vec::new();

        for spec in &config.mappings {
            let variable = resolve(spec.kind, spec.variable)?;
            let column = covered_column(table, &spec.timeseries)?;
            let mut equipments = Vec::with_capacity(spec.equipments.len());
            for entry in &spec.equipments {
                let equipment = lookup(network, spec.kind, entry.id())?;
                let key = match entry.key() {
                    None => DistributionKey::Number(1.0),
                    Some(DistributionKeySpec::Number(value)) => {
                        if !value.is_finite() || *value < 0.0 {
                            return Err(GridMapError::Config(format!(
                                "malformed distribution key {value} for '{}' in mapping of '{}'",
                                entry.id(),
                                spec.timeseries
                            )));
                        }
                        DistributionKey::Number(*value)
                    }
                    Some(DistributionKeySpec::TimeSeries(name)) => {
                        let column = table.column(name).map_err(|_| {
                            GridMapError::Config(format!(
                                "distribution key time series '{name}' of '{}' not found",
                                entry.id()
                            ))
                        })?;
                        ensure_covered(table, name, column)?;
                        DistributionKey::Column(column)
                    }
                };
                register(&mut keys, variable, &equipment.id, &spec.timeseries)?;
                if let Some(v) = variable.equipment() {
                    unmapped.mark_mapped(spec.kind, v, &equipment.id);
                }
                equipments.push(MappedEquipment { equipment, key });
            }

            match groups.iter_mut().find(|g| {
                g.column == column && g.kind == spec.kind && g.variable == variable
            }) {
                Some(group) => group.equipments.extend(equipments),
                None => groups.push(MappingGroup {
                    timeseries: spec.timeseries.clone(),
                    column,
                    kind: spec.kind,
                    variable,
                    equipments,
                }),
            }
        }
        groups.sort_by_key(|g| kind_rank(g.kind));

        let mut direct: Vec<DirectMapping> = Vec::new();
        for spec in &config.equipment_timeseries {
            check_compatible(spec.kind, spec.variable)?;
            let column = covered_column(table, &spec.timeseries)?;
            let mut targets = Vec::with_capacity(spec.equipments.len());
            for id in &spec.equipments {
                let equipment = lookup(network, spec.kind, id)?;
                register(&mut keys, spec.variable, id, &spec.timeseries)?;
                targets.push((equipment, spec.variable));
            }
            match direct.iter_mut().find(|d| d.column == column) {
                Some(mapping) => mapping.targets.extend(targets),
                None => direct.push(DirectMapping {
                    timeseries: spec.timeseries.clone(),
                    column,
                    targets,
                }),
            }
        }

        for name in &config.ignore_limits_timeseries {
            table.column(name)?;
        }
        for contingency in &config.contingencies {
            match (&contingency.probability, &contingency.probability_timeseries) {
                (Some(_), None) => {}
                (None, Some(name)) => {
                    covered_column(table, name)?;
                }
                _ => {
                    return Err(GridMapError::Config(format!(
                        "contingency '{}' needs exactly one of probability and probability_timeseries",
                        contingency.id
                    )))
                }
            }
        }

        Ok(Self {
            groups,
            direct,
            unmapped,
            keys,
            ignore_limits: config.ignore_limits_timeseries.clone(),
        })
    }

    /// Distribution groups in evaluation order.
    pub fn groups(&self) -> &[MappingGroup] {
        &self.groups
    }

    pub fn direct_mappings(&self) -> &[DirectMapping] {
        &self.direct
    }

    pub fn unmapped(&self) -> &UnmappedEquipments {
        &self.unmapped
    }

    /// Every mapped (variable, equipment) with the series that drives it.
    pub fn keys(&self) -> &BTreeMap<MappingKey, String> {
        &self.keys
    }

    pub fn ignores_limits(&self, timeseries: &str) -> bool {
        self.ignore_limits.contains(timeseries)
    }
}

/// A series must have values for every version of the table.
fn ensure_covered(table: &TimeSeriesTable, name: &str, column: usize) -> GridMapResult<()> {
    let missing = table.missing_versions(column);
    if missing.is_empty() {
        return Ok(());
    }
    let versions: Vec<String> = missing.iter().map(i32::to_string).collect();
    Err(GridMapError::Config(format!(
        "time series '{name}' has no values for version(s) {}",
        versions.join(", ")
    )))
}

fn covered_column(table: &TimeSeriesTable, name: &str) -> GridMapResult<usize> {
    let column = table.column(name)?;
    ensure_covered(table, name, column)?;
    Ok(column)
}

fn lookup(network: &Network, kind: EquipmentKind, id: &str) -> GridMapResult<EquipmentRef> {
    match network.kind_of(id) {
        Some(found) if found == kind => Ok(EquipmentRef::new(kind, id)),
        Some(found) => Err(GridMapError::Config(format!(
            "equipment '{id}' is a {found}, not a {kind}"
        ))),
        None => Err(GridMapError::Config(format!("unknown {kind} '{id}'"))),
    }
}

fn register(
    keys: &mut BTreeMap<MappingKey, String>,
    variable: MappingVariable,
    id: &str,
    timeseries: &str,
) -> GridMapResult<()> {
    let key = MappingKey::new(variable, id);
    if let Some(previous) = keys.get(&key) {
        return Err(GridMapError::Config(format!(
            "{variable} of '{id}' is mapped by both '{previous}' and '{timeseries}'"
        )));
    }
    keys.insert(key, timeseries.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DirectMappingSpec, EquipmentEntry, MappingSpec};
    use chrono::{DateTime, Utc};
    use gridmap_core::{Generator, HvdcLine, Load, MetrixVariable};

    fn network() -> Network {
        let mut network = Network::new("net");
        network.add_generator(Generator::new("G1", 0.0, 100.0, 50.0)).unwrap();
        network.add_generator(Generator::new("G2", 0.0, 100.0, 50.0)).unwrap();
        network.add_load(Load::new("L1", 80.0)).unwrap();
        network.add_load(Load::new("L2", 20.0)).unwrap();
        network.add_hvdc_line(HvdcLine::new("H1", 500.0, 100.0)).unwrap();
        network
    }

    fn table() -> TimeSeriesTable {
        let t0: DateTime<Utc> = "2015-01-01T00:00:00Z".parse().unwrap();
        let mut table = TimeSeriesTable::new(vec![t0]);
        for name in ["wind", "demand", "fixed", "share", "cost"] {
            table.add_series(name, 1, vec![1.0]).unwrap();
        }
        table
    }

    fn spec(ts: &str, kind: EquipmentKind, variable: Option<MappingVariable>, ids: &[&str]) -> MappingSpec {
        MappingSpec {
            timeseries: ts.into(),
            kind,
            variable,
            equipments: ids.iter().map(|id| EquipmentEntry::Id(id.to_string())).collect(),
        }
    }

    #[test]
    fn groups_are_ordered_by_kind_and_unmapped_sets_updated() {
        let config = MappingConfig {
            mappings: vec![
                spec("wind", EquipmentKind::Generator, None, &["G1"]),
                spec("demand", EquipmentKind::Load, None, &["L1"]),
                spec(
                    "fixed",
                    EquipmentKind::Load,
                    Some(EquipmentVariable::FixedActivePower.into()),
                    &["L2"],
                ),
            ],
            ..Default::default()
        };
        let index = MappingIndex::build(&config, &network(), &table()).unwrap();
        let kinds: Vec<EquipmentKind> = index.groups().iter().map(|g| g.kind).collect();
        assert_eq!(
            kinds,
            vec![EquipmentKind::Load, EquipmentKind::Load, EquipmentKind::Generator]
        );

        let unmapped = index.unmapped();
        assert!(!unmapped.generators.contains("G1"));
        assert!(unmapped.generators.contains("G2"));
        assert!(unmapped.generators_max_p.contains("G1"));
        assert!(!unmapped.loads.contains("L1"));
        assert!(!unmapped.loads_fixed_active_power.contains("L1"));
        assert!(!unmapped.loads.contains("L2"));
        assert!(!unmapped.loads_fixed_active_power.contains("L2"));
        assert!(unmapped.loads_variable_active_power.contains("L2"));
        assert!(unmapped.hvdc_lines.contains("H1"));
    }

    #[test]
    fn same_series_merges_into_one_group() {
        let config = MappingConfig {
            mappings: vec![
                spec("wind", EquipmentKind::Generator, None, &["G1"]),
                spec("wind", EquipmentKind::Generator, None, &["G2"]),
            ],
            ..Default::default()
        };
        let index = MappingIndex::build(&config, &network(), &table()).unwrap();
        assert_eq!(index.groups().len(), 1);
        assert_eq!(index.groups()[0].equipments.len(), 2);
    }

    #[test]
    fn incompatible_variable_is_config_error() {
        let config = MappingConfig {
            mappings: vec![spec(
                "wind",
                EquipmentKind::Generator,
                Some(EquipmentVariable::Open.into()),
                &["G1"],
            )],
            ..Default::default()
        };
        let err = MappingIndex::build(&config, &network(), &table()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn unknown_equipment_and_wrong_kind() {
        let config = MappingConfig {
            mappings: vec![spec("wind", EquipmentKind::Generator, None, &["NOPE"])],
            ..Default::default()
        };
        assert!(MappingIndex::build(&config, &network(), &table()).unwrap_err().is_config());

        let config = MappingConfig {
            mappings: vec![spec("wind", EquipmentKind::Generator, None, &["L1"])],
            ..Default::default()
        };
        let err = MappingIndex::build(&config, &network(), &table()).unwrap_err();
        assert!(err.to_string().contains("is a load"));
    }

    #[test]
    fn series_missing_a_version_is_config_error() {
        let mut table = table();
        table.add_series("wind", 2, vec![3.0]).unwrap();
        table.add_constant("flat", 7.0).unwrap();
        let config = MappingConfig {
            mappings: vec![
                spec("wind", EquipmentKind::Generator, None, &["G1"]),
                spec("flat", EquipmentKind::Generator, None, &["G2"]),
            ],
            ..Default::default()
        };
        assert!(MappingIndex::build(&config, &network(), &table).is_ok());

        let config = MappingConfig {
            mappings: vec![spec("demand", EquipmentKind::Load, None, &["L1"])],
            ..Default::default()
        };
        let err = MappingIndex::build(&config, &network(), &table).unwrap_err();
        assert!(err.is_config());
        assert!(err
            .to_string()
            .ends_with("time series 'demand' has no values for version(s) 2"));
    }

    #[test]
    fn duplicate_key_rejected() {
        let config = MappingConfig {
            mappings: vec![
                spec("wind", EquipmentKind::Generator, None, &["G1"]),
                spec("demand", EquipmentKind::Generator, None, &["G1"]),
            ],
            ..Default::default()
        };
        let err = MappingIndex::build(&config, &network(), &table()).unwrap_err();
        assert!(err.to_string().contains("mapped by both"));
    }

    #[test]
    fn distribution_keys_resolved() {
        let mut config = MappingConfig {
            mappings: vec![MappingSpec {
                timeseries: "demand".into(),
                kind: EquipmentKind::Load,
                variable: None,
                equipments: vec![
                    EquipmentEntry::Weighted {
                        id: "L1".into(),
                        key: DistributionKeySpec::Number(3.0),
                    },
                    EquipmentEntry::Weighted {
                        id: "L2".into(),
                        key: DistributionKeySpec::TimeSeries("share".into()),
                    },
                ],
            }],
            ..Default::default()
        };
        let table = table();
        let index = MappingIndex::build(&config, &network(), &table).unwrap();
        let group = &index.groups()[0];
        assert_eq!(group.equipments[0].key, DistributionKey::Number(3.0));
        assert_eq!(
            group.equipments[1].key,
            DistributionKey::Column(table.column("share").unwrap())
        );
        assert!(group.has_timeseries_keys());

        config.mappings[0].equipments[0] = EquipmentEntry::Weighted {
            id: "L1".into(),
            key: DistributionKeySpec::Number(-1.0),
        };
        assert!(MappingIndex::build(&config, &network(), &table).unwrap_err().is_config());
    }

    #[test]
    fn direct_mappings_checked() {
        let mut config = MappingConfig {
            equipment_timeseries: vec![DirectMappingSpec {
                timeseries: "cost".into(),
                kind: EquipmentKind::Generator,
                variable: MetrixVariable::OnGridCostUp.into(),
                equipments: vec!["G1".into(), "G2".into()],
            }],
            ..Default::default()
        };
        let index = MappingIndex::build(&config, &network(), &table()).unwrap();
        assert_eq!(index.direct_mappings()[0].targets.len(), 2);
        assert_eq!(index.keys().len(), 2);

        config.equipment_timeseries[0].kind = EquipmentKind::Load;
        config.equipment_timeseries[0].equipments = vec!["L1".into()];
        assert!(MappingIndex::build(&config, &network(), &table()).unwrap_err().is_config());
    }
}
