//! Mapping configuration and run parameters.
//!
//! The mapping configuration is produced by an external front end and handed
//! over as a YAML or JSON document:
//!
//! ```yaml
//! mappings:
//!   - timeseries: wind_fr
//!     kind: generator
//!     equipments: [G_WIND_1, { id: G_WIND_2, key: 2.0 }]
//!   - timeseries: demand
//!     kind: load
//!     variable: fixedActivePower
//!     equipments: [{ id: L1, key: share_l1 }]
//! equipment_timeseries:
//!   - timeseries: cost_up
//!     kind: generator
//!     variable: onGridCostUp
//!     equipments: [G_WIND_1]
//! ignore_limits_timeseries: [wind_fr]
//! constants:
//!   flat_100: 100.0
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use gridmap_core::{EquipmentKind, GridMapError, GridMapResult, MappingVariable};
use serde::{Deserialize, Serialize};

/// Weight of one equipment inside a distribution group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DistributionKeySpec {
    Number(f64),
    TimeSeries(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EquipmentEntry {
    Id(String),
    Weighted { id: String, key: DistributionKeySpec },
}

impl EquipmentEntry {
    pub fn id(&self) -> &str {
        match self {
            EquipmentEntry::Id(id) => id,
            EquipmentEntry::Weighted { id, .. } => id,
        }
    }

    pub fn key(&self) -> Option<&DistributionKeySpec> {
        match self {
            EquipmentEntry::Id(_) => None,
            EquipmentEntry::Weighted { key, .. } => Some(key),
        }
    }
}

/// One time series distributed over a list of equipment of the same kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingSpec {
    pub timeseries: String,
    pub kind: EquipmentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<MappingVariable>,
    #[serde(default)]
    pub equipments: Vec<EquipmentEntry>,
}

/// One time series copied as-is onto every listed equipment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectMappingSpec {
    pub timeseries: String,
    pub kind: EquipmentKind,
    pub variable: MappingVariable,
    #[serde(default)]
    pub equipments: Vec<String>,
}

/// Outage probability attached to a contingency, either fixed or read from a
/// time series at every point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContingencySpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability_timeseries: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingConfig {
    #[serde(default)]
    pub mappings: Vec<MappingSpec>,
    #[serde(default)]
    pub equipment_timeseries: Vec<DirectMappingSpec>,
    #[serde(default)]
    pub ignore_limits_timeseries: BTreeSet<String>,
    #[serde(default)]
    pub constants: BTreeMap<String, f64>,
    #[serde(default)]
    pub contingencies: Vec<ContingencySpec>,
}

impl MappingConfig {
    /// Every time series name the configuration reads, distribution keys and
    /// contingency probabilities included.
    pub fn used_timeseries(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        for mapping in &self.mappings {
            names.insert(mapping.timeseries.as_str());
            for entry in &mapping.equipments {
                if let Some(DistributionKeySpec::TimeSeries(name)) = entry.key() {
                    names.insert(name.as_str());
                }
            }
        }
        for direct in &self.equipment_timeseries {
            names.insert(direct.timeseries.as_str());
        }
        for contingency in &self.contingencies {
            if let Some(name) = &contingency.probability_timeseries {
                names.insert(name.as_str());
            }
        }
        names
    }
}

pub fn load_config_from_path(path: &Path) -> Result<MappingConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading mapping config '{}'", path.display()))?;
    parse_document(path, &data, "mapping config")
}

pub fn load_parameters_from_path(path: &Path) -> Result<MapperParameters> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading mapper parameters '{}'", path.display()))?;
    parse_document(path, &data, "mapper parameters")
}

fn parse_document<T: serde::de::DeserializeOwned>(path: &Path, data: &str, what: &str) -> Result<T> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
            serde_yaml::from_str(data).with_context(|| format!("parsing {what} yaml"))
        }
        Some(ext) if ext.eq_ignore_ascii_case("json") => {
            serde_json::from_str(data).with_context(|| format!("parsing {what} json"))
        }
        _ => serde_yaml::from_str(data)
            .or_else(|_| serde_json::from_str(data))
            .with_context(|| format!("parsing {what}")),
    }
}

// ============================================================================
// Run parameters
// ============================================================================

/// What the resolver does with a mapped power outside its limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Clip to the nearest feasible value and log a scaling-down warning.
    #[default]
    ScaleDown,
    /// Keep the mapped value and widen the unmapped limit instead.
    WidenLimits,
}

/// Inclusive range of point indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRange {
    pub first: usize,
    pub last: usize,
}

impl PointRange {
    pub fn new(first: usize, last: usize) -> GridMapResult<Self> {
        if first > last {
            return Err(GridMapError::Config(format!(
                "invalid point range [{first}, {last}]"
            )));
        }
        Ok(Self { first, last })
    }

    pub fn len(&self) -> usize {
        self.last - self.first + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, point: usize) -> bool {
        point >= self.first && point <= self.last
    }

    pub fn points(&self) -> std::ops::RangeInclusive<usize> {
        self.first..=self.last
    }
}

fn default_true() -> bool {
    true
}

fn default_tolerance() -> f64 {
    0.0001
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperParameters {
    /// Versions to evaluate; empty means every version of the table.
    #[serde(default)]
    pub versions: Vec<i32>,
    /// Points to evaluate; `None` means the whole table.
    #[serde(default)]
    pub point_range: Option<PointRange>,
    #[serde(default)]
    pub policy: ResolutionPolicy,
    /// Log instead of failing when a non-zero value maps onto no equipment.
    #[serde(default)]
    pub ignore_empty_filter: bool,
    #[serde(default = "default_true")]
    pub identify_constant_timeseries: bool,
    /// Points over which a series must be flat to count as constant;
    /// `None` means the evaluated points. Chunked runs set it to the whole
    /// batch range so that every chunk splits the series the same way.
    #[serde(default)]
    pub constant_detection_range: Option<PointRange>,
    #[serde(default = "default_tolerance")]
    pub tolerance_threshold: f64,
    /// Render the per-version synthesis into the log at version end.
    #[serde(default = "default_true")]
    pub emit_synthesis: bool,
}

impl Default for MapperParameters {
    fn default() -> Self {
        Self {
            versions: Vec::new(),
            point_range: None,
            policy: ResolutionPolicy::default(),
            ignore_empty_filter: false,
            identify_constant_timeseries: true,
            constant_detection_range: None,
            tolerance_threshold: default_tolerance(),
            emit_synthesis: true,
        }
    }
}

impl MapperParameters {
    pub fn widen_limits(&self) -> bool {
        self.policy == ResolutionPolicy::WidenLimits
    }
}
