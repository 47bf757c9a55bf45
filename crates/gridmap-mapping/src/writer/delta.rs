//! Line-oriented delta of each point against the base case.
//!
//! One file per version:
//!
//! ```text
//! NT;3;
//! -1;CONELE;1;L1;25;
//! 0;PRODIM;2;G1;80;G2;40.5;
//! 1;
//! 2;QUADIN;1;LINE1;
//! ```
//!
//! The header carries the number of points; the base case is written first
//! under point `-1` and only when something differs. A point without any
//! difference is a bare `<point>;` line.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use gridmap_core::{
    EquipmentKind, EquipmentVariable, GridMapError, GridMapResult, LoadDetail, MappingVariable,
    MetrixVariable, Network, SWITCH_OPEN,
};
use tracing::{debug, warn};

use crate::config::ContingencySpec;
use crate::log::BASE_CASE_POINT;
use crate::observer::{MappedValue, MappingObserver};
use crate::timeseries::TimeSeriesTable;

const SEPARATOR: char = ';';

/// Record kinds, in the order they are written within a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeltaRecord {
    OpenBranches,
    GeneratorTargetP,
    GeneratorMinP,
    GeneratorMaxP,
    HvdcSetpoint,
    HvdcMaxP,
    HvdcMinP,
    LoadP0,
    PhaseTap,
    OffGridCostDown,
    OffGridCostUp,
    OnGridCostDown,
    OnGridCostUp,
    CurativeCostDown,
    ThresholdN,
    ThresholdN1,
    ThresholdNk,
    ThresholdItam,
    ThresholdItamNk,
    ThresholdNEndOr,
    ThresholdN1EndOr,
    ThresholdNkEndOr,
    ThresholdItamEndOr,
    ThresholdItamNkEndOr,
    ContingencyProbability,
}

impl DeltaRecord {
    pub fn tag(&self) -> &'static str {
        match self {
            DeltaRecord::OpenBranches => "QUADIN",
            DeltaRecord::GeneratorTargetP => "PRODIM",
            DeltaRecord::GeneratorMinP => "TRPUIMIN",
            DeltaRecord::GeneratorMaxP => "TRVALPMD",
            DeltaRecord::HvdcSetpoint => "DCIMPPUI",
            DeltaRecord::HvdcMaxP => "DCMAXPUI",
            DeltaRecord::HvdcMinP => "DCMINPUI",
            DeltaRecord::LoadP0 => "CONELE",
            DeltaRecord::PhaseTap => "DTVALDEP",
            DeltaRecord::OffGridCostDown => "COUBHR",
            DeltaRecord::OffGridCostUp => "CTORDR",
            DeltaRecord::OnGridCostDown => "COUBAR",
            DeltaRecord::OnGridCostUp => "COUHAR",
            DeltaRecord::CurativeCostDown => "COUEFF",
            DeltaRecord::ThresholdN => "QATI00MN",
            DeltaRecord::ThresholdN1 => "QATI5MNS",
            DeltaRecord::ThresholdNk => "QATI20MN",
            DeltaRecord::ThresholdItam => "QATITAMN",
            DeltaRecord::ThresholdItamNk => "QATITAMK",
            DeltaRecord::ThresholdNEndOr => "QATI00MN2",
            DeltaRecord::ThresholdN1EndOr => "QATI5MNS2",
            DeltaRecord::ThresholdNkEndOr => "QATI20MN2",
            DeltaRecord::ThresholdItamEndOr => "QATITAMN2",
            DeltaRecord::ThresholdItamNkEndOr => "QATITAMK2",
            DeltaRecord::ContingencyProbability => "PROBABINC",
        }
    }

    /// Record of an equipment variable, `None` when it has no delta form.
    pub fn for_variable(kind: EquipmentKind, variable: MappingVariable) -> Option<Self> {
        use EquipmentVariable as V;
        match variable {
            MappingVariable::Metrix(metrix) => Self::for_metrix(metrix),
            MappingVariable::Equipment(v) => match (kind, v) {
                (EquipmentKind::Generator, V::TargetP) => Some(DeltaRecord::GeneratorTargetP),
                (EquipmentKind::Generator, V::MinP) => Some(DeltaRecord::GeneratorMinP),
                (EquipmentKind::Generator, V::MaxP) => Some(DeltaRecord::GeneratorMaxP),
                (EquipmentKind::HvdcLine, V::ActivePowerSetpoint) => Some(DeltaRecord::HvdcSetpoint),
                (EquipmentKind::HvdcLine, V::MaxP) => Some(DeltaRecord::HvdcMaxP),
                (EquipmentKind::HvdcLine, V::MinP) => Some(DeltaRecord::HvdcMinP),
                (EquipmentKind::Load, V::P0) => Some(DeltaRecord::LoadP0),
                (EquipmentKind::PhaseShiftingTransformer, V::PhaseTapPosition) => {
                    Some(DeltaRecord::PhaseTap)
                }
                (EquipmentKind::Switch, V::Open) => Some(DeltaRecord::OpenBranches),
                _ => None,
            },
        }
    }

    fn for_metrix(variable: MetrixVariable) -> Option<Self> {
        use MetrixVariable as M;
        Some(match variable {
            M::OffGridCostDown => DeltaRecord::OffGridCostDown,
            M::OffGridCostUp => DeltaRecord::OffGridCostUp,
            M::OnGridCostDown => DeltaRecord::OnGridCostDown,
            M::OnGridCostUp => DeltaRecord::OnGridCostUp,
            M::CurativeCostDown => DeltaRecord::CurativeCostDown,
            M::ThresholdN => DeltaRecord::ThresholdN,
            M::ThresholdN1 => DeltaRecord::ThresholdN1,
            M::ThresholdNk => DeltaRecord::ThresholdNk,
            M::ThresholdItam => DeltaRecord::ThresholdItam,
            M::ThresholdItamNk => DeltaRecord::ThresholdItamNk,
            M::ThresholdNEndOr => DeltaRecord::ThresholdNEndOr,
            M::ThresholdN1EndOr => DeltaRecord::ThresholdN1EndOr,
            M::ThresholdNkEndOr => DeltaRecord::ThresholdNkEndOr,
            M::ThresholdItamEndOr => DeltaRecord::ThresholdItamEndOr,
            M::ThresholdItamNkEndOr => DeltaRecord::ThresholdItamNkEndOr,
            M::AnalysisThresholdN
            | M::AnalysisThresholdNk
            | M::AnalysisThresholdNEndOr
            | M::AnalysisThresholdNkEndOr => return None,
        })
    }

    fn format(&self, value: f64) -> String {
        match self {
            DeltaRecord::PhaseTap => format!("{}", value.round() as i64),
            DeltaRecord::ContingencyProbability => trim_decimals(format!("{value:.3}")),
            _ => trim_decimals(format!("{value:.1}")),
        }
    }
}

fn trim_decimals(rendered: String) -> String {
    if !rendered.contains('.') {
        return rendered;
    }
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

/// Values equal once rounded to one decimal.
fn same_value(a: f64, b: f64) -> bool {
    (a * 10.0).round() == (b * 10.0).round()
}

/// `<dir>/variants_<version>.csv`
pub fn delta_file_name(version: i32) -> String {
    format!("variants_{version}.csv")
}

/// Writes one delta file per version.
#[derive(Debug)]
pub struct DeltaWriter {
    out_dir: PathBuf,
    point_count: usize,
    contingencies: Vec<ContingencySpec>,
    reference: Option<Network>,
    file: Option<(PathBuf, BufWriter<File>)>,
    records: BTreeMap<DeltaRecord, Vec<(String, Option<f64>)>>,
    load_details: BTreeMap<String, LoadDetail>,
    written: Vec<PathBuf>,
}

impl DeltaWriter {
    /// `point_count` is the number of points evaluated per version.
    pub fn new(
        out_dir: impl Into<PathBuf>,
        point_count: usize,
        contingencies: Vec<ContingencySpec>,
    ) -> Self {
        Self {
            out_dir: out_dir.into(),
            point_count,
            contingencies,
            reference: None,
            file: None,
            records: BTreeMap::new(),
            load_details: BTreeMap::new(),
            written: Vec::new(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Delta files closed so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn push(&mut self, record: DeltaRecord, id: &str, value: Option<f64>) {
        self.records
            .entry(record)
            .or_default()
            .push((id.to_string(), value));
    }

    fn reference(&self) -> GridMapResult<&Network> {
        self.reference
            .as_ref()
            .ok_or_else(|| GridMapError::Export("delta reference network not captured".to_string()))
    }

    /// Base-case value the mapped value is compared with, `None` when the
    /// value is always written.
    fn base_value(&self, value: &MappedValue<'_>, record: DeltaRecord) -> GridMapResult<Option<f64>> {
        let id = value.equipment.id.as_str();
        let reference = self.reference()?;
        Ok(match record {
            DeltaRecord::GeneratorTargetP => Some(reference.generator(id)?.state.target_p),
            DeltaRecord::GeneratorMinP => Some(reference.generator(id)?.min_p),
            DeltaRecord::GeneratorMaxP => Some(reference.generator(id)?.max_p),
            DeltaRecord::HvdcSetpoint => Some(reference.hvdc_line(id)?.setpoint()),
            DeltaRecord::HvdcMaxP => Some(reference.hvdc_line(id)?.max()),
            DeltaRecord::HvdcMinP => Some(reference.hvdc_line(id)?.min()),
            DeltaRecord::LoadP0 => Some(reference.load(id)?.state.p0),
            DeltaRecord::PhaseTap => reference
                .equipment(value.equipment)?
                .value(EquipmentVariable::PhaseTapPosition),
            _ => None,
        })
    }

    fn add_load_component(
        &mut self,
        id: &str,
        variable: EquipmentVariable,
        value: f64,
    ) -> GridMapResult<()> {
        if !self.load_details.contains_key(id) {
            let detail = self.reference()?.load(id)?.state.detail.unwrap_or_default();
            // components restart from the base case without reactive parts
            let detail = LoadDetail {
                fixed_active_power: detail.fixed_active_power,
                variable_active_power: detail.variable_active_power,
                ..LoadDetail::default()
            };
            self.load_details.insert(id.to_string(), detail);
        }
        if let Some(detail) = self.load_details.get_mut(id) {
            if variable == EquipmentVariable::FixedActivePower {
                detail.fixed_active_power = value;
            } else {
                detail.variable_active_power = value;
            }
        }
        Ok(())
    }

    fn flush_loads(&mut self) -> GridMapResult<()> {
        let details = std::mem::take(&mut self.load_details);
        for (id, detail) in details {
            let p0 = detail.fixed_active_power + detail.variable_active_power;
            if !same_value(p0, self.reference()?.load(&id)?.state.p0) {
                self.push(DeltaRecord::LoadP0, &id, Some(p0));
            }
        }
        Ok(())
    }

    fn write_point(&mut self, point: i32) -> GridMapResult<()> {
        let records = std::mem::take(&mut self.records);
        let (_, out) = self
            .file
            .as_mut()
            .ok_or_else(|| GridMapError::Export("delta file not open".to_string()))?;
        for (record, values) in &records {
            write!(out, "{point}{SEPARATOR}{}{SEPARATOR}{}", record.tag(), values.len())?;
            for (id, value) in values {
                write!(out, "{SEPARATOR}{id}")?;
                if let Some(value) = value {
                    write!(out, "{SEPARATOR}{}", record.format(*value))?;
                }
            }
            writeln!(out, "{SEPARATOR}")?;
        }
        if records.is_empty() && point != BASE_CASE_POINT {
            writeln!(out, "{point}{SEPARATOR}")?;
        }
        Ok(())
    }
}

impl MappingObserver for DeltaWriter {
    fn version_start(&mut self, _network: &mut Network, version: i32) -> GridMapResult<()> {
        fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join(delta_file_name(version));
        let mut out = BufWriter::new(File::create(&path)?);
        writeln!(out, "NT{SEPARATOR}{}{SEPARATOR}", self.point_count)?;
        self.file = Some((path, out));
        Ok(())
    }

    fn point_start(
        &mut self,
        network: &mut Network,
        point: i32,
        _table: &TimeSeriesTable,
    ) -> GridMapResult<()> {
        if point == BASE_CASE_POINT {
            self.reference = Some(network.clone());
        }
        self.records.clear();
        self.load_details.clear();
        Ok(())
    }

    fn value_mapped(&mut self, _network: &mut Network, value: &MappedValue<'_>) -> GridMapResult<()> {
        let id = value.equipment.id.as_str();
        if let MappingVariable::Equipment(
            component @ (EquipmentVariable::FixedActivePower | EquipmentVariable::VariableActivePower),
        ) = value.variable
        {
            return self.add_load_component(id, component, value.value);
        }

        let Some(record) = DeltaRecord::for_variable(value.equipment.kind, value.variable) else {
            warn!(variable = %value.variable, id, "unrecognized delta key");
            return Ok(());
        };
        if record == DeltaRecord::OpenBranches {
            if value.value == SWITCH_OPEN {
                let branch = self
                    .reference()?
                    .switches()
                    .iter()
                    .find(|s| s.id == id)
                    .and_then(|s| s.branch.clone());
                if let Some(branch) = branch {
                    self.push(record, &branch, None);
                }
            }
            return Ok(());
        }
        match self.base_value(value, record)? {
            Some(base) if same_value(value.value, base) => {}
            _ => self.push(record, id, Some(value.value)),
        }
        Ok(())
    }

    fn map_point(
        &mut self,
        _network: &mut Network,
        version: i32,
        point: usize,
        table: &TimeSeriesTable,
    ) -> GridMapResult<()> {
        let mut probabilities = Vec::new();
        for contingency in &self.contingencies {
            if let Some(name) = &contingency.probability_timeseries {
                let column = table.column(name)?;
                probabilities.push((contingency.id.clone(), table.value(version, column, point)));
            }
        }
        for contingency in &self.contingencies {
            if let (Some(probability), None) =
                (contingency.probability, &contingency.probability_timeseries)
            {
                probabilities.push((contingency.id.clone(), probability));
            }
        }
        for (id, probability) in probabilities {
            self.push(DeltaRecord::ContingencyProbability, &id, Some(probability));
        }
        Ok(())
    }

    fn point_end(
        &mut self,
        _network: &mut Network,
        point: i32,
        _table: &TimeSeriesTable,
        _balance: f64,
    ) -> GridMapResult<()> {
        self.flush_loads()?;
        self.write_point(point)
    }

    fn version_end(&mut self, _network: &mut Network, version: i32) -> GridMapResult<()> {
        if let Some((path, mut out)) = self.file.take() {
            out.flush()?;
            debug!(path = %path.display(), version, "delta file written");
            self.written.push(path);
        }
        self.reference = None;
        Ok(())
    }
}
