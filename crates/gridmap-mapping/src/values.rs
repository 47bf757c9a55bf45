//! Per-version table of every value announced to the observers.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use gridmap_core::{EquipmentRef, GridMapError, GridMapResult, MappingVariable, Network};
use tracing::debug;

use crate::log::{format_decimal, BASE_CASE_POINT};
use crate::observer::{MappedValue, MappingObserver};
use crate::timeseries::TimeSeriesTable;

type Column = (EquipmentRef, MappingVariable);

/// Writes `<prefix><version>.csv` with a `Time;Version;<id>_<variable>...`
/// header. A cell falls back to the constant value of the base case, then to
/// the network value once the base case is complete.
#[derive(Debug)]
pub struct EquipmentValuesWriter {
    out_dir: PathBuf,
    prefix: String,
    constants: BTreeMap<Column, f64>,
    rows: Vec<(DateTime<Utc>, BTreeMap<Column, f64>)>,
    reference: Option<Network>,
    written: Vec<PathBuf>,
}

impl EquipmentValuesWriter {
    pub fn new(out_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            out_dir: out_dir.into(),
            prefix: prefix.into(),
            constants: BTreeMap::new(),
            rows: Vec::new(),
            reference: None,
            written: Vec::new(),
        }
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn fallback(&self, column: &Column) -> f64 {
        if let Some(value) = self.constants.get(column) {
            return *value;
        }
        let (equipment, variable) = column;
        self.reference
            .as_ref()
            .zip(variable.equipment())
            .and_then(|(network, variable)| network.equipment(equipment).ok()?.value(variable))
            .unwrap_or(f64::NAN)
    }

    fn write_version<W: Write>(&self, writer: W, version: i32) -> Result<()> {
        let columns: BTreeSet<&Column> = self
            .constants
            .keys()
            .chain(self.rows.iter().flat_map(|(_, row)| row.keys()))
            .collect();
        let mut csv = csv::WriterBuilder::new()
            .delimiter(b';')
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);
        let mut header = vec!["Time".to_string(), "Version".to_string()];
        header.extend(
            columns
                .iter()
                .map(|(equipment, variable)| format!("{}_{}", equipment.id, variable)),
        );
        csv.write_record(&header)?;
        for (instant, row) in &self.rows {
            let mut record = vec![
                instant.to_rfc3339_opts(SecondsFormat::Secs, true),
                version.to_string(),
            ];
            record.extend(columns.iter().map(|column| {
                let value = row
                    .get(*column)
                    .copied()
                    .unwrap_or_else(|| self.fallback(column));
                format_decimal(value)
            }));
            csv.write_record(&record)?;
        }
        csv.flush()?;
        Ok(())
    }

    fn file_path(&self, version: i32) -> PathBuf {
        self.out_dir.join(format!("{}{version}.csv", self.prefix))
    }

    fn write_file(&self, path: &Path, version: i32) -> Result<()> {
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("creating directory '{}'", self.out_dir.display()))?;
        let file = File::create(path)
            .with_context(|| format!("creating equipment values '{}'", path.display()))?;
        self.write_version(BufWriter::new(file), version)
            .with_context(|| format!("writing equipment values '{}'", path.display()))
    }
}

impl MappingObserver for EquipmentValuesWriter {
    fn version_start(&mut self, _network: &mut Network, _version: i32) -> GridMapResult<()> {
        self.constants.clear();
        self.rows.clear();
        self.reference = None;
        Ok(())
    }

    fn point_start(
        &mut self,
        _network: &mut Network,
        point: i32,
        table: &TimeSeriesTable,
    ) -> GridMapResult<()> {
        if point != BASE_CASE_POINT {
            let instant = table
                .instant(point)
                .ok_or_else(|| GridMapError::Export(format!("no instant for point {point}")))?;
            self.rows.push((instant, BTreeMap::new()));
        }
        Ok(())
    }

    fn value_mapped(&mut self, _network: &mut Network, value: &MappedValue<'_>) -> GridMapResult<()> {
        let column = (value.equipment.clone(), value.variable);
        if value.point == BASE_CASE_POINT {
            self.constants.insert(column, value.value);
        } else if let Some((_, row)) = self.rows.last_mut() {
            row.insert(column, value.value);
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
            self.reference = Some(network.clone());
        }
        Ok(())
    }

    fn version_end(&mut self, _network: &mut Network, version: i32) -> GridMapResult<()> {
        let path = self.file_path(version);
        self.write_file(&path, version)
            .map_err(|e| GridMapError::Export(format!("{e:#}")))?;
        debug!(path = %path.display(), version, "equipment values written");
        self.written.push(path);
        Ok(())
    }
}
