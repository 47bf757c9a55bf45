//! Versioned time-series table.
//!
//! All series share one time index. A series either holds one value vector
//! per version, or is a constant injected from the configuration.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use gridmap_core::{GridMapError, GridMapResult};

use crate::config::PointRange;

#[derive(Debug, Clone)]
enum Column {
    Constant(f64),
    Values(BTreeMap<i32, Vec<f64>>),
}

#[derive(Debug, Clone)]
pub struct TimeSeriesTable {
    instants: Vec<DateTime<Utc>>,
    names: Vec<String>,
    lookup: HashMap<String, usize>,
    columns: Vec<Column>,
}

impl TimeSeriesTable {
    pub fn new(instants: Vec<DateTime<Utc>>) -> Self {
        Self {
            instants,
            names: Vec::new(),
            lookup: HashMap::new(),
            columns: Vec::new(),
        }
    }

    pub fn point_count(&self) -> usize {
        self.instants.len()
    }

    pub fn instants(&self) -> &[DateTime<Utc>] {
        &self.instants
    }

    /// Instant of an evaluated point; `None` for the base-case and synthesis
    /// sentinels.
    pub fn instant(&self, point: i32) -> Option<DateTime<Utc>> {
        usize::try_from(point)
            .ok()
            .and_then(|p| self.instants.get(p))
            .copied()
    }

    /// Whole index as a point range, `None` when the table has no point.
    pub fn full_range(&self) -> Option<PointRange> {
        match self.instants.len() {
            0 => None,
            n => Some(PointRange {
                first: 0,
                last: n - 1,
            }),
        }
    }

    /// Versions present in at least one series, ascending.
    pub fn versions(&self) -> Vec<i32> {
        let mut versions: Vec<i32> = self
            .columns
            .iter()
            .filter_map(|c| match c {
                Column::Values(values) => Some(values.keys().copied()),
                Column::Constant(_) => None,
            })
            .flatten()
            .collect();
        versions.sort_unstable();
        versions.dedup();
        versions
    }

    /// Versions of the table the series at `column` has no values for.
    pub fn missing_versions(&self, column: usize) -> Vec<i32> {
        match &self.columns[column] {
            Column::Constant(_) => Vec::new(),
            Column::Values(values) => self
                .versions()
                .into_iter()
                .filter(|version| !values.contains_key(version))
                .collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    fn slot(&mut self, name: &str) -> usize {
        if let Some(&index) = self.lookup.get(name) {
            return index;
        }
        let index = self.columns.len();
        self.names.push(name.to_string());
        self.lookup.insert(name.to_string(), index);
        self.columns.push(Column::Values(BTreeMap::new()));
        index
    }

    pub fn add_series(&mut self, name: &str, version: i32, values: Vec<f64>) -> GridMapResult<()> {
        if values.len() != self.instants.len() {
            return Err(GridMapError::Config(format!(
                "time series '{name}' version {version} has {} values, index has {} points",
                values.len(),
                self.instants.len()
            )));
        }
        let index = self.slot(name);
        match &mut self.columns[index] {
            Column::Values(versions) => {
                versions.insert(version, values);
                Ok(())
            }
            Column::Constant(_) => Err(GridMapError::Config(format!(
                "time series '{name}' is already defined as a constant"
            ))),
        }
    }

    pub fn add_constant(&mut self, name: &str, value: f64) -> GridMapResult<()> {
        if self.lookup.contains_key(name) {
            return Err(GridMapError::Config(format!(
                "constant '{name}' clashes with an existing time series"
            )));
        }
        let index = self.slot(name);
        self.columns[index] = Column::Constant(value);
        Ok(())
    }

    pub fn add_constants(&mut self, constants: &BTreeMap<String, f64>) -> GridMapResult<()> {
        constants
            .iter()
            .try_for_each(|(name, value)| self.add_constant(name, *value))
    }

    pub fn column(&self, name: &str) -> GridMapResult<usize> {
        self.lookup
            .get(name)
            .copied()
            .ok_or_else(|| GridMapError::Config(format!("time series '{name}' not found")))
    }

    pub fn name(&self, column: usize) -> &str {
        &self.names[column]
    }

    /// Value at a point; NaN when the version or point is missing.
    pub fn value(&self, version: i32, column: usize, point: usize) -> f64 {
        match &self.columns[column] {
            Column::Constant(value) => *value,
            Column::Values(versions) => versions
                .get(&version)
                .and_then(|values| values.get(point))
                .copied()
                .unwrap_or(f64::NAN),
        }
    }

    /// Population standard deviation over `range`.
    pub fn std_dev(&self, version: i32, column: usize, range: PointRange) -> f64 {
        let values: Vec<f64> = match &self.columns[column] {
            Column::Constant(_) => return 0.0,
            Column::Values(versions) => match versions.get(&version) {
                Some(values) => range.points().filter_map(|p| values.get(p).copied()).collect(),
                None => return f64::NAN,
            },
        };
        if values.is_empty() {
            return f64::NAN;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        variance.sqrt()
    }
}

/// Load a `;`-separated table: `Time;Version;<ts1>;<ts2>...`, RFC 3339
/// timestamps, rows grouped by version in time order. Empty cells read as NaN.
pub fn load_timeseries_csv(path: &Path) -> Result<TimeSeriesTable> {
    let file =
        File::open(path).with_context(|| format!("opening time series '{}'", path.display()))?;
    let mut reader = csv::ReaderBuilder::new().delimiter(b';').from_reader(file);
    let headers = reader
        .headers()
        .with_context(|| format!("reading header of '{}'", path.display()))?
        .clone();
    if headers.len() < 2 || &headers[0] != "Time" || &headers[1] != "Version" {
        return Err(anyhow!(
            "'{}' must start with 'Time;Version' columns",
            path.display()
        ));
    }
    let names: Vec<String> = headers.iter().skip(2).map(str::to_string).collect();

    let mut rows: BTreeMap<i32, (Vec<DateTime<Utc>>, Vec<Vec<f64>>)> = BTreeMap::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading row {} of '{}'", line + 2, path.display()))?;
        let instant: DateTime<Utc> = record
            .get(0)
            .unwrap_or_default()
            .parse()
            .with_context(|| format!("parsing time at row {}", line + 2))?;
        let version: i32 = record
            .get(1)
            .unwrap_or_default()
            .trim()
            .parse()
            .with_context(|| format!("parsing version at row {}", line + 2))?;
        let entry = rows
            .entry(version)
            .or_insert_with(|| (Vec::new(), vec![Vec::new(); names.len()]));
        entry.0.push(instant);
        for (i, column) in entry.1.iter_mut().enumerate() {
            let cell = record.get(i + 2).unwrap_or_default().trim();
            let value = if cell.is_empty() {
                f64::NAN
            } else {
                cell.parse()
                    .with_context(|| format!("parsing '{}' at row {}", names[i], line + 2))?
            };
            column.push(value);
        }
    }

    let instants = match rows.values().next() {
        Some((instants, _)) => instants.clone(),
        None => Vec::new(),
    };
    let mut table = TimeSeriesTable::new(instants);
    for (version, (instants, columns)) in rows {
        if instants != table.instants {
            return Err(anyhow!(
                "version {version} of '{}' does not share the time index of the other versions",
                path.display()
            ));
        }
        for (name, values) in names.iter().zip(columns) {
            table.add_series(name, version, values)?;
        }
    }
    Ok(table)
}
