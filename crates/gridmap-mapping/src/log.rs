//! Diagnostics log: typed remediation and violation events.
//!
//! The log is a sink. Nothing in the evaluator reads it back, so dropping an
//! entry never changes a resolved value. Every entry is mirrored to `tracing`
//! at debug level when recorded.
//!
//! Numbers are rendered with at most one decimal digit, `.` as separator and
//! no grouping (`12.34` -> `12.3`, `100.0` -> `100`).

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, warn};

/// Point of entries produced while evaluating the base case.
pub const BASE_CASE_POINT: i32 = -1;

/// Point of entries that summarize a whole version.
pub const SYNTHESIS_POINT: i32 = i32::MAX;

const LABEL_SEPARATOR: &str = " / ";
const IGNORE_LIMITS_DISABLED: &str = " / IL disabled";
const TS_SYNTHESIS: &str = " / TS synthesis";
const SCALING_DOWN_PROBLEM: &str = "scaling down / ";

pub fn format_decimal(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "∞" } else { "-∞" }.to_string();
    }
    let rendered = format!("{value:.1}");
    match rendered.strip_suffix(".0") {
        Some(integral) => integral.to_string(),
        None => rendered,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
        }
    }
}

/// Whether a problem comes from a mapped value or from the network as loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Mapping,
    BaseCase,
}

impl Scope {
    fn problem(&self) -> &'static str {
        match self {
            Scope::Mapping => "mapping range problem / ",
            Scope::BaseCase => "base case range problem / ",
        }
    }

    fn action(&self) -> &'static str {
        match self {
            Scope::Mapping => "mapped ",
            Scope::BaseCase => "base case ",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Scope::Mapping => "mapped",
            Scope::BaseCase => "base case",
        }
    }
}

/// Bound a limit event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bound {
    Min,
    Max,
}

/// Closed taxonomy of log events. [`LogEvent::render`] turns one into its
/// label and message.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent<'a> {
    /// A value outside its range and the variable changed to bring it back.
    RangeChanged {
        scope: Scope,
        id: &'a str,
        not_included: &'a str,
        old: &'a str,
        /// Variable whose value was used; empty for zero.
        to: &'a str,
        min: f64,
        max: f64,
        value: f64,
        new_value: f64,
        disabled: bool,
    },
    /// targetP below minP, left as is.
    MinPViolatedByTargetP {
        scope: Scope,
        id: &'a str,
        not_included: &'a str,
        min: f64,
        max: f64,
        value: f64,
    },
    ScalingDown {
        changed: &'a str,
        to: &'a str,
        scope: Option<Scope>,
        disabled: bool,
        synthesis: bool,
        timeseries: &'a str,
        /// `None` renders as "at least one value".
        value: Option<f64>,
        sum: Option<f64>,
    },
    LimitViolationSynthesis {
        violated: &'a str,
        bound: Bound,
        variable: &'a str,
        timeseries: &'a str,
    },
    NotModifiedSynthesis {
        scope: Scope,
        timeseries: &'a str,
    },
    LimitChanged {
        id: &'a str,
        limit: &'a str,
        variable: &'a str,
        bound: Bound,
        variants: usize,
        old: f64,
        new: f64,
    },
    /// Wrong sign for an HVDC limit.
    Sign {
        variable: &'a str,
        value: f64,
        timeseries: &'a str,
        bound: Bound,
    },
    EmptyFilter {
        value: f64,
        timeseries: &'a str,
    },
    ZeroDistributionKey {
        value: f64,
        timeseries: &'a str,
        ids: &'a [String],
    },
}

impl LogEvent<'_> {
    /// (label, message)
    pub fn render(&self) -> (String, String) {
        let il = |disabled: bool| if disabled { IGNORE_LIMITS_DISABLED } else { "" };
        match self {
            LogEvent::RangeChanged {
                scope,
                id,
                not_included,
                old,
                to,
                min,
                max,
                value,
                new_value,
                disabled,
            } => (
                format!(
                    "{}{old} changed to {}{to}{}",
                    scope.problem(),
                    if to.is_empty() { "0" } else { scope.action() },
                    il(*disabled)
                ),
                format!(
                    "{not_included} {} of {id} not included in {} to {}, {old} changed to {}",
                    format_decimal(*value),
                    format_decimal(*min),
                    format_decimal(*max),
                    format_decimal(*new_value)
                ),
            ),
            LogEvent::MinPViolatedByTargetP {
                scope,
                id,
                not_included,
                min,
                max,
                value,
            } => (
                format!(
                    "{}{} minP violated by {} targetP",
                    scope.problem(),
                    scope.name(),
                    scope.name()
                ),
                format!(
                    "{not_included} {} of {id} not included in {} to {}, but {not_included} has not been changed",
                    format_decimal(*value),
                    format_decimal(*min),
                    format_decimal(*max)
                ),
            ),
            LogEvent::ScalingDown {
                changed,
                to,
                scope,
                disabled,
                synthesis,
                timeseries,
                value,
                sum,
            } => (
                format!(
                    "{SCALING_DOWN_PROBLEM}at least one {changed} changed to {}{to}{}{}",
                    scope.map_or("", |s| s.action()),
                    il(*disabled),
                    if *synthesis { TS_SYNTHESIS } else { "" }
                ),
                format!(
                    "Impossible to scale down {} of ts {timeseries}{}{changed}{} has been applied",
                    value.map_or_else(|| "at least one value".to_string(), format_decimal),
                    if *synthesis { ", modified " } else { ", " },
                    sum.map_or_else(String::new, |s| format!(" {}", format_decimal(s)))
                ),
            ),
            LogEvent::LimitViolationSynthesis {
                violated,
                bound,
                variable,
                timeseries,
            } => {
                let evolution = match bound {
                    Bound::Min => " decreased",
                    Bound::Max => " increased",
                };
                (
                    format!("{SCALING_DOWN_PROBLEM}at least one {violated}{evolution}{TS_SYNTHESIS}"),
                    format!(
                        "{violated} violated by {variable} in scaling down of at least one value of ts {timeseries}, {violated} has been{evolution} for equipments"
                    ),
                )
            }
            LogEvent::NotModifiedSynthesis { scope, timeseries } => (
                format!(
                    "{SCALING_DOWN_PROBLEM}{} minP violated by mapped targetP{TS_SYNTHESIS}",
                    scope.name()
                ),
                format!(
                    "Impossible to scale down at least one value of ts {timeseries}, but aimed targetP of equipments have been applied"
                ),
            ),
            LogEvent::LimitChanged {
                id,
                limit,
                variable,
                bound,
                variants,
                old,
                new,
            } => {
                let (comparison, evolution) = match bound {
                    Bound::Min => (" higher than ", " decreased from "),
                    Bound::Max => (" lower than ", " increased from "),
                };
                (
                    format!("limit change{LABEL_SEPARATOR}{limit}"),
                    format!(
                        "{limit} of {id}{comparison}{variable} for {variants} variants, {limit}{evolution}{} to {}",
                        format_decimal(*old),
                        format_decimal(*new)
                    ),
                )
            }
            LogEvent::Sign {
                variable,
                value,
                timeseries,
                bound,
            } => {
                let sign = match bound {
                    Bound::Min => " positive ",
                    Bound::Max => " negative ",
                };
                (
                    format!("mapping sign problem{LABEL_SEPARATOR}"),
                    format!(
                        "Impossible to map {variable} {} of ts {timeseries}{sign}{variable} value",
                        format_decimal(*value)
                    ),
                )
            }
            LogEvent::EmptyFilter { value, timeseries } => (
                "empty filter error".to_string(),
                format!(
                    "Impossible to scale down {} of ts {timeseries} to empty equipment list",
                    format_decimal(*value)
                ),
            ),
            LogEvent::ZeroDistributionKey {
                value,
                timeseries,
                ids,
            } => (
                "zero distribution key warning".to_string(),
                format!(
                    "Distribution key are all equal to zero in scaling down {} of ts {timeseries} on equipments [{}] -> uniform distribution",
                    format_decimal(*value),
                    ids.join(", ")
                ),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub version: i32,
    pub point: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    pub label: String,
    pub message: String,
}

impl LogEntry {
    pub fn new(
        level: LogLevel,
        version: i32,
        point: i32,
        time: Option<DateTime<Utc>>,
        event: &LogEvent<'_>,
    ) -> Self {
        let (label, message) = event.render();
        Self {
            level,
            version,
            point,
            time,
            label,
            message,
        }
    }

    /// `all` for the base case, blank for synthesis entries, 1-based otherwise.
    fn variant_label(&self) -> String {
        match self.point {
            BASE_CASE_POINT => "all".to_string(),
            SYNTHESIS_POINT => String::new(),
            point => (i64::from(point) + 1).to_string(),
        }
    }

    fn time_label(&self) -> String {
        match (self.point, self.time) {
            (BASE_CASE_POINT | SYNTHESIS_POINT, _) | (_, None) => String::new(),
            (_, Some(time)) => time.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Append-only list of [`LogEntry`].
#[derive(Debug, Clone, Default)]
pub struct MappingLog {
    entries: Vec<LogEntry>,
}

impl MappingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LogEntry) {
        debug!(
            level = entry.level.as_str(),
            version = entry.version,
            point = entry.point,
            label = %entry.label,
            "{}",
            entry.message
        );
        self.entries.push(entry);
    }

    pub fn record(
        &mut self,
        level: LogLevel,
        version: i32,
        point: i32,
        time: Option<DateTime<Utc>>,
        event: LogEvent<'_>,
    ) {
        self.push(LogEntry::new(level, version, point, time, &event));
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append entries recorded elsewhere, without mirroring them again.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = LogEntry>) {
        self.entries.extend(entries);
    }

    /// Occurrences per label.
    pub fn label_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.label.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Report every distinct label once with its count.
    pub fn log_synthesis(&self) {
        for (label, count) in self.label_counts() {
            warn!("{count} {label}");
        }
    }

    pub fn write_csv_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::WriterBuilder::new()
            .delimiter(b';')
            .quote_style(csv::QuoteStyle::Never)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);
        csv.write_record(["Type", "Label", "Time", "Variant", "Version", "Message"])?;
        for entry in &self.entries {
            csv.write_record([
                entry.level.as_str(),
                entry.label.as_str(),
                entry.time_label().as_str(),
                entry.variant_label().as_str(),
                entry.version.to_string().as_str(),
                entry.message.as_str(),
            ])?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("creating mapping log '{}'", path.display()))?;
        self.write_csv_to(BufWriter::new(file))
            .with_context(|| format!("writing mapping log '{}'", path.display()))
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("creating mapping log '{}'", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.entries)
            .with_context(|| format!("writing mapping log '{}'", path.display()))
    }
}
