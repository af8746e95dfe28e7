//! Monitoring of recorded traces.
//!
//! A [`SignalTable`] is a trace read from CSV: a header row, a first column holding the time of
//! each row, and one column per variable. [`monitor_table`] runs a fresh
//! [`Evaluator`](crate::monitor::Evaluator) over one table, and [`run_batch`] monitors many tables
//! in parallel and aggregates the robustness of every output.
//!
//! ```
//! use pastiche::batch::{monitor_table, SignalTable};
//! use pastiche::pastify::PastifyConfig;
//! use pastiche::specification::SpecificationDef;
//!
//! let def: SpecificationDef = serde_json::from_str(r#"{
//!     "variables": [{ "name": "collision_detection", "type": "float" }],
//!     "formula": "collision_detection <= 0"
//! }"#).unwrap();
//! let spec = def.build().unwrap().pastify(&PastifyConfig::default()).unwrap();
//!
//! let csv = "time,collision_detection\n0,0.0\n1,1.0\n2,-1.0\n";
//! let table = SignalTable::from_reader("collisions", csv.as_bytes()).unwrap();
//! let report = monitor_table(&spec, &table).unwrap();
//!
//! let robustness: Vec<f64> = report.output("out").unwrap().states().copied().collect();
//! assert_eq!(robustness, vec![0.0, -1.0, 1.0]);
//! ```
use std::fs;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

use crate::metrics::{Meet, Top};
use crate::monitor::{EvaluationError, Evaluator, Outputs, Verdict};
use crate::pastify::PastifiedSpecification;
use crate::trace::Trace;

/// Relative tolerance used when comparing row times to the sampling grid.
const TIME_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("trace has no time column")]
    MissingTime,

    #[error("row {row}: column \"{column}\" holds \"{value}\", which is not a number")]
    InvalidNumber { row: usize, column: String, value: String },

    #[error("row {row}: expected time {expected}, found {found}")]
    Discontinuity { row: usize, expected: f64, found: f64 },
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("trace has no column for variable \"{0}\"")]
    MissingColumn(String),

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

/// A trace loaded from CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalTable {
    name: String,
    columns: Vec<String>,
    times: Vec<f64>,
    rows: Vec<Vec<f64>>,
}

fn parse_field(row: usize, column: &str, value: &str) -> Result<f64, TraceError> {
    f64::from_str(value.trim()).map_err(|_| TraceError::InvalidNumber {
        row,
        column: column.to_string(),
        value: value.to_string(),
    })
}

impl SignalTable {
    pub fn from_reader<R: Read>(name: impl Into<String>, reader: R) -> Result<Self, TraceError> {
        let mut reader = csv::Reader::from_reader(reader);
        let headers: Vec<String> = reader.headers()?.iter().map(|header| header.trim().to_string()).collect();
        let (time_column, columns) = headers.split_first().ok_or(TraceError::MissingTime)?;

        let mut times = Vec::new();
        let mut rows = Vec::new();

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let mut fields = record.iter();

            let time = fields.next().ok_or(TraceError::MissingTime)?;
            times.push(parse_field(row, time_column, time)?);

            let values = fields
                .zip(columns)
                .map(|(value, column)| parse_field(row, column, value))
                .collect::<Result<Vec<_>, _>>()?;

            rows.push(values);
        }

        Ok(Self {
            name: name.into(),
            columns: columns.to_vec(),
            times,
            rows,
        })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, TraceError> {
        let path = path.as_ref();
        let file = fs::File::open(path)?;

        Self::from_reader(path.display().to_string(), file)
    }

    /// Load every `.csv` file of a directory, ordered by file name.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<Self>, TraceError> {
        let mut paths = Vec::new();

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();

            if path.extension().and_then(|extension| extension.to_str()) == Some("csv") {
                paths.push(path);
            }
        }

        paths.sort();
        paths.iter().map(Self::from_path).collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the variable columns, without the time column.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Check that row `i` holds time `i * period`, so that rows map one-to-one onto steps.
    pub fn validate(&self, period: f64) -> Result<(), TraceError> {
        for (row, &found) in self.times.iter().enumerate() {
            let expected = row as f64 * period;

            if (found - expected).abs() > TIME_TOLERANCE * expected.abs().max(1.0) {
                return Err(TraceError::Discontinuity { row, expected, found });
            }
        }

        Ok(())
    }
}

/// Robustness of every output over one trace.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceReport {
    pub name: String,
    pub outputs: Vec<(String, Trace<f64>)>,
}

impl TraceReport {
    pub fn output(&self, name: &str) -> Option<&Trace<f64>> {
        self.outputs
            .iter()
            .find(|(output, _)| output == name)
            .map(|(_, trace)| trace)
    }

    fn record(&mut self, outputs: &Outputs<'_>) {
        for ((_, verdict), (_, trace)) in outputs.iter().zip(self.outputs.iter_mut()) {
            if let Verdict::Settled { time, robustness } = verdict {
                trace.insert(time, robustness);
            }
        }
    }
}

/// Monitor a single table with a fresh evaluator.
///
/// The table must start at time 0 and advance by the sampling period of the specification, and
/// it must have a column for every variable the specification reads. Columns that the
/// specification does not read are ignored.
pub fn monitor_table(spec: &PastifiedSpecification, table: &SignalTable) -> Result<TraceReport, BatchError> {
    table.validate(spec.config().sampling_period)?;

    let declarations = spec.declarations();
    let bindings = spec
        .inputs()
        .iter()
        .map(|&id| {
            let name = &declarations.variable(id).name;
            let column = table.column(name).ok_or_else(|| BatchError::MissingColumn(name.clone()))?;

            Ok((id, column))
        })
        .collect::<Result<Vec<_>, BatchError>>()?;

    let mut report = TraceReport {
        name: table.name().to_string(),
        outputs: spec
            .outputs()
            .iter()
            .map(|output| (output.name.clone(), Trace::new()))
            .collect(),
    };

    let mut evaluator = Evaluator::new(spec);
    let mut sample = spec.sample();

    for (step, row) in table.rows.iter().enumerate() {
        for &(id, column) in &bindings {
            sample.set(id, row[column]);
        }

        report.record(&evaluator.update(step, &sample)?);
    }

    for outputs in evaluator.finish()? {
        report.record(&outputs);
    }

    Ok(report)
}

/// Summary of the robustness values of one output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub count: usize,
    pub minimum: f64,
    pub negative_count: usize,
    pub negative_sum: f64,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            count: 0,
            minimum: f64::top(),
            negative_count: 0,
            negative_sum: 0.0,
        }
    }
}

impl Statistics {
    pub fn record(&mut self, robustness: f64) {
        self.count += 1;
        self.minimum = Meet::min(&self.minimum, &robustness);

        if robustness < 0.0 {
            self.negative_count += 1;
            self.negative_sum += robustness;
        }
    }

    /// Average of the negative values, or `None` if the output was never violated.
    pub fn average_negative(&self) -> Option<f64> {
        match self.negative_count {
            0 => None,
            n => Some(self.negative_sum / n as f64),
        }
    }

    /// Smallest value recorded, or `None` if nothing was recorded.
    pub fn min(&self) -> Option<f64> {
        match self.count {
            0 => None,
            _ => Some(self.minimum),
        }
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            count: self.count + other.count,
            minimum: Meet::min(&self.minimum, &other.minimum),
            negative_count: self.negative_count + other.negative_count,
            negative_sum: self.negative_sum + other.negative_sum,
        }
    }
}

impl Extend<f64> for Statistics {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        iter.into_iter().for_each(|value| self.record(value));
    }
}

impl FromIterator<f64> for Statistics {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut statistics = Self::default();
        statistics.extend(iter);
        statistics
    }
}

/// Aggregated result of monitoring many traces.
#[derive(Debug)]
pub struct BatchSummary {
    /// Statistics per output, ordered like the outputs of the specification.
    pub outputs: Vec<(String, Statistics)>,
    /// Number of traces monitored without error.
    pub evaluated: usize,
    /// Traces that could not be monitored, ordered by name.
    pub failures: Vec<(String, BatchError)>,
}

impl BatchSummary {
    pub fn output(&self, name: &str) -> Option<&Statistics> {
        self.outputs
            .iter()
            .find(|(output, _)| output == name)
            .map(|(_, statistics)| statistics)
    }

    /// Smallest robustness of any output across every trace.
    pub fn worst(&self) -> Option<f64> {
        self.outputs
            .iter()
            .filter_map(|(_, statistics)| statistics.min())
            .reduce(|a, b| Meet::min(&a, &b))
    }

    /// Largest number of violations of any single output.
    pub fn most_violations(&self) -> usize {
        self.outputs
            .iter()
            .map(|(_, statistics)| statistics.negative_count)
            .max()
            .unwrap_or(0)
    }
}

struct Partial {
    statistics: Vec<Statistics>,
    evaluated: usize,
    failures: Vec<(String, BatchError)>,
}

impl Partial {
    fn new(outputs: usize) -> Self {
        Self {
            statistics: vec![Statistics::default(); outputs],
            evaluated: 0,
            failures: Vec::new(),
        }
    }

    fn add(mut self, name: &str, result: Result<TraceReport, BatchError>) -> Self {
        match result {
            Ok(report) => {
                for ((_, trace), statistics) in report.outputs.iter().zip(self.statistics.iter_mut()) {
                    statistics.extend(trace.states().copied());
                }

                info!(trace = name, rows = report.outputs.first().map_or(0, |(_, t)| t.len()), "monitored trace");
                self.evaluated += 1;
            }
            Err(error) => {
                warn!(trace = name, %error, "could not monitor trace");
                self.failures.push((name.to_string(), error));
            }
        }

        self
    }

    fn merge(mut self, other: Self) -> Self {
        self.statistics = self
            .statistics
            .into_iter()
            .zip(other.statistics)
            .map(|(a, b)| a.merge(b))
            .collect();
        self.evaluated += other.evaluated;
        self.failures.extend(other.failures);
        self
    }
}

/// Monitor every table in parallel, each with its own evaluator, and aggregate the robustness of
/// every output. A failing table is recorded in the summary and does not affect the others.
pub fn run_batch(spec: &PastifiedSpecification, tables: &[SignalTable]) -> BatchSummary {
    let outputs = spec.outputs().len();

    let partial = tables
        .par_iter()
        .map(|table| (table.name(), monitor_table(spec, table)))
        .fold(|| Partial::new(outputs), |partial, (name, result)| partial.add(name, result))
        .reduce(|| Partial::new(outputs), Partial::merge);

    let mut failures = partial.failures;
    failures.sort_by(|(a, _), (b, _)| a.cmp(b));

    info!(
        evaluated = partial.evaluated,
        failed = failures.len(),
        "batch complete"
    );

    BatchSummary {
        outputs: spec
            .outputs()
            .iter()
            .map(|output| output.name.clone())
            .zip(partial.statistics)
            .collect(),
        evaluated: partial.evaluated,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use approx::assert_relative_eq;

    use super::{SignalTable, Statistics, TraceError};

    #[test]
    fn read_table() -> Result<(), Box<dyn Error>> {
        let csv = "time, x, y\n0.0, 1.5, 2\n0.5, -1, 3\n";
        let table = SignalTable::from_reader("t", csv.as_bytes())?;

        assert_eq!(table.columns(), &["x".to_string(), "y".to_string()]);
        assert_eq!(table.times(), &[0.0, 0.5]);
        assert_eq!(table.column("y"), Some(1));
        assert!(table.validate(0.5).is_ok());

        Ok(())
    }

    #[test]
    fn reject_discontinuous_time() -> Result<(), Box<dyn Error>> {
        let csv = "time,x\n0,1\n1,1\n3,1\n";
        let table = SignalTable::from_reader("t", csv.as_bytes())?;

        assert!(matches!(
            table.validate(1.0),
            Err(TraceError::Discontinuity { row: 2, .. })
        ));

        Ok(())
    }

    #[test]
    fn reject_invalid_numbers() {
        let csv = "time,x\n0,1\n1,fast\n";

        assert!(matches!(
            SignalTable::from_reader("t", csv.as_bytes()),
            Err(TraceError::InvalidNumber { row: 1, .. })
        ));
    }

    #[test]
    fn aggregate_statistics() {
        let first: Statistics = [1.0, -2.0, 0.5].into_iter().collect();
        let second: Statistics = [-4.0, 3.0].into_iter().collect();
        let merged = first.merge(second);

        assert_eq!(merged.count, 5);
        assert_eq!(merged.min(), Some(-4.0));
        assert_eq!(merged.negative_count, 2);
        assert_relative_eq!(merged.average_negative().unwrap_or(f64::NAN), -3.0);

        assert_eq!(Statistics::default().min(), None);
        assert_eq!(Statistics::default().average_negative(), None);
    }
}
