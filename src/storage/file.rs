//! File system backend.
//!
//! Loads every dump file in a directory into memory once. A dump file holds
//! the operation name on its first line followed by one sample per line,
//! either `timestamp value` or a bare legacy `value` whose timestamp is its
//! sample index.

use super::backend::TimeSeriesBackend;
use crate::core::{Datapoint, PredictError, QueryWindow, Result, TimeSeries};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Default dump file name prefix.
pub const DUMP_FILE_PREFIX: &str = "benchmark_";
/// Default dump file name suffix.
pub const DUMP_FILE_SUFFIX: &str = ".txt";

/// Backend serving series parsed from local dump files.
///
/// Read-only after construction, so it can be shared without locking.
#[derive(Debug, Default)]
pub struct FileBackend {
    data: HashMap<String, TimeSeries>,
}

impl FileBackend {
    /// Load all `benchmark_*.txt` files under `root`.
    pub fn load<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::load_matching(root, DUMP_FILE_PREFIX, DUMP_FILE_SUFFIX)
    }

    /// Load all files under `root` whose name has the given prefix and suffix.
    pub fn load_matching<P: AsRef<Path>>(root: P, prefix: &str, suffix: &str) -> Result<Self> {
        let root = root.as_ref();
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with(prefix) && name.ends_with(suffix) {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut data = HashMap::with_capacity(paths.len());
        for path in paths {
            tracing::info!("Loading data from {}", path.display());
            let (name, series) = load_dump_file(&path)?;
            if data.contains_key(&name) {
                return Err(PredictError::config(format!(
                    "operation {} defined by more than one file (last: {})",
                    name,
                    path.display()
                )));
            }
            data.insert(name, series);
        }

        tracing::info!("Loaded {} time series from {}", data.len(), root.display());
        Ok(Self { data })
    }

    /// Build a backend from already parsed series.
    pub fn from_series(data: HashMap<String, TimeSeries>) -> Self {
        Self { data }
    }

    /// Names of the loaded operations, sorted.
    pub fn operations(&self) -> Vec<&str> {
        let mut ops: Vec<&str> = self.data.keys().map(String::as_str).collect();
        ops.sort_unstable();
        ops
    }
}

#[async_trait::async_trait]
impl TimeSeriesBackend for FileBackend {
    async fn query(
        &self,
        window: &QueryWindow,
        operations: &[String],
    ) -> Result<HashMap<String, TimeSeries>> {
        let mut result = HashMap::with_capacity(operations.len());
        for op in operations {
            let series = self
                .data
                .get(op)
                .ok_or_else(|| PredictError::OperationNotFound(op.clone()))?;
            result.insert(op.clone(), window.apply(series.as_slice()));
        }
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Read and parse a single dump file.
pub fn load_dump_file<P: AsRef<Path>>(path: P) -> Result<(String, TimeSeries)> {
    let path = path.as_ref();
    let file = File::open(path)?;
    parse_dump(BufReader::new(file), &path.display().to_string())
}

/// Parse dump-format text. `source` only labels error messages.
pub fn parse_dump<R: BufRead>(reader: R, source: &str) -> Result<(String, TimeSeries)> {
    let mut name: Option<String> = None;
    let mut series = TimeSeries::new();
    let mut index: i64 = 0;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if name.is_none() {
            name = Some(line.to_string());
            continue;
        }

        let mut fields = line.split_whitespace();
        let first = fields.next().unwrap_or_default();
        let point = match fields.next() {
            Some(second) => Datapoint::new(
                parse_field(first, source, line_no)?,
                parse_field(second, source, line_no)?,
            ),
            None => Datapoint::new(index, parse_field(first, source, line_no)?),
        };
        series.push(point).map_err(|e| {
            PredictError::data_integrity(format!("{}:{}: {}", source, line_no + 1, e))
        })?;
        index += 1;
    }

    let name =
        name.ok_or_else(|| PredictError::parse(format!("{source}: missing operation name")))?;
    Ok((name, series))
}

fn parse_field(field: &str, source: &str, line_no: usize) -> Result<i64> {
    field.parse::<i64>().map_err(|e| {
        PredictError::parse(format!(
            "{}:{}: invalid number {:?}: {}",
            source,
            line_no + 1,
            field,
            e
        ))
    })
}
