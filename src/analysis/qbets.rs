//! QBETS-based predictor.
//!
//! Each call writes the series to a scratch file, runs
//! `qbets -f <file> -q <q> -c <c> [-t <warmup>] -T` and reads predictions
//! back from stdout:
//!
//! ```text
//! time: 1431000000 value: 40 pred: 57.000000
//! cwrong: count: 1
//! ```
//!
//! A `time:` line is one prediction record (field 1 is the timestamp,
//! field 5 the predicted value). A `cwrong:` line carries a correction flag
//! in field 2 for the record just before it. The predictor keeps no state
//! between calls and the scratch file is removed when the call ends,
//! whatever its outcome.

use super::{require_samples, Predictor};
use crate::core::{Datapoint, PredictError, PredictorConfig, Result, TimeSeries};
use std::ffi::OsString;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Marker of a prediction record line.
pub const RECORD_MARKER: &str = "time:";
/// Marker of a correction flag line.
pub const CORRECTION_MARKER: &str = "cwrong:";

const RECORD_TIMESTAMP_FIELD: usize = 1;
const RECORD_VALUE_FIELD: usize = 5;
const CORRECTION_FIELD: usize = 2;

/// Predictor delegating to an external QBETS executable.
#[derive(Debug, Clone)]
pub struct QbetsPredictor {
    exe: PathBuf,
    min_samples: usize,
    short_series_len: usize,
    short_series_warmup: Option<u32>,
    legacy_input: bool,
}

impl QbetsPredictor {
    /// Predictor with default thresholds running the executable at `exe`.
    pub fn new<P: Into<PathBuf>>(exe: P) -> Self {
        let defaults = PredictorConfig::default();
        Self {
            exe: exe.into(),
            min_samples: defaults.min_samples,
            short_series_len: defaults.short_series_len,
            short_series_warmup: defaults.short_series_warmup,
            legacy_input: defaults.legacy_input,
        }
    }

    /// Predictor built from configuration; `qbets_path` must be set.
    pub fn from_config(config: &PredictorConfig) -> Result<Self> {
        let exe = config
            .qbets_path
            .clone()
            .ok_or_else(|| PredictError::config("QBETS executable path not specified"))?;
        Ok(Self {
            exe,
            min_samples: config.min_samples,
            short_series_len: config.short_series_len,
            short_series_warmup: config.short_series_warmup,
            legacy_input: config.legacy_input,
        })
    }

    /// Path of the executable.
    pub fn exe(&self) -> &Path {
        &self.exe
    }

    /// Command-line arguments for a series of `len` samples.
    pub fn build_args(&self, input: &Path, q: f64, c: f64, len: usize) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            input.as_os_str().to_owned(),
            "-q".into(),
            format!("{:.6}", q).into(),
            "-c".into(),
            format!("{:.6}", c).into(),
        ];
        if len < self.short_series_len {
            if let Some(warmup) = self.short_series_warmup {
                args.push("-t".into());
                args.push(warmup.to_string().into());
            }
        }
        args.push("-T".into());
        args
    }

    /// PREPARE_INPUT -> INVOKE, returning the forecaster's stdout.
    async fn run(&self, ts: &TimeSeries, q: f64, c: f64, debug: bool) -> Result<String> {
        require_samples(ts, self.min_samples)?;

        let input = tempfile::Builder::new().prefix("_qbets_").tempfile()?;
        tokio::fs::write(input.path(), encode_input(ts, self.legacy_input)).await?;

        let args = self.build_args(input.path(), q, c, ts.len());
        let output = Command::new(&self.exe)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PredictError::process(format!("failed to run {}: {}", self.exe.display(), e))
            })?;

        if !output.status.success() {
            return Err(PredictError::process(format!(
                "{} exited with {}: {}",
                self.exe.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if debug {
            for line in stdout.lines() {
                tracing::debug!(target: "bmpredict::qbets", "{}", line);
            }
        }
        Ok(stdout)
    }
}

#[async_trait::async_trait]
impl Predictor for QbetsPredictor {
    async fn predict_quantile(&self, ts: &TimeSeries, q: f64, c: f64, debug: bool) -> Result<i64> {
        let stdout = self.run(ts, q, c, debug).await?;
        parse_last_prediction(&stdout)
    }

    async fn predict_quantile_trace(
        &self,
        ts: &TimeSeries,
        q: f64,
        c: f64,
        debug: bool,
    ) -> Result<TimeSeries> {
        let stdout = self.run(ts, q, c, debug).await?;
        parse_predictions(&stdout)
    }

    fn name(&self) -> &'static str {
        "qbets"
    }
}

/// Input file contents: `timestamp value` lines, or bare values in
/// legacy mode.
pub fn encode_input(ts: &TimeSeries, legacy: bool) -> String {
    let mut buf = String::with_capacity(ts.len() * 16);
    for point in ts {
        // Writing to a String cannot fail
        let _ = if legacy {
            writeln!(buf, "{}", point.value)
        } else {
            writeln!(buf, "{} {}", point.timestamp, point.value)
        };
    }
    buf
}

/// Every prediction record in `stdout`, with correction flags merged onto
/// the record that precedes them.
pub fn parse_predictions(stdout: &str) -> Result<TimeSeries> {
    let mut records: Vec<Datapoint> = Vec::new();
    for line in stdout.lines() {
        if line.starts_with(RECORD_MARKER) {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let timestamp = numeric_field(&fields, RECORD_TIMESTAMP_FIELD, line)?;
            let value = numeric_field(&fields, RECORD_VALUE_FIELD, line)?;
            records.push(Datapoint::new(timestamp, value));
        } else if line.starts_with(CORRECTION_MARKER) {
            if let Some(last) = records.last_mut() {
                let fields: Vec<&str> = line.split_whitespace().collect();
                last.cwrong = numeric_field(&fields, CORRECTION_FIELD, line)?;
            }
        }
    }
    Ok(TimeSeries::from(records))
}

/// Value of the last prediction record in `stdout`.
pub fn parse_last_prediction(stdout: &str) -> Result<i64> {
    let last = stdout
        .lines()
        .filter(|line| line.starts_with(RECORD_MARKER))
        .last()
        .ok_or_else(|| PredictError::process("no prediction records in forecaster output"))?;
    let fields: Vec<&str> = last.split_whitespace().collect();
    numeric_field(&fields, RECORD_VALUE_FIELD, last)
}

fn numeric_field(fields: &[&str], index: usize, line: &str) -> Result<i64> {
    let raw = fields
        .get(index)
        .ok_or_else(|| PredictError::parse(format!("missing field {} in {:?}", index, line)))?;
    let value: f64 = raw
        .parse()
        .map_err(|e| PredictError::parse(format!("invalid number {:?} in {:?}: {}", raw, line, e)))?;
    if !value.is_finite() {
        return Err(PredictError::parse(format!("non-finite number in {:?}", line)));
    }
    // Forecaster prints floats; predictions are whole units
    #[allow(clippy::cast_possible_truncation)]
    Ok(value.trunc() as i64)
}
