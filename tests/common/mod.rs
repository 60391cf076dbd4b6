//! Common test utilities and fixtures.

#![allow(dead_code)]

use bmpredict_lib::analysis::Predictor;
use bmpredict_lib::core::{PredictError, Result, TimeSeries};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Write a dump file holding `op` and `(timestamp, value)` samples.
pub fn write_dump(dir: &Path, file_name: &str, op: &str, points: &[(i64, i64)]) -> PathBuf {
    let mut body = format!("{}\n", op);
    for (ts, value) in points {
        let _ = writeln!(body, "{} {}", ts, value);
    }
    let path = dir.join(file_name);
    std::fs::write(&path, body).unwrap();
    path
}

/// `n` samples with timestamps `1000, 1010, ...` and values `1..=n`.
pub fn samples(n: i64) -> Vec<(i64, i64)> {
    (1..=n).map(|i| (1000 + i * 10, i)).collect()
}

/// Predictor stand-in returning the last value of each series.
///
/// Fails on any series containing `fail_on`, sleeps `delay` per call and
/// records how many calls were in flight at once.
#[derive(Debug, Default)]
pub struct MockPredictor {
    pub fail_on: Option<i64>,
    pub delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl MockPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, value: i64) -> Self {
        self.fail_on = Some(value);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Highest number of concurrent calls observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Number of calls started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Predictor for MockPredictor {
    async fn predict_quantile(&self, ts: &TimeSeries, _q: f64, _c: f64, _debug: bool) -> Result<i64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(bad) = self.fail_on {
            if ts.iter().any(|p| p.value == bad) {
                return Err(PredictError::process(format!("forced failure on {}", bad)));
            }
        }
        ts.last()
            .map(|p| p.value)
            .ok_or(PredictError::InsufficientData {
                required: 1,
                actual: 0,
            })
    }

    async fn predict_quantile_trace(
        &self,
        ts: &TimeSeries,
        _q: f64,
        _c: f64,
        _debug: bool,
    ) -> Result<TimeSeries> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(ts.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
