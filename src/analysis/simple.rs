//! Exact empirical quantile predictor.
//!
//! Reports the quantile known so far rather than a forecast, which makes it
//! a ground-truth baseline for the QBETS predictor. The confidence argument
//! is accepted for interface parity and ignored.

use super::{require_samples, Predictor};
use crate::core::{Datapoint, PredictError, Result, TimeSeries};

/// Predictor returning the true quantile of the data seen so far.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimplePredictor;

#[async_trait::async_trait]
impl Predictor for SimplePredictor {
    async fn predict_quantile(
        &self,
        ts: &TimeSeries,
        q: f64,
        _c: f64,
        _debug: bool,
    ) -> Result<i64> {
        require_samples(ts, 1)?;
        quantile(&sorted_values(ts), q)
    }

    async fn predict_quantile_trace(
        &self,
        ts: &TimeSeries,
        q: f64,
        _c: f64,
        _debug: bool,
    ) -> Result<TimeSeries> {
        require_samples(ts, 1)?;
        let mut data = sorted_values(ts);
        let mut trace = Vec::with_capacity(ts.len());

        // Walk backwards, dropping each point after recording the quantile
        // of everything up to and including it.
        for point in ts.as_slice().iter().rev() {
            trace.push(Datapoint::new(point.timestamp, quantile(&data, q)?));
            remove_value(&mut data, point.value)?;
        }
        trace.reverse();
        Ok(TimeSeries::from(trace))
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}

fn sorted_values(ts: &TimeSeries) -> Vec<i64> {
    let mut data = ts.values();
    data.sort_unstable();
    data
}

/// Order statistic at rank `ceil(q * n)` (1-based, clamped to `[1, n]`).
pub fn quantile(sorted: &[i64], q: f64) -> Result<i64> {
    if sorted.is_empty() {
        return Err(PredictError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    let n = sorted.len();
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rank = ((q * n as f64).ceil() as usize).clamp(1, n);
    Ok(sorted[rank - 1])
}

/// Remove one occurrence of `value` from a sorted vector.
///
/// Duplicates are interchangeable, so the lowest-index occurrence is the
/// one removed. A missing value means the working copy no longer matches
/// the series it was built from.
pub fn remove_value(sorted: &mut Vec<i64>, value: i64) -> Result<()> {
    let index = sorted.partition_point(|&v| v < value);
    if sorted.get(index) != Some(&value) {
        return Err(PredictError::data_integrity(format!(
            "value {} not found in slice",
            value
        )));
    }
    sorted.remove(index);
    Ok(())
}
