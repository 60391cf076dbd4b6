//! Quantile predictors.
//!
//! Two interchangeable strategies share the [`Predictor`] trait:
//! - [`SimplePredictor`]: the exact empirical quantile known at each point
//! - [`QbetsPredictor`]: an external QBETS forecaster driven over a
//!   command-line/stdout protocol

use crate::core::{PredictError, PredictorConfig, PredictorKind, Result, TimeSeries};
use std::sync::Arc;

pub mod qbets;
pub mod simple;

pub use qbets::QbetsPredictor;
pub use simple::SimplePredictor;

/// Predicts quantiles of a time series.
#[async_trait::async_trait]
pub trait Predictor: Send + Sync {
    /// Predicted `q`-th quantile at the last point of `ts`, with
    /// under-prediction probability of at most `c`.
    async fn predict_quantile(&self, ts: &TimeSeries, q: f64, c: f64, debug: bool) -> Result<i64>;

    /// The same prediction recomputed at every point of a suffix of `ts`,
    /// aligned to the source timestamps.
    async fn predict_quantile_trace(
        &self,
        ts: &TimeSeries,
        q: f64,
        c: f64,
        debug: bool,
    ) -> Result<TimeSeries>;

    /// Short strategy name for logs.
    fn name(&self) -> &'static str;
}

/// Build the predictor selected by `config.strategy`.
pub fn predictor_from_config(config: &PredictorConfig) -> Result<Arc<dyn Predictor>> {
    match config.strategy {
        PredictorKind::Simple => {
            tracing::info!("Using simple predictor (no QBETS)");
            Ok(Arc::new(SimplePredictor))
        },
        PredictorKind::Qbets => {
            let pred = QbetsPredictor::from_config(config)?;
            tracing::info!("Using QBETS-based predictor [exec: {}]", pred.exe().display());
            Ok(Arc::new(pred))
        },
    }
}

/// Index of the first trace point worth reporting for quantile `q` and
/// confidence `c`: `floor(ln c / ln q) + 10`.
pub fn min_trace_index(q: f64, c: f64) -> usize {
    let bound = (c.ln() / q.ln()).floor();
    if bound.is_finite() && bound > 0.0 {
        // Bounded by the finiteness check above
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bound = bound as usize;
        bound.saturating_add(10)
    } else {
        10
    }
}

/// Fails with `InsufficientData` when `ts` is shorter than `required`.
pub(crate) fn require_samples(ts: &TimeSeries, required: usize) -> Result<()> {
    if ts.len() < required {
        return Err(PredictError::InsufficientData {
            required,
            actual: ts.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_trace_index() {
        // ln(0.05) / ln(0.95) = 58.4
        assert_eq!(min_trace_index(0.95, 0.05), 68);
        assert_eq!(min_trace_index(0.5, 0.2), 12);
        assert_eq!(min_trace_index(1.0, 0.05), 10);
    }

    #[test]
    fn test_require_samples() {
        let ts = TimeSeries::from_values(0..5);
        assert!(require_samples(&ts, 5).is_ok());
        let err = require_samples(&ts, 20).unwrap_err();
        assert!(err.is_insufficient_data());
    }
}
