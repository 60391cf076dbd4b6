//! Time series backend trait.

use crate::core::{PredictError, QueryWindow, Result, TimeSeries};
use std::collections::HashMap;

/// Source of per-operation time series.
#[async_trait::async_trait]
pub trait TimeSeriesBackend: Send + Sync {
    /// Fetch one series per requested operation, bounded by `window`.
    ///
    /// Fails naming the operation when a requested series does not exist.
    async fn query(
        &self,
        window: &QueryWindow,
        operations: &[String],
    ) -> Result<HashMap<String, TimeSeries>>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Fails with the first requested operation missing from `result`.
pub(crate) fn ensure_all_present(
    operations: &[String],
    result: &HashMap<String, TimeSeries>,
) -> Result<()> {
    match operations.iter().find(|op| !result.contains_key(*op)) {
        Some(op) => Err(PredictError::OperationNotFound(op.clone())),
        None => Ok(()),
    }
}
