//! Prediction request orchestration.
//!
//! A multi-operation request is resolved against the backend, then one
//! point prediction per operation runs on a bounded set of workers. The
//! request succeeds only if every prediction does; the first failure
//! aborts the remaining workers and is returned in place of the partial
//! results.

use crate::analysis::{predictor_from_config, Predictor};
use crate::core::{
    validate_prediction_params, Config, CustomPredictionRequest, OrchestratorConfig,
    PredictError, PredictionRequest, Result, TimeSeries, TimeSeriesRequest,
};
use crate::storage::backend::ensure_all_present;
use crate::storage::{backend_from_config, TimeSeriesBackend};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Orchestrates backend queries and predictions.
#[derive(Clone)]
pub struct PredictionService {
    backend: Arc<dyn TimeSeriesBackend>,
    predictor: Arc<dyn Predictor>,
    config: OrchestratorConfig,
    debug: bool,
}

impl PredictionService {
    /// Create a service over an explicit backend and predictor.
    ///
    /// `max_concurrency` is clamped to `1..=Semaphore::MAX_PERMITS`.
    pub fn new(
        backend: Arc<dyn TimeSeriesBackend>,
        predictor: Arc<dyn Predictor>,
        mut config: OrchestratorConfig,
    ) -> Self {
        let workers = config.max_concurrency.clamp(1, Semaphore::MAX_PERMITS);
        if workers != config.max_concurrency {
            tracing::warn!(
                "max_concurrency {} out of range, using {}",
                config.max_concurrency,
                workers
            );
            config.max_concurrency = workers;
        }
        Self {
            backend,
            predictor,
            config,
            debug: false,
        }
    }

    /// Build backend and predictor from application configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = backend_from_config(config)?;
        let predictor = predictor_from_config(&config.predictor)?;
        Ok(Self::new(backend, predictor, config.orchestrator.clone()).with_debug(config.debug))
    }

    /// Pass the debug flag through to the predictor.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Name of the configured backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Name of the configured predictor.
    pub fn predictor_name(&self) -> &'static str {
        self.predictor.name()
    }

    /// Predict one value per requested operation.
    pub async fn predict(&self, req: &PredictionRequest) -> Result<HashMap<String, i64>> {
        req.validate()?;
        self.bounded(self.fan_out(req)).await
    }

    /// Trace prediction over a caller-supplied series, without the worker pool.
    pub async fn predict_trace(&self, req: &CustomPredictionRequest) -> Result<TimeSeries> {
        validate_prediction_params(req.quantile, req.confidence)?;
        req.data.validate()?;

        let trace = self
            .bounded(self.predictor.predict_quantile_trace(
                &req.data,
                req.quantile,
                req.confidence,
                self.debug,
            ))
            .await?;
        tracing::info!(
            "TracePrediction [{}] (q = {}, c = {}) => {} quantiles ({} data points)",
            req.name,
            req.quantile,
            req.confidence,
            trace.len(),
            req.data.len()
        );
        Ok(trace)
    }

    /// Raw series for the requested operations.
    pub async fn time_series(
        &self,
        req: &TimeSeriesRequest,
    ) -> Result<HashMap<String, TimeSeries>> {
        if req.operations.is_empty() {
            return Err(PredictError::invalid_request("no operations specified"));
        }
        let result = self.backend.query(&req.window(), &req.operations).await?;
        ensure_all_present(&req.operations, &result)?;
        Ok(result)
    }

    async fn fan_out(&self, req: &PredictionRequest) -> Result<HashMap<String, i64>> {
        let series = self.backend.query(&req.window(), &req.operations).await?;
        ensure_all_present(&req.operations, &series)?;

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut tasks = JoinSet::new();
        for (op, ts) in series {
            let semaphore = Arc::clone(&semaphore);
            let predictor = Arc::clone(&self.predictor);
            let (q, c, debug) = (req.quantile, req.confidence, self.debug);

            tasks.spawn(async move {
                // Held until this worker finishes, success or failure
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| PredictError::config(format!("worker pool closed: {}", e)))?;
                let value = predictor.predict_quantile(&ts, q, c, debug).await?;
                tracing::info!(
                    "{} (q = {}, c = {}) => {} ({} data points)",
                    op,
                    q,
                    c,
                    value,
                    ts.len()
                );
                Ok::<_, PredictError>((op, value))
            });
        }

        let mut predictions = HashMap::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined? {
                Ok((op, value)) => {
                    predictions.insert(op, value);
                },
                Err(e) => {
                    tasks.abort_all();
                    tracing::warn!("Prediction failed ({}): {}", e.category(), e);
                    return Err(e);
                },
            }
        }
        Ok(predictions)
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.config.prediction_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                PredictError::Timeout {
                    timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                }
            })?,
            None => fut.await,
        }
    }
}
