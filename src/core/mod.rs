//! Core domain models, configuration and errors for bmpredict.
//!
//! This module contains the fundamental types shared by the storage
//! backends, the predictors and the request orchestrator.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    BackendKind, Config, ConfigBuilder, LogLevel, LoggingConfig, OrchestratorConfig,
    PredictorConfig, PredictorKind, SearchConfig, ServerConfig, StorageConfig, MAX_HISTORY_DAYS,
};
pub use error::{PredictError, Result};
pub use types::{
    validate_prediction_params, CustomPredictionRequest, Datapoint, PredictionRequest,
    QueryWindow, TimeSeries, TimeSeriesRequest, DEFAULT_CONFIDENCE, DEFAULT_QUANTILE,
    UNSET_TIMESTAMP,
};
