//! bmpredict - quantile predictions over benchmark time series.
//!
//! bmpredict answers "what value will the q-th quantile of operation X take
//! next" for benchmarked API operations. Series come from one of three
//! interchangeable backends and are handed to one of two predictors: the
//! exact empirical quantile, or an external QBETS forecaster that bounds the
//! probability of under-prediction.
//!
//! # Architecture
//!
//! - `core`: Domain models, configuration and errors
//! - `storage`: Time series backends (dump files, remote aggregator, search index)
//! - `analysis`: Predictor strategies
//! - `service`: Bounded fan-out of multi-operation prediction requests
//! - `api`: HTTP boundary
//! - `cli`: Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use bmpredict_lib::core::{ConfigBuilder, PredictionRequest, PredictorKind};
//! use bmpredict_lib::service::PredictionService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigBuilder::new()
//!         .url("http://localhost:9000")
//!         .strategy(PredictorKind::Simple)
//!         .build()?;
//!     let service = PredictionService::from_config(&config)?;
//!     let predictions = service.predict(&PredictionRequest::new(["datastore.get"])).await?;
//!     println!("{:?}", predictions);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod analysis;
pub mod api;
pub mod cli;
pub mod core;
pub mod service;
pub mod storage;

// Re-export core types for convenience
pub use crate::core::{Config, Result};
