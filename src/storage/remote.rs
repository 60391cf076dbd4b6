//! Remote aggregator backend.
//!
//! Issues a single `GET {base}/query?ops=a,b[&start=S][&end=E]` and decodes
//! an envelope holding one shared timestamp array and a value array per
//! operation. Failures are surfaced as-is, never retried.

use super::backend::{ensure_all_present, TimeSeriesBackend};
use crate::core::{Datapoint, PredictError, QueryWindow, Result, TimeSeries};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Response body of the aggregator's query endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueryEnvelope {
    #[serde(default)]
    timestamps: Vec<i64>,
    #[serde(default)]
    benchmark_data: HashMap<String, Vec<i64>>,
}

/// Backend backed by a remote aggregator service.
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteBackend {
    /// Create a backend for the aggregator at `base_url`.
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a backend whose HTTP requests give up after `timeout`.
    pub fn with_timeout<S: Into<String>>(base_url: S, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| PredictError::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Base URL of the aggregator.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl TimeSeriesBackend for RemoteBackend {
    async fn query(
        &self,
        window: &QueryWindow,
        operations: &[String],
    ) -> Result<HashMap<String, TimeSeries>> {
        let mut params: Vec<(&str, String)> = vec![("ops", operations.join(","))];
        if let Some(start) = window.start {
            params.push(("start", start.to_string()));
        }
        if let Some(end) = window.end {
            params.push(("end", end.to_string()));
        }

        let url = format!("{}/query", self.base_url);
        tracing::debug!("Querying remote aggregator at {} for {:?}", url, operations);
        let response = self.client.get(&url).query(&params).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PredictError::network(format!(
                "aggregator returned {}: {}",
                status,
                body.trim()
            )));
        }

        let envelope: QueryEnvelope = serde_json::from_str(&body)?;
        let mut result = zip_envelope(envelope)?;
        result.retain(|op, _| operations.contains(op));
        ensure_all_present(operations, &result)?;

        for series in result.values_mut() {
            *series = window.apply(series.as_slice());
        }
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

/// Pair each operation's values with the shared timestamps by position.
fn zip_envelope(envelope: QueryEnvelope) -> Result<HashMap<String, TimeSeries>> {
    let QueryEnvelope {
        timestamps,
        benchmark_data,
    } = envelope;

    let mut result = HashMap::with_capacity(benchmark_data.len());
    for (op, values) in benchmark_data {
        if values.len() > timestamps.len() {
            return Err(PredictError::data_integrity(format!(
                "{} has {} values but only {} timestamps",
                op,
                values.len(),
                timestamps.len()
            )));
        }
        let points = timestamps
            .iter()
            .zip(values)
            .map(|(&ts, value)| Datapoint::new(ts, value))
            .collect();
        let series = TimeSeries::from_points(points)
            .map_err(|e| PredictError::data_integrity(format!("{}: {}", op, e)))?;
        result.insert(op, series);
    }
    Ok(result)
}
