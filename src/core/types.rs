use crate::core::error::{PredictError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp value that disables range filtering on the wire.
pub const UNSET_TIMESTAMP: i64 = -1;

/// Default quantile when a request does not name one.
pub const DEFAULT_QUANTILE: f64 = 0.95;

/// Default upper confidence when a request does not name one.
pub const DEFAULT_CONFIDENCE: f64 = 0.05;

/// A single sample of a time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Datapoint {
    /// Backend-defined monotonic timestamp
    #[serde(alias = "timestamp")]
    pub timestamp: i64,
    /// Sample value
    #[serde(alias = "value")]
    pub value: i64,
    /// Non-zero when a prediction at this point was later judged wrong
    #[serde(default, alias = "cwrong")]
    pub cwrong: i64,
}

impl Datapoint {
    /// Creates a datapoint without a correction flag
    pub fn new(timestamp: i64, value: i64) -> Self {
        Self {
            timestamp,
            value,
            cwrong: 0,
        }
    }
}

/// An ordered sequence of datapoints.
///
/// Backends guarantee strictly increasing timestamps via
/// [`TimeSeries::from_points`]; series built with `From<Vec<Datapoint>>`
/// are taken as-is and can be checked with [`TimeSeries::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSeries(Vec<Datapoint>);

impl TimeSeries {
    /// Creates an empty series
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builds a series, rejecting timestamps that do not strictly increase
    pub fn from_points(points: Vec<Datapoint>) -> Result<Self> {
        let series = Self(points);
        series.validate()?;
        Ok(series)
    }

    /// Builds a series from bare values, using the sample index as timestamp
    pub fn from_values<I: IntoIterator<Item = i64>>(values: I) -> Self {
        Self(
            values
                .into_iter()
                .zip(0_i64..)
                .map(|(value, ts)| Datapoint::new(ts, value))
                .collect(),
        )
    }

    /// Checks that timestamps strictly increase in storage order
    pub fn validate(&self) -> Result<()> {
        for pair in self.0.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(PredictError::data_integrity(format!(
                    "timestamps out of order: {} followed by {}",
                    pair[0].timestamp, pair[1].timestamp
                )));
            }
        }
        Ok(())
    }

    /// Appends a point, enforcing timestamp order
    pub fn push(&mut self, point: Datapoint) -> Result<()> {
        if let Some(last) = self.0.last() {
            if point.timestamp <= last.timestamp {
                return Err(PredictError::data_integrity(format!(
                    "timestamp {} does not follow {}",
                    point.timestamp, last.timestamp
                )));
            }
        }
        self.0.push(point);
        Ok(())
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the series holds no samples
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate samples in order
    pub fn iter(&self) -> std::slice::Iter<'_, Datapoint> {
        self.0.iter()
    }

    /// Samples as a slice
    pub fn as_slice(&self) -> &[Datapoint] {
        &self.0
    }

    /// Values in storage order
    pub fn values(&self) -> Vec<i64> {
        self.0.iter().map(|p| p.value).collect()
    }

    /// Last sample, if any
    pub fn last(&self) -> Option<&Datapoint> {
        self.0.last()
    }

    /// Consumes the series, returning its samples
    pub fn into_inner(self) -> Vec<Datapoint> {
        self.0
    }
}

impl From<Vec<Datapoint>> for TimeSeries {
    fn from(points: Vec<Datapoint>) -> Self {
        Self(points)
    }
}

impl<'a> IntoIterator for &'a TimeSeries {
    type Item = &'a Datapoint;
    type IntoIter = std::slice::Iter<'a, Datapoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for TimeSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for point in &self.0 {
            writeln!(f, "{} {}", point.timestamp, point.value)?;
        }
        Ok(())
    }
}

/// Bounds applied by a backend to every series it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryWindow {
    /// Keep at most this many trailing samples; `<= 0` means unbounded
    pub max_length: i64,
    /// Inclusive lower timestamp bound
    pub start: Option<i64>,
    /// Inclusive upper timestamp bound
    pub end: Option<i64>,
}

impl QueryWindow {
    /// Window that only limits the series length
    pub fn latest(max_length: i64) -> Self {
        Self {
            max_length,
            start: None,
            end: None,
        }
    }

    /// Window from wire values, where `-1` leaves a bound unset
    pub fn from_raw(max_length: i64, start: i64, end: i64) -> Self {
        let bound = |v: i64| (v != UNSET_TIMESTAMP).then_some(v);
        Self {
            max_length,
            start: bound(start),
            end: bound(end),
        }
    }

    /// True when the window filters by timestamp
    pub fn has_range(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// True when `timestamp` falls inside `[start, end]`
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start.map_or(true, |s| timestamp >= s) && self.end.map_or(true, |e| timestamp <= e)
    }

    /// Drops out-of-range samples, then keeps the last `max_length`
    pub fn apply(&self, points: &[Datapoint]) -> TimeSeries {
        let filtered: Vec<Datapoint> = if self.has_range() {
            points
                .iter()
                .filter(|p| self.contains(p.timestamp))
                .copied()
                .collect()
        } else {
            points.to_vec()
        };
        TimeSeries(self.truncate_vec(filtered))
    }

    /// Keeps the last `max_length` samples of an already filtered series
    pub fn truncate(&self, series: TimeSeries) -> TimeSeries {
        TimeSeries(self.truncate_vec(series.0))
    }

    fn truncate_vec(&self, mut points: Vec<Datapoint>) -> Vec<Datapoint> {
        if let Ok(n) = usize::try_from(self.max_length) {
            if n > 0 && n <= points.len() {
                points.drain(..points.len() - n);
            }
        }
        points
    }
}

fn default_unset() -> i64 {
    UNSET_TIMESTAMP
}

fn default_quantile() -> f64 {
    DEFAULT_QUANTILE
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

fn default_name() -> String {
    "Unknown".to_string()
}

/// Checks quantile and confidence parameters of a prediction.
pub fn validate_prediction_params(quantile: f64, confidence: f64) -> Result<()> {
    if !(quantile > 0.0 && quantile <= 1.0) {
        return Err(PredictError::invalid_request(format!(
            "quantile must be in (0, 1], got {quantile}"
        )));
    }
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(PredictError::invalid_request(format!(
            "confidence must be in (0, 1), got {confidence}"
        )));
    }
    Ok(())
}

/// Multi-operation prediction request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PredictionRequest {
    /// Maximum series length per operation
    #[serde(default)]
    #[serde(alias = "maxLength", alias = "maxlength")]
    pub max_length: i64,
    /// Operations to predict
    #[serde(default)]
    #[serde(alias = "operations")]
    pub operations: Vec<String>,
    /// Lower timestamp bound, -1 when unset
    #[serde(default = "default_unset")]
    #[serde(alias = "start")]
    pub start: i64,
    /// Upper timestamp bound, -1 when unset
    #[serde(default = "default_unset")]
    #[serde(alias = "end")]
    pub end: i64,
    /// Quantile to predict
    #[serde(default = "default_quantile")]
    #[serde(alias = "quantile")]
    pub quantile: f64,
    /// Upper confidence of the prediction
    #[serde(default = "default_confidence")]
    #[serde(alias = "confidence")]
    pub confidence: f64,
}

impl PredictionRequest {
    /// Request for the given operations with default parameters
    pub fn new<I, S>(operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            max_length: 0,
            operations: operations.into_iter().map(Into::into).collect(),
            start: UNSET_TIMESTAMP,
            end: UNSET_TIMESTAMP,
            quantile: DEFAULT_QUANTILE,
            confidence: DEFAULT_CONFIDENCE,
        }
    }

    /// Query window derived from the request
    pub fn window(&self) -> QueryWindow {
        QueryWindow::from_raw(self.max_length, self.start, self.end)
    }

    /// Validate operations and prediction parameters
    pub fn validate(&self) -> Result<()> {
        if self.operations.is_empty() {
            return Err(PredictError::invalid_request("no operations specified"));
        }
        validate_prediction_params(self.quantile, self.confidence)
    }
}

/// Raw time series request, without prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TimeSeriesRequest {
    /// Maximum series length per operation
    #[serde(default)]
    #[serde(alias = "maxLength", alias = "maxlength")]
    pub max_length: i64,
    /// Operations to fetch
    #[serde(default)]
    #[serde(alias = "operations")]
    pub operations: Vec<String>,
    /// Lower timestamp bound, -1 when unset
    #[serde(default = "default_unset")]
    #[serde(alias = "start")]
    pub start: i64,
    /// Upper timestamp bound, -1 when unset
    #[serde(default = "default_unset")]
    #[serde(alias = "end")]
    pub end: i64,
}

impl TimeSeriesRequest {
    /// Query window derived from the request
    pub fn window(&self) -> QueryWindow {
        QueryWindow::from_raw(self.max_length, self.start, self.end)
    }
}

/// Trace prediction over a caller-supplied series.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomPredictionRequest {
    /// The literal series to predict against
    #[serde(default)]
    #[serde(alias = "data")]
    pub data: TimeSeries,
    /// Quantile to predict
    #[serde(default = "default_quantile")]
    #[serde(alias = "quantile")]
    pub quantile: f64,
    /// Upper confidence of the prediction
    #[serde(default = "default_confidence")]
    #[serde(alias = "confidence")]
    pub confidence: f64,
    /// Label used in logs
    #[serde(default = "default_name")]
    #[serde(alias = "name")]
    pub name: String,
}
