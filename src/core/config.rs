//! Configuration management for bmpredict.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - Environment variable and CLI overrides (applied by the CLI through
//!   [`ConfigBuilder`])
//! - Validation and defaults

use crate::core::{PredictError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Complete configuration for bmpredict
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Time series backend configuration
    pub storage: StorageConfig,
    /// Predictor configuration
    pub predictor: PredictorConfig,
    /// Request fan-out configuration
    pub orchestrator: OrchestratorConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the prediction API
    pub bind_address: IpAddr,
    /// Port for the prediction API
    pub port: u16,
    /// Enable permissive CORS headers
    pub enable_cors: bool,
}

/// Which time series source to query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Remote aggregator reached over HTTP
    Remote,
    /// Dump files in a local directory
    File,
    /// Paginated search index
    Search,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend type
    pub backend: BackendKind,
    /// Base URL of a remote backend, or the dump directory for `file`
    pub url: String,
    /// File name prefix of dump files
    pub file_prefix: String,
    /// File name suffix of dump files
    pub file_suffix: String,
    /// Search index settings
    pub search: SearchConfig,
    /// HTTP client timeout for remote backends
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
}

/// Longest search look-back accepted, in days.
pub const MAX_HISTORY_DAYS: i64 = 36_500;

/// Search index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Index name or pattern
    pub index: String,
    /// Document type discriminator
    pub doc_type: String,
    /// Days of history to search; `<= 0` searches `index` directly
    pub history_days: i64,
    /// Hits per page
    pub page_size: usize,
    /// How long the server keeps a scroll cursor alive
    #[serde(with = "humantime_serde")]
    pub scroll_keep_alive: Duration,
}

/// Which prediction strategy to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictorKind {
    /// External QBETS forecaster
    Qbets,
    /// Exact empirical quantile
    Simple,
}

/// Predictor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Strategy
    pub strategy: PredictorKind,
    /// Path to the QBETS executable
    pub qbets_path: Option<PathBuf>,
    /// Minimum series length accepted by the forecaster
    pub min_samples: usize,
    /// Series shorter than this get an explicit warm-up argument
    pub short_series_len: usize,
    /// Warm-up passed as `-t` for short series
    pub short_series_warmup: Option<u32>,
    /// Write bare values instead of `timestamp value` lines
    pub legacy_input: bool,
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum predictions running at once per request
    pub max_concurrency: usize,
    /// Upper bound on a whole prediction request
    #[serde(with = "humantime_serde")]
    pub prediction_timeout: Option<Duration>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Structured logging format
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            predictor: PredictorConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            logging: LoggingConfig::default(),
            debug: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: IpAddr::from([127, 0, 0, 1]),
            port: 8080,
            enable_cors: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: BackendKind::Remote,
            url: String::new(),
            file_prefix: "benchmark_".to_string(),
            file_suffix: ".txt".to_string(),
            search: SearchConfig::default(),
            request_timeout: None,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            index: "watchtower-prod*".to_string(),
            doc_type: "appengine".to_string(),
            history_days: -1,
            page_size: 1000,
            scroll_keep_alive: Duration::from_secs(60),
        }
    }
}

impl Default for PredictorConfig {
    fn default() -> Self {
        PredictorConfig {
            strategy: PredictorKind::Qbets,
            qbets_path: None,
            min_samples: 20,
            short_series_len: 200,
            short_series_warmup: Some(10),
            legacy_input: false,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            max_concurrency: 4,
            prediction_timeout: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl FromStr for BackendKind {
    type Err = PredictError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            // "ae" is the historical name of the remote aggregator
            "remote" | "ae" => Ok(BackendKind::Remote),
            "file" | "fs" => Ok(BackendKind::File),
            "search" | "es" => Ok(BackendKind::Search),
            other => Err(PredictError::config(format!("Invalid database type: {other}"))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Remote => "remote",
            BackendKind::File => "file",
            BackendKind::Search => "search",
        };
        f.write_str(name)
    }
}

impl FromStr for PredictorKind {
    type Err = PredictError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "qbets" => Ok(PredictorKind::Qbets),
            "simple" => Ok(PredictorKind::Simple),
            other => Err(PredictError::config(format!("Invalid predictor type: {other}"))),
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_storage()?;
        self.validate_prediction()
    }

    /// Validate the backend section only
    pub fn validate_storage(&self) -> Result<()> {
        if self.storage.url.trim().is_empty() {
            return Err(PredictError::config("URL/Path of the data files not specified"));
        }

        if self.storage.backend == BackendKind::Search {
            if self.storage.search.page_size == 0 {
                return Err(PredictError::config("search.page_size must be greater than 0"));
            }
            if self.storage.search.index.trim_end_matches('*').is_empty() {
                return Err(PredictError::config("search.index must name an index"));
            }
            if self.storage.search.history_days > MAX_HISTORY_DAYS {
                return Err(PredictError::config(format!(
                    "search.history_days must be at most {} (got {})",
                    MAX_HISTORY_DAYS, self.storage.search.history_days
                )));
            }
        }

        Ok(())
    }

    /// Validate predictor and fan-out settings, which need no backend
    pub fn validate_prediction(&self) -> Result<()> {
        if self.predictor.min_samples == 0 {
            return Err(PredictError::config("min_samples must be greater than 0"));
        }

        if self.predictor.strategy == PredictorKind::Qbets && self.predictor.qbets_path.is_none()
        {
            return Err(PredictError::config(
                "qbets_path is required for the QBETS predictor",
            ));
        }

        if self.orchestrator.max_concurrency == 0 {
            return Err(PredictError::config("max_concurrency must be greater than 0"));
        }

        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| PredictError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set backend type
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.config.storage.backend = backend;
        self
    }

    /// Set backend URL or dump directory
    pub fn url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.storage.url = url.into();
        self
    }

    /// Set API port
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// Set the search index name or pattern
    pub fn search_index<S: Into<String>>(mut self, index: S) -> Self {
        self.config.storage.search.index = index.into();
        self
    }

    /// Set the search document type
    pub fn search_type<S: Into<String>>(mut self, doc_type: S) -> Self {
        self.config.storage.search.doc_type = doc_type.into();
        self
    }

    /// Set the search history window in days
    pub fn search_history_days(mut self, days: i64) -> Self {
        self.config.storage.search.history_days = days;
        self
    }

    /// Set prediction strategy
    pub fn strategy(mut self, strategy: PredictorKind) -> Self {
        self.config.predictor.strategy = strategy;
        self
    }

    /// Set QBETS executable path
    pub fn qbets_path(mut self, path: PathBuf) -> Self {
        self.config.predictor.qbets_path = Some(path);
        self
    }

    /// Set fan-out concurrency
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.orchestrator.max_concurrency = n;
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Build a configuration for offline prediction, where no backend is
    /// queried and `storage.url` may be empty
    pub fn build_offline(self) -> Result<Config> {
        self.config.validate_prediction()?;
        Ok(self.config)
    }
}
