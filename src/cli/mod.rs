//! Command-line interface for bmpredict.
//!
//! Run `bmpredict -u <url>` to serve predictions over HTTP, or use one of
//! the one-shot subcommands to inspect a series from the terminal.

use crate::analysis::{min_trace_index, predictor_from_config};
use crate::api::{self, ApiConfig};
use crate::core::{
    BackendKind, Config, ConfigBuilder, CustomPredictionRequest, PredictError, PredictionRequest,
    PredictorKind, Result, TimeSeriesRequest, DEFAULT_CONFIDENCE, DEFAULT_QUANTILE,
    UNSET_TIMESTAMP,
};
use crate::service::PredictionService;
use crate::storage::file::load_dump_file;
use crate::storage::FileBackend;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Quantile predictions over benchmark time series
#[derive(Parser, Debug)]
#[command(name = "bmpredict")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Command to run (default: serve)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Configuration file path (default: ~/.config/bmpredict/config.yaml)
    #[arg(long, env = "BMPREDICT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// URL of the data source, or the dump directory for the file backend
    #[arg(short = 'u', long, env = "BMPREDICT_URL", global = true)]
    pub url: Option<String>,

    /// Database type: remote (ae), file (fs) or search (es)
    #[arg(short = 'd', long, env = "BMPREDICT_BACKEND", global = true)]
    pub backend: Option<String>,

    /// Port for the prediction API
    #[arg(short = 'p', long, env = "BMPREDICT_PORT", global = true)]
    pub port: Option<u16>,

    /// Path to the QBETS executable
    #[arg(short = 'q', long, env = "BMPREDICT_QBETS_PATH", global = true)]
    pub qbets_path: Option<PathBuf>,

    /// Use the exact quantile predictor instead of QBETS
    #[arg(short = 's', long, global = true)]
    pub simple: bool,

    /// Enable debug logging
    #[arg(short = 'v', long, env = "BMPREDICT_DEBUG", global = true)]
    pub debug: bool,

    /// Search index name or pattern
    #[arg(short = 'i', long, env = "BMPREDICT_ES_INDEX", global = true)]
    pub es_index: Option<String>,

    /// Search document type
    #[arg(short = 't', long, env = "BMPREDICT_ES_TYPE", global = true)]
    pub es_type: Option<String>,

    /// Days of history to query through monthly search indices
    #[arg(long = "es-history", visible_alias = "hd", env = "BMPREDICT_ES_HISTORY", global = true)]
    pub es_history: Option<i64>,

    /// Validate configuration and exit
    #[arg(long, global = true)]
    pub check_config: bool,
}

/// One-shot and long-running commands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the HTTP prediction service
    Serve,
    /// Print the series of one operation in dump format
    Dump {
        /// Operation name
        #[arg(long)]
        op: String,
        /// Keep only the latest N samples (0 keeps all)
        #[arg(long, default_value_t = 0)]
        limit: i64,
    },
    /// Print one prediction for one operation
    Predict {
        /// Operation name
        #[arg(long)]
        op: String,
        /// Keep only the latest N samples (0 keeps all)
        #[arg(long, default_value_t = 0)]
        limit: i64,
        /// Quantile to predict
        #[arg(short = 'Q', long, default_value_t = DEFAULT_QUANTILE)]
        quantile: f64,
        /// Upper confidence of the prediction
        #[arg(short = 'C', long, default_value_t = DEFAULT_CONFIDENCE)]
        confidence: f64,
    },
    /// Replay trace predictions over a local dump file
    Trace {
        /// Dump file to read
        #[arg(long)]
        file: PathBuf,
        /// Quantile to predict
        #[arg(short = 'Q', long, default_value_t = DEFAULT_QUANTILE)]
        quantile: f64,
        /// Upper confidence of the prediction
        #[arg(short = 'C', long, default_value_t = DEFAULT_CONFIDENCE)]
        confidence: f64,
    },
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Command to run, defaulting to `serve`.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    /// Config file in use: the explicit `--config`, or the default location
    /// when a file exists there.
    pub fn config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config {
            return Some(path.clone());
        }
        dirs::config_dir()
            .map(|d| d.join("bmpredict").join("config.yaml"))
            .filter(|path| path.exists())
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Environment variables
    /// 3. Config file
    /// 4. Defaults (lowest priority)
    pub async fn load_config(&self) -> Result<Config> {
        let builder = self.load_builder().await?;
        self.apply_overrides(builder)?.build()
    }

    /// Like [`Cli::load_config`], but without requiring a backend.
    pub async fn load_offline_config(&self) -> Result<Config> {
        let builder = self.load_builder().await?;
        self.apply_overrides(builder)?.build_offline()
    }

    async fn load_builder(&self) -> Result<ConfigBuilder> {
        let builder = ConfigBuilder::new();
        let Some(config_path) = self.config_path() else {
            return Ok(builder);
        };

        match tokio::fs::read_to_string(&config_path).await {
            Ok(content) => builder.from_yaml(&content),
            Err(e) if self.config.is_some() => Err(PredictError::config(format!(
                "Failed to read config file {:?}: {}",
                config_path, e
            ))),
            // Default location vanished after the existence check
            Err(_) => Ok(builder),
        }
    }

    fn apply_overrides(&self, mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
        if let Some(url) = &self.url {
            builder = builder.url(url.clone());
        }
        if let Some(backend) = &self.backend {
            builder = builder.backend(backend.parse::<BackendKind>()?);
        }
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(path) = &self.qbets_path {
            builder = builder.qbets_path(path.clone());
        }
        if self.simple {
            builder = builder.strategy(PredictorKind::Simple);
        }
        if let Some(index) = &self.es_index {
            builder = builder.search_index(index.clone());
        }
        if let Some(doc_type) = &self.es_type {
            builder = builder.search_type(doc_type.clone());
        }
        if let Some(days) = self.es_history {
            builder = builder.search_history_days(days);
        }

        Ok(builder.debug(self.debug))
    }

    /// Initialize logging based on configuration.
    pub fn init_logging(&self, config: &Config) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let log_level = if self.debug {
            "debug".to_string()
        } else {
            std::env::var("BMPREDICT_LOG_LEVEL")
                .unwrap_or_else(|_| config.logging.level.as_str().to_string())
        };

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

        let fmt_layer = if config.logging.structured {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .compact()
        } else {
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| PredictError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute the parsed command line.
pub async fn execute(cli: Cli) -> Result<()> {
    let command = cli.command();

    let config = match command {
        Command::Trace { .. } => cli.load_offline_config().await?,
        _ => cli.load_config().await?,
    };

    cli.init_logging(&config)?;
    if let Some(path) = cli.config_path() {
        tracing::info!("Loaded configuration from: {:?}", path);
    }

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  Backend: {} ({})", config.storage.backend, config.storage.url);
        println!("  Predictor: {:?}", config.predictor.strategy);
        println!("  API: {}:{}", config.server.bind_address, config.server.port);
        println!("  Max concurrency: {}", config.orchestrator.max_concurrency);
        return Ok(());
    }

    match command {
        Command::Serve => serve(config).await,
        Command::Dump { op, limit } => dump(&config, op, limit).await,
        Command::Predict {
            op,
            limit,
            quantile,
            confidence,
        } => predict(&config, op, limit, quantile, confidence).await,
        Command::Trace {
            file,
            quantile,
            confidence,
        } => trace(&config, &file, quantile, confidence).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    let service = Arc::new(PredictionService::from_config(&config)?);
    let api_config = ApiConfig::from(&config.server);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received shutdown signal, stopping...");
    };

    api::start_server(service, api_config, shutdown).await
}

async fn dump(config: &Config, op: String, limit: i64) -> Result<()> {
    let service = PredictionService::from_config(config)?;
    let req = TimeSeriesRequest {
        max_length: limit,
        operations: vec![op.clone()],
        start: UNSET_TIMESTAMP,
        end: UNSET_TIMESTAMP,
    };

    let mut result = service.time_series(&req).await?;
    let ts = result
        .remove(&op)
        .ok_or_else(|| PredictError::OperationNotFound(op.clone()))?;

    println!("{}", op);
    print!("{}", ts);
    Ok(())
}

async fn predict(config: &Config, op: String, limit: i64, q: f64, c: f64) -> Result<()> {
    let service = PredictionService::from_config(config)?;
    let mut req = PredictionRequest::new([op.clone()]);
    req.max_length = limit;
    req.quantile = q;
    req.confidence = c;

    let predictions = service.predict(&req).await?;
    let value = predictions
        .get(&op)
        .ok_or_else(|| PredictError::OperationNotFound(op.clone()))?;
    println!("{} (q = {}, c = {}) => {}", op, q, c, value);
    Ok(())
}

async fn trace(config: &Config, file: &std::path::Path, q: f64, c: f64) -> Result<()> {
    let (name, ts) = load_dump_file(file)?;
    println!("Loaded {} data points for {}", ts.len(), name);

    let min_index = min_trace_index(q, c);
    println!("Min index: {}", min_index);
    if ts.len() < min_index + 1 {
        return Err(PredictError::InsufficientData {
            required: min_index + 1,
            actual: ts.len(),
        });
    }

    let backend = FileBackend::from_series(HashMap::from([(name.clone(), ts.clone())]));
    let service = PredictionService::new(
        Arc::new(backend),
        predictor_from_config(&config.predictor)?,
        config.orchestrator.clone(),
    )
    .with_debug(config.debug);

    let req = CustomPredictionRequest {
        data: ts,
        quantile: q,
        confidence: c,
        name,
    };
    let results = service.predict_trace(&req).await?;

    let start = req.data.len().saturating_sub(results.len());
    for (offset, (predicted, actual)) in results
        .iter()
        .zip(req.data.iter().skip(start))
        .enumerate()
    {
        println!("[trace] {} {} {}", start + offset, predicted.value, actual.value);
    }
    Ok(())
}
