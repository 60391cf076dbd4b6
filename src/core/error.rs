use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("no data available for {0}")]
    OperationNotFound(String),

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("insufficient data: need at least {required} data points, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Search protocol violation: {0}")]
    Protocol(String),

    #[error("Forecaster process error: {0}")]
    Process(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Timeout error: operation took longer than {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Result type alias for prediction pipeline operations
pub type Result<T> = std::result::Result<T, PredictError>;

impl PredictError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new invalid request error
    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Creates a new data integrity error
    pub fn data_integrity<S: Into<String>>(msg: S) -> Self {
        Self::DataIntegrity(msg.into())
    }

    /// Creates a new parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Creates a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Creates a new search protocol error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    /// Creates a new forecaster process error
    pub fn process<S: Into<String>>(msg: S) -> Self {
        Self::Process(msg.into())
    }

    /// Returns true when the series was too short to predict against.
    ///
    /// Callers may choose to wait for more samples instead of treating
    /// this as a hard failure.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::InvalidRequest(_) => "validation",
            Self::OperationNotFound(_) => "not_found",
            Self::DataIntegrity(_) | Self::Parse { .. } => "data_integrity",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::Network(_) => "network",
            Self::Protocol(_) => "protocol",
            Self::Process(_) => "process",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Join(_) => "async",
            Self::Timeout { .. } => "timeout",
        }
    }
}

impl From<reqwest::Error> for PredictError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}
