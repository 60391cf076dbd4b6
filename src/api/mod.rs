//! HTTP API for the prediction service.
//!
//! Four endpoints expose the orchestrator:
//! - `POST /predict`: one predicted value per requested operation
//! - `POST /cpredict`: trace prediction over a caller-supplied series
//! - `POST /ts`: raw series for the requested operations
//! - `GET /health`: liveness and the configured strategy

use crate::core::{
    CustomPredictionRequest, PredictError, PredictionRequest, Result, ServerConfig, TimeSeries,
    TimeSeriesRequest,
};
use crate::service::PredictionService;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Address to bind (default: 127.0.0.1)
    pub bind_address: IpAddr,
    /// Port to listen on (default: 8080)
    pub port: u16,
    /// Enable CORS headers
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8080,
            enable_cors: false,
        }
    }
}

impl From<&ServerConfig> for ApiConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            bind_address: server.bind_address,
            port: server.port,
            enable_cors: server.enable_cors,
        }
    }
}

/// API server state.
#[derive(Clone)]
struct ApiState {
    service: Arc<PredictionService>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "healthy" when the server answers
    pub status: String,
    /// Crate version
    pub version: String,
    /// Configured backend
    pub backend: String,
    /// Configured predictor
    pub predictor: String,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable failure
    pub error: String,
    /// HTTP status code
    pub code: u16,
}

/// Trace prediction response.
#[derive(Debug, Serialize, Deserialize)]
pub struct TracePredictionResponse {
    /// One predicted point per retained input point
    #[serde(rename = "Predictions")]
    pub predictions: TimeSeries,
}

/// Build the router with all endpoints.
pub fn create_router(service: Arc<PredictionService>, config: &ApiConfig) -> Router {
    let state = ApiState { service };

    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route("/predict", post(predict_handler))
        .route("/cpredict", post(custom_predict_handler))
        .route("/ts", post(time_series_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        app = app.layer(ServiceBuilder::new().layer(CorsLayer::permissive()));
    }

    app
}

/// Start the API server and stop gracefully once `shutdown` resolves.
pub async fn start_server<F>(
    service: Arc<PredictionService>,
    config: ApiConfig,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(service, &config);

    let addr = SocketAddr::new(config.bind_address, config.port);
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        PredictError::Io(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            format!("Failed to bind to {}: {}", addr, e),
        ))
    })?;
    tracing::info!("Starting prediction server on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| {
            PredictError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("API server error: {}", e),
            ))
        })?;

    tracing::info!("Prediction server stopped");
    Ok(())
}

/// HTTP status for a failed request.
pub fn status_for(err: &PredictError) -> StatusCode {
    match err {
        PredictError::InvalidRequest(_) | PredictError::Serialization(_) => {
            StatusCode::BAD_REQUEST
        },
        PredictError::OperationNotFound(_) => StatusCode::NOT_FOUND,
        PredictError::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PredictError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            error,
            code: status.as_u16(),
        }),
    )
        .into_response()
}

fn failure(err: &PredictError) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        tracing::error!("Request failed ({}): {}", err.category(), err);
    } else {
        tracing::warn!("Request rejected ({}): {}", err.category(), err);
    }
    error_response(status, err.to_string())
}

fn bad_body(rejection: &JsonRejection) -> Response {
    tracing::warn!("Malformed request body: {}", rejection.body_text());
    error_response(StatusCode::BAD_REQUEST, rejection.body_text())
}

/// GET /health - Liveness and configured strategy
async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.service.backend_name().to_string(),
        predictor: state.service.predictor_name().to_string(),
    })
}

/// POST /predict - Predicted value per operation
async fn predict_handler(
    State(state): State<ApiState>,
    body: std::result::Result<Json<PredictionRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(&rejection),
    };

    match state.service.predict(&req).await {
        Ok(predictions) => Json(predictions).into_response(),
        Err(e) => failure(&e),
    }
}

/// POST /cpredict - Trace prediction over a literal series
async fn custom_predict_handler(
    State(state): State<ApiState>,
    body: std::result::Result<Json<CustomPredictionRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(&rejection),
    };

    match state.service.predict_trace(&req).await {
        Ok(predictions) => Json(TracePredictionResponse { predictions }).into_response(),
        Err(e) => failure(&e),
    }
}

/// POST /ts - Raw series per operation
async fn time_series_handler(
    State(state): State<ApiState>,
    body: std::result::Result<Json<TimeSeriesRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(&rejection),
    };

    match state.service.time_series(&req).await {
        Ok(series) => Json(series).into_response(),
        Err(e) => failure(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 8080);
        assert!(!config.enable_cors);
        assert_eq!(config.bind_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&PredictError::invalid_request("no operations")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&PredictError::OperationNotFound("op".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&PredictError::InsufficientData {
                required: 20,
                actual: 3
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&PredictError::Timeout { timeout_ms: 10 }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&PredictError::process("exit status 1")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&PredictError::data_integrity("out of order")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
