use std::sync::Arc;

use analytics::PredictionAnalytics;
use axum::{
    extract::State,
    http::{HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use explainability::{Explainer, ExplainerConfig};
use ml_engine::ModelHandle;
use prediction_core::PredictionError;
use prediction_orchestrator::{FundamentalsService, PredictionOrchestrator};
use prediction_store::{PredictionDb, SqlitePredictionRepository, SqliteStockRepository};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod analytics_routes;
pub mod auth;
pub mod config;
pub mod prediction_routes;
pub mod request_id;
pub mod security_headers;
pub mod stock_routes;

pub use auth::{ApiKeys, Identity, Role};
pub use config::ServerConfig;

#[cfg(test)]
mod tests;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PredictionOrchestrator>,
    pub fundamentals: Arc<FundamentalsService>,
    pub analytics: Arc<PredictionAnalytics>,
    pub models: Arc<ModelHandle>,
    pub db: PredictionDb,
    pub api_keys: Arc<ApiKeys>,
    pub enable_hsts: bool,
}

impl AppState {
    /// Wire repositories, models and services around one database.
    pub fn new(
        db: PredictionDb,
        models: Arc<ModelHandle>,
        explainer: Explainer,
        api_keys: ApiKeys,
    ) -> Self {
        let stocks = Arc::new(SqliteStockRepository::new(db.clone()));
        let predictions = Arc::new(SqlitePredictionRepository::new(db.clone()));

        Self {
            orchestrator: Arc::new(PredictionOrchestrator::new(
                stocks.clone(),
                predictions,
                models.clone(),
                explainer,
            )),
            fundamentals: Arc::new(FundamentalsService::new(stocks)),
            analytics: Arc::new(PredictionAnalytics::new(db.pool().clone())),
            models,
            db,
            api_keys: Arc::new(api_keys),
            enable_hsts: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Handler error rendered as the standard JSON envelope.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
    data: Option<serde_json::Value>,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self {
            status,
            error,
            data: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, error)
    }
}

impl From<PredictionError> for AppError {
    fn from(err: PredictionError) -> Self {
        let status = match &err {
            PredictionError::NotFound(_) => StatusCode::NOT_FOUND,
            PredictionError::PreconditionFailed(_) | PredictionError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            PredictionError::Forbidden(_) => StatusCode::FORBIDDEN,
            PredictionError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PredictionError::Persistence { .. } | PredictionError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        match err {
            PredictionError::NotFound(msg)
            | PredictionError::PreconditionFailed(msg)
            | PredictionError::InvalidRequest(msg)
            | PredictionError::Forbidden(msg) => Self::with_status(status, anyhow::anyhow!(msg)),
            PredictionError::Persistence { message, response } => Self {
                status,
                error: anyhow::anyhow!("Prediction computed but could not be saved: {message}"),
                data: serde_json::to_value(&response).ok(),
            },
            other => Self::with_status(status, anyhow::anyhow!(other.to_string())),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "Request failed: {:#}", self.error);
        } else {
            tracing::debug!(status = %self.status, "Request rejected: {}", self.error);
        }

        (
            self.status,
            Json(json!({
                "success": false,
                "data": self.data,
                "error": self.error.to_string(),
            })),
        )
            .into_response()
    }
}

/// Liveness only; model readiness is reported by `/api/predict/health`.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let database = state.db.ping().await;
    Json(json!({
        "status": if database { "healthy" } else { "degraded" },
        "database": database,
    }))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any);

    if allowed_origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    cors.allow_origin(origins)
}

/// Full router: open probes, user routes behind API key auth, admin routes
/// behind auth plus the admin role.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .merge(prediction_routes::probe_routes());

    let user = Router::new()
        .merge(prediction_routes::prediction_routes())
        .merge(stock_routes::stock_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let admin = Router::new()
        .merge(analytics_routes::admin_routes())
        .merge(stock_routes::stock_admin_routes())
        .route_layer(middleware::from_fn(auth::require_admin_middleware))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .merge(public)
        .merge(user)
        .merge(admin)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            security_headers::security_headers_middleware,
        ))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http().make_span_with(request_id::make_request_span))
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}

pub fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env()?;
    tracing::info!("Starting prediction API server");

    let db = PredictionDb::new(&config.database_url).await?;

    // Models load before the listener binds so no request sees a partial registry.
    let models_path = config.models_path.clone();
    let models = tokio::task::spawn_blocking(move || ModelHandle::load(models_path)).await?;
    if !models.is_ready() {
        tracing::warn!(
            "Not all models loaded from {}; predictions will fail until reload",
            config.models_path
        );
    }

    let explainer = Explainer::new(ExplainerConfig {
        seed: config.explainer_seed,
        ..ExplainerConfig::default()
    });

    let api_keys = ApiKeys::parse(&config.api_keys);
    if api_keys.is_empty() {
        tracing::warn!("API_KEYS not set; running in development mode without authentication");
    } else {
        tracing::info!("Loaded {} API keys", api_keys.len());
    }

    let mut state = AppState::new(db, Arc::new(models), explainer, api_keys);
    state.enable_hsts = config.enable_hsts;

    let app = build_router(state, &config.allowed_origins);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
