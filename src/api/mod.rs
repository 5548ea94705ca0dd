pub mod auth;

use axum::{
    extract::{Path, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::agents::{AgentStatus, HealthState};
use crate::config::ServerConfig;
use crate::context::ClientContextPreview;
use crate::coordinator::{CoordinationEngine, CoordinationMetrics, SystemHealth};
use crate::error::CoordinationError;
use crate::models::{CoordinationRequest, CoordinationResponse, User};

#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CoordinationEngine>,
    pub api_token: Option<String>,
}

impl AppState {
    pub fn new(engine: Arc<CoordinationEngine>, server: &ServerConfig) -> Self {
        Self {
            engine,
            api_token: server.api_token.clone(),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Forbidden,
    BadRequest(String),
    Coordination(CoordinationError),
}

impl From<CoordinationError> for ApiError {
    fn from(error: CoordinationError) -> Self {
        ApiError::Coordination(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Authentication required".to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Admin privileges required".to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Coordination(CoordinationError::NotFound(what)) => {
                (StatusCode::NOT_FOUND, format!("Not found: {}", what))
            }
            ApiError::Coordination(CoordinationError::AccessDenied { .. }) => {
                (StatusCode::NOT_FOUND, "Not found".to_string())
            }
            ApiError::Coordination(e) => {
                error!(kind = e.kind(), "Request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };
        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub fn router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/admin/agents/:id/restart", post(restart_agent))
        .route("/admin/system/maintenance", post(enter_maintenance))
        .route_layer(middleware::from_fn(auth::require_admin));

    let protected_routes = Router::new()
        .route("/coordinate", post(coordinate))
        .route("/coordinate/client", post(coordinate_for_client))
        .route("/clients", get(list_clients))
        .route("/clients/:id/context", get(preview_client_context))
        .route("/agents/status", get(list_agent_status))
        .route("/agents/:id/status", get(get_agent_status))
        .route("/health/detailed", get(detailed_health))
        .route("/metrics", get(get_metrics))
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::identity_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(protected_routes)
        .layer(middleware::from_fn(process_time_header))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

pub const PROCESS_TIME_HEADER: &str = "x-process-time";

/// Stamps every response with its handling time in seconds.
async fn process_time_header(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = format!("{:.6}", started.elapsed().as_secs_f64());
    if let Ok(value) = HeaderValue::from_str(&elapsed) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }
    response
}

pub async fn start_api_server(state: AppState, server: &ServerConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", server.host, server.api_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

/// Body of `POST /coordinate/client`. Client context is on unless the caller
/// opts out.
#[derive(Debug, Deserialize)]
pub struct ClientCoordinationRequest {
    pub client_id: String,
    #[serde(default = "default_use_client_context")]
    pub use_client_context: bool,
    #[serde(flatten)]
    pub request: CoordinationRequest,
}

fn default_use_client_context() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct HealthSummary {
    pub status: HealthState,
    pub service: &'static str,
    pub version: &'static str,
    pub total_agents: usize,
    pub healthy_agents: usize,
    pub timestamp: chrono::DateTime<Utc>,
}

async fn health(State(state): State<AppState>) -> Json<HealthSummary> {
    let health = state.engine.system_health().await;
    Json(HealthSummary {
        status: health.status,
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        total_agents: health.total_agents,
        healthy_agents: health.healthy_agents,
        timestamp: health.timestamp,
    })
}

async fn detailed_health(State(state): State<AppState>) -> Json<ApiResponse<SystemHealth>> {
    Json(ApiResponse::success(state.engine.system_health().await))
}

async fn coordinate(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(request): Json<CoordinationRequest>,
) -> ApiResult<CoordinationResponse> {
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query cannot be empty".to_string()));
    }
    let response = state.engine.process(request, &user).await?;
    Ok(Json(ApiResponse::success(response)))
}

async fn coordinate_for_client(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(body): Json<ClientCoordinationRequest>,
) -> ApiResult<CoordinationResponse> {
    if body.client_id.trim().is_empty() {
        return Err(ApiError::BadRequest("client_id cannot be empty".to_string()));
    }
    if body.request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query cannot be empty".to_string()));
    }

    let mut request = body.request;
    request.client_id = Some(body.client_id);
    request.use_client_context = body.use_client_context;

    let response = state.engine.process(request, &user).await?;
    Ok(Json(ApiResponse::success(response)))
}

async fn list_clients(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<Vec<String>> {
    let clients = state.engine.list_accessible_clients(&user).await?;
    Ok(Json(ApiResponse::success(clients)))
}

async fn preview_client_context(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(client_id): Path<String>,
) -> ApiResult<ClientContextPreview> {
    let preview = state.engine.preview_client_context(&client_id, &user).await?;
    Ok(Json(ApiResponse::success(preview)))
}

async fn list_agent_status(State(state): State<AppState>) -> ApiResult<Vec<AgentStatus>> {
    let statuses = state.engine.agent_status(None).await?;
    Ok(Json(ApiResponse::success(statuses)))
}

async fn get_agent_status(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> ApiResult<AgentStatus> {
    let mut statuses = state.engine.agent_status(Some(&agent_id)).await?;
    let status = statuses
        .pop()
        .ok_or_else(|| CoordinationError::NotFound(format!("agent {}", agent_id)))?;
    Ok(Json(ApiResponse::success(status)))
}

async fn restart_agent(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(agent_id): Path<String>,
) -> ApiResult<String> {
    info!(target: "audit", user_id = %user.user_id, agent_id = %agent_id, "admin restart");
    state.engine.restart_agent(&agent_id).await?;
    Ok(Json(ApiResponse::success(format!("Agent {} restarted successfully", agent_id))))
}

async fn enter_maintenance(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<String> {
    info!(target: "audit", user_id = %user.user_id, "admin maintenance");
    state.engine.enter_maintenance().await;
    Ok(Json(ApiResponse::success("System entered maintenance mode".to_string())))
}

async fn get_metrics(State(state): State<AppState>) -> Json<ApiResponse<CoordinationMetrics>> {
    Json(ApiResponse::success(state.engine.metrics().await))
}

#[cfg(test)]
mod tests;
