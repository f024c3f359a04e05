//! HTTP surface
//!
//! Tools are exposed as `POST /tools/:name` with the JSON arguments as the
//! request body. Callers are keyed by the `x-client-id` header, falling back
//! to the peer address.

use crate::monitoring::HealthMonitor;
use crate::tools::{definitions, ToolService};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub const CLIENT_ID_HEADER: &str = "x-client-id";

pub struct AppState {
    pub tools: ToolService,
    pub health: HealthMonitor,
}

impl AppState {
    pub fn new(tools: ToolService) -> Self {
        Self {
            tools,
            health: HealthMonitor::new(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/tools", get(list_tools_handler))
        .route("/tools/:name", post(call_tool_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

async fn index_handler() -> impl IntoResponse {
    Json(json!({
        "service": "e2e-sessiond",
        "version": e2e_common::VERSION,
        "status": "running",
        "tools": definitions().iter().map(|d| d.name).collect::<Vec<_>>(),
    }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sessions = state.tools.manager().session_count();
    Json(state.health.health(sessions))
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.tools.metrics().metrics())
}

async fn list_tools_handler() -> impl IntoResponse {
    Json(json!({ "tools": definitions() }))
}

async fn call_tool_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let caller = caller_id(&headers, peer.map(|ConnectInfo(addr)| addr));

    let arguments = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => value,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": format!("Invalid JSON body: {}", e),
                        "type": "invalid_arguments"
                    })),
                )
                    .into_response();
            }
        }
    };

    let reply = state.tools.call(&caller, &name, arguments).await;
    let status = match reply.error_kind {
        Some("unknown_tool") => StatusCode::NOT_FOUND,
        Some("rate_limit_exceeded") => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::OK,
    };
    (status, Json(reply.body)).into_response()
}

fn caller_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "anonymous".to_string())
}
