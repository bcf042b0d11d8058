//! HTTP host for the gateway
//!
//! Axum server exposing the chat endpoint plus plain JSON health and metrics.
//! CORS preflight and method rejection are handled here; the pipeline only
//! ever sees POST bodies.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    BoxError, Json, Router,
    body::{Body, Bytes},
    error_handling::HandleErrorLayer,
    extract::State,
    http::{Method, Request, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::pipeline::Gateway;
use crate::scope::ScopeVerdict;

/// Shared state for HTTP server
#[derive(Clone)]
pub struct HttpState {
    pub gateway: Arc<Gateway>,
    pub metrics: Arc<Mutex<HttpMetrics>>,
}

impl HttpState {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            metrics: Arc::new(Mutex::new(HttpMetrics::new())),
        }
    }
}

/// Metrics for HTTP server
#[derive(Debug, Clone)]
pub struct HttpMetrics {
    pub total_requests: u64,
    pub errors_total: u64,
    pub in_scope_total: u64,
    pub out_of_scope_total: u64,
    pub last_request_at: Option<DateTime<Utc>>,
    pub latencies: Vec<f64>, // ring buffer for p95
}

impl HttpMetrics {
    fn new() -> Self {
        Self {
            total_requests: 0,
            errors_total: 0,
            in_scope_total: 0,
            out_of_scope_total: 0,
            last_request_at: None,
            latencies: Vec::with_capacity(256),
        }
    }

    fn record_latency(&mut self, latency_ms: f64) {
        if latency_ms > 0.0 {
            self.latencies.push(latency_ms);
            if self.latencies.len() > 256 {
                self.latencies.remove(0);
            }
        }
    }
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    "ok"
}

/// Metrics endpoint
pub async fn metrics_handler(State(state): State<HttpState>) -> impl IntoResponse {
    let metrics = state.metrics.lock().await.clone();

    let (avg_latency_ms, p95_latency_ms) = if metrics.latencies.is_empty() {
        (None, None)
    } else {
        let sum: f64 = metrics.latencies.iter().sum();
        let avg = sum / metrics.latencies.len() as f64;
        let mut sorted = metrics.latencies.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let p95_idx = ((sorted.len() as f64 * 0.95) as usize).min(sorted.len() - 1);
        (Some(avg), sorted.get(p95_idx).copied())
    };

    Json(json!({
        "metrics_version": "1",
        "total_requests": metrics.total_requests,
        "errors_total": metrics.errors_total,
        "in_scope_total": metrics.in_scope_total,
        "out_of_scope_total": metrics.out_of_scope_total,
        "avg_latency_ms": avg_latency_ms,
        "p95_latency_ms": p95_latency_ms,
        "last_request_at": metrics.last_request_at.map(|t| t.to_rfc3339()),
    }))
}

/// POST handler: runs the pipeline and converts the result into exactly one response
pub async fn chat_handler(State(state): State<HttpState>, body: Bytes) -> Response {
    match state.gateway.handle_bytes(&body).await {
        Ok(answer) => {
            let mut m = state.metrics.lock().await;
            match answer.scope {
                ScopeVerdict::In => m.in_scope_total = m.in_scope_total.saturating_add(1),
                ScopeVerdict::Out => {
                    m.out_of_scope_total = m.out_of_scope_total.saturating_add(1)
                }
            }
            drop(m);
            (StatusCode::OK, Json(answer)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

/// Bare OPTIONS requests that are not CORS preflights still get a 200
pub async fn preflight_handler() -> StatusCode {
    StatusCode::OK
}

pub async fn method_not_allowed(method: Method) -> Response {
    GatewayError::MethodNotAllowed {
        method: method.to_string(),
    }
    .into_response()
}

async fn handle_timeout_error(err: BoxError) -> Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        GatewayError::Transport {
            reason: "request timed out".to_string(),
        }
        .into_response()
    } else {
        GatewayError::Internal {
            message: err.to_string(),
        }
        .into_response()
    }
}

async fn track_metrics(
    State(metrics): State<Arc<Mutex<HttpMetrics>>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let resp = next.run(req).await;
    let latency_ms = start.elapsed().as_millis() as f64;
    let mut m = metrics.lock().await;
    m.record_latency(latency_ms);
    if !resp.status().is_success() {
        m.errors_total = m.errors_total.saturating_add(1);
    }
    m.total_requests = m.total_requests.saturating_add(1);
    m.last_request_at = Some(Utc::now());
    resp
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Build the application router. `request_timeout` bounds the whole chat
/// request, including the in-flight upstream call.
pub fn router(state: HttpState, chat_path: &str, request_timeout: Option<Duration>) -> Router {
    let chat = post(chat_handler)
        .options(preflight_handler)
        .fallback(method_not_allowed);

    let chat = match request_timeout {
        Some(timeout) => chat.layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .timeout(timeout),
        ),
        None => chat,
    };

    // Metrics sit outside the timeout so timed-out requests are still counted
    let chat = chat.route_layer(middleware::from_fn_with_state(
        state.metrics.clone(),
        track_metrics,
    ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route(chat_path, chat)
        .layer(cors_layer())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_http_server(config: &Config, gateway: Arc<Gateway>) -> Result<()> {
    let state = HttpState::new(gateway);
    let timeout = config.runtime.request_timeout_ms.map(Duration::from_millis);
    let app = router(state, &config.runtime.chat_path, timeout);

    let listener = tokio::net::TcpListener::bind(config.runtime.http_bind)
        .await
        .map_err(|e| GatewayError::Internal {
            message: format!("Failed to bind HTTP listener: {}", e),
        })?;

    tracing::info!(
        "Starting HTTP server on {} (chat at {})",
        config.runtime.http_bind,
        config.runtime.chat_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GatewayError::Internal {
            message: format!("HTTP server error: {}", e),
        })?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Shutdown signal received");
    }
}

