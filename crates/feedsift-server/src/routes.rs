//! HTTP routes and handlers

use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use feedsift_core::{EvaluationResult, PayloadSummary, Prompt, SourceKind};
use feedsift_pipeline::{Delivery, DeliveryLoop};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(stream_matches))
        .route("/v1/stream", get(stream_matches))
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .route("/metrics", get(metrics))
        .fallback(fallback)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics exporter not installed",
        )
            .into_response(),
    }
}

async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.metrics.snapshot();
    Json(json!({
        "metrics": snapshot,
        "avg_latency_ms": snapshot.avg_latency_ms(),
        "match_rate": snapshot.match_rate(),
        "in_flight": state.scheduler.in_flight(),
        "sources": state.scheduler.sources(),
        "subscriptions": state.registry.summaries(),
    }))
}

/// Query parameters of the streaming endpoint
#[derive(Debug, Deserialize)]
pub struct StreamParams {
    pub prompt: Option<String>,
    /// Comma-separated source names; all sources when absent
    pub sources: Option<String>,
}

/// One event on the wire
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEvent {
    pub content_item_id: String,
    pub source: SourceKind,
    pub summary: PayloadSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl From<EvaluationResult> for MatchEvent {
    fn from(result: EvaluationResult) -> Self {
        Self {
            content_item_id: result.content_item_id,
            source: result.source,
            summary: result.summary,
            rationale: result.rationale,
            score: result.score,
            timestamp: result.timestamp,
        }
    }
}

/// Open a subscription and stream its matches until the client leaves
async fn stream_matches(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Result<Response, AppError> {
    let prompt = params
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::InvalidRequest("Missing 'prompt' parameter".to_string()))?;
    let filter = parse_source_filter(&state, params.sources.as_deref())?;

    let id = state.registry.register(Prompt::new(prompt), filter);
    let delivery = DeliveryLoop::new(
        state.registry.clone(),
        id,
        state.config.delivery.idle_timeout(),
        state.shutdown.clone(),
        state.metrics.clone(),
    )?
    .with_keepalive(state.config.delivery.keepalive());
    info!(subscription = %id, "stream opened");

    // Keep-alives come from the delivery loop so that each one the client
    // reads counts as activity
    let events = futures::stream::unfold(delivery, |mut delivery| async move {
        let event = match delivery.next().await? {
            Delivery::Match(result) => to_event(result),
            Delivery::KeepAlive => Ok(Event::default().comment("")),
        };
        Some((event, delivery))
    });

    let sse = Sse::new(events);

    Ok((
        [
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (X_ACCEL_BUFFERING, HeaderValue::from_static("no")),
        ],
        sse,
    )
        .into_response())
}

fn to_event(result: EvaluationResult) -> Result<Event, axum::Error> {
    let id = result.content_item_id.clone();
    let event = Event::default().json_data(MatchEvent::from(result))?;

    // Event::id rejects line breaks and NUL
    if id.contains(['\n', '\r', '\0']) {
        debug!(item = %id.escape_debug(), "item id not usable as event id");
        Ok(event)
    } else {
        Ok(event.id(id))
    }
}

fn parse_source_filter(
    state: &AppState,
    sources: Option<&str>,
) -> Result<Option<BTreeSet<SourceKind>>, AppError> {
    let Some(sources) = sources else {
        return Ok(None);
    };

    let mut filter = BTreeSet::new();
    for name in sources.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let kind = SourceKind::from(name);
        if !state.has_source(&kind) {
            return Err(AppError::InvalidRequest(format!("Unknown source '{}'", name)));
        }
        filter.insert(kind);
    }

    Ok(if filter.is_empty() { None } else { Some(filter) })
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Error handling
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl From<feedsift_core::Error> for AppError {
    fn from(err: feedsift_core::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        }

        let body = json!({
            "error": {
                "message": self.to_string(),
                "type": kind,
            }
        });

        (status, Json(body)).into_response()
    }
}
