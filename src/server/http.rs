use crate::auth::{AuthSession, CallbackOutcome, CallbackParams, OAuthCallback};
use axum::{
    extract::{RawQuery, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::trace::{self, TraceLayer};
use tracing::error;

/// Callback listener state
#[derive(Clone)]
pub struct AppState {
    pub session: AuthSession,
    pub callback: Arc<OAuthCallback>,
    pub outcomes: mpsc::UnboundedSender<CallbackOutcome>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Provider redirect target
        .route("/oauth", get(oauth_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
        .with_state(state)
}

/// GET /oauth?code=...&state=...
pub async fn oauth_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    let params = CallbackParams::from_query(query.as_deref().unwrap_or_default());
    let outcome = state.callback.handle(params).await;
    let status = status_for(&outcome);
    let message = outcome.message();

    // The receiver is gone once the listener stopped waiting
    let _ = state.outcomes.send(outcome);

    (
        status,
        Html(format!(
            "<!doctype html><html><head><title>Admin OAuth</title></head>\
             <body><h1>Admin OAuth</h1><p>{}</p></body></html>",
            message
        )),
    )
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let auth = state.session.state();
    Json(json!({
        "status": "healthy",
        "version": crate::VERSION,
        "session": auth.phase(),
    }))
}

/// GET /metrics (Prometheus format)
pub async fn metrics_handler() -> Result<String, StatusCode> {
    crate::metrics::METRICS.render().map_err(|e| {
        error!("Failed to render metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

fn status_for(outcome: &CallbackOutcome) -> StatusCode {
    match outcome {
        CallbackOutcome::LoggedIn | CallbackOutcome::AlreadyAuthenticated => StatusCode::OK,
        CallbackOutcome::MissingCode | CallbackOutcome::StateMismatch => StatusCode::BAD_REQUEST,
        CallbackOutcome::Suppressed => StatusCode::CONFLICT,
        CallbackOutcome::Failed => StatusCode::UNAUTHORIZED,
        CallbackOutcome::ServerError(_) => StatusCode::BAD_GATEWAY,
    }
}
