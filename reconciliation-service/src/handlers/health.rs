use crate::services::get_metrics;
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use service_core::observability::render_recorded_metrics;

/// Liveness probe. Fails when the store is unreachable.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.pipeline.store().health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": state.config.service_name,
                    "environment": state.config.common.environment,
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": state.config.service_name,
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness probe: the store and the model provider must both answer.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if let Err(e) = state.pipeline.store().health_check().await {
        tracing::warn!(error = %e, "Readiness check failed - store unavailable");
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    let provider = state.pipeline.provider();
    match provider.health_check().await {
        Ok(_) => {
            tracing::debug!("Readiness check passed");
            StatusCode::OK
        }
        Err(e) => {
            tracing::warn!(provider = provider.name(), error = %e, "Readiness check failed - provider unavailable");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Prometheus scrape endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let mut body = get_metrics();
    body.push_str(&render_recorded_metrics());
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        body,
    )
}
