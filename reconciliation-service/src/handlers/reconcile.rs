use crate::models::ReconciliationReport;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use service_core::error::AppError;
use service_core::middleware::RequestId;

/// Runs one reconciliation for `user_id` and returns the run report.
#[tracing::instrument(skip(state, request_id), fields(request_id = tracing::field::Empty))]
pub async fn reconcile_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    request_id: Option<Extension<RequestId>>,
) -> Result<Json<ReconciliationReport>, AppError> {
    if let Some(Extension(RequestId(id))) = &request_id {
        tracing::Span::current().record("request_id", id.as_str());
    }

    let report = state.pipeline.run(&user_id).await?;

    tracing::info!(
        run_id = %report.run_id,
        updated = report.tally.updated,
        skipped = report.tally.skipped,
        failed = report.tally.failed,
        "Reconciliation request completed"
    );

    Ok(Json(report))
}
