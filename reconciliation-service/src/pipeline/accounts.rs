//! Loads the active chart of accounts as an immutable per-run snapshot.

use super::PipelineError;
use crate::models::ChartSnapshot;
use crate::services::store::TransactionStore;
use tracing::{info, instrument};

#[instrument(skip(store))]
pub async fn load_chart_snapshot(store: &dyn TransactionStore) -> Result<ChartSnapshot, PipelineError> {
    let entries = store
        .fetch_active_accounts()
        .await
        .map_err(PipelineError::LoadAccounts)?;

    let snapshot = ChartSnapshot::from_entries(&entries);
    if snapshot.is_empty() {
        return Err(PipelineError::NoActiveAccounts);
    }

    info!(accounts = snapshot.candidates.len(), "Chart of accounts snapshot ready");
    Ok(snapshot)
}
