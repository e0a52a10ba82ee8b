//! Loads a user's unreconciled transactions and prepares them for the
//! classifier.

use crate::models::PreparedTransaction;
use crate::services::store::TransactionStore;
use service_core::error::AppError;
use tracing::{debug, instrument};

#[instrument(skip(store), fields(user_id = %user_id))]
pub async fn fetch_prepared_transactions(
    store: &dyn TransactionStore,
    user_id: &str,
) -> Result<Vec<PreparedTransaction>, AppError> {
    let rows = store.fetch_unreconciled_transactions(user_id).await?;

    let prepared: Vec<PreparedTransaction> = rows
        .into_iter()
        .filter(|t| t.awaits_reconciliation())
        .map(PreparedTransaction::from)
        .collect();

    let enriched = prepared.iter().filter(|t| t.enrichment.is_some()).count();
    debug!(
        count = prepared.len(),
        enriched = enriched,
        "Prepared transactions for classification"
    );

    Ok(prepared)
}
