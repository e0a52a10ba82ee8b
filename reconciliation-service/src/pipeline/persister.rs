//! Writes classification results back to the store.

use crate::models::{ClassificationResult, PersistTally, RowOutcome};
use crate::services::metrics;
use crate::services::store::TransactionStore;
use tracing::{debug, error, info, instrument};

/// Persists every resolvable result and records each row's outcome on it.
///
/// Unresolvable rows are skipped. A failed or no-op write counts as a
/// failure. Nothing is retried and no row stops the others.
#[instrument(skip(store, results), fields(rows = results.len()))]
pub async fn persist_results(
    store: &dyn TransactionStore,
    results: &mut [ClassificationResult],
) -> PersistTally {
    let mut tally = PersistTally::default();

    for result in results.iter_mut() {
        let Some(update) = result.update() else {
            debug!(
                transaction_id = %result.transaction_id,
                account_code = %result.account_code,
                "Skipping transaction without a resolved classification"
            );
            result.outcome = RowOutcome::Skipped;
            tally.skipped += 1;
            continue;
        };

        match store
            .update_classification(&result.transaction_id, &update)
            .await
        {
            Ok(true) => {
                result.outcome = RowOutcome::Updated;
                tally.updated += 1;
            }
            Ok(false) => {
                error!(
                    transaction_id = %result.transaction_id,
                    "No row updated for transaction"
                );
                result.outcome = RowOutcome::Failed;
                tally.failed += 1;
            }
            Err(e) => {
                error!(
                    transaction_id = %result.transaction_id,
                    error = %e,
                    "Error updating transaction"
                );
                result.outcome = RowOutcome::Failed;
                tally.failed += 1;
            }
        }
    }

    metrics::record_rows("updated", tally.updated);
    metrics::record_rows("skipped", tally.skipped);
    metrics::record_rows("failed", tally.failed);

    info!(
        updated = tally.updated,
        skipped = tally.skipped,
        failed = tally.failed,
        total = results.len(),
        "Persisted reconciliation results"
    );

    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attribution, BankTransaction};
    use crate::services::store::MemoryStore;
    use chrono::Utc;
    use uuid::Uuid;

    fn stored(store: &MemoryStore, id: &str) {
        store.insert_transaction(BankTransaction {
            id: id.to_string(),
            user_id: "u1".to_string(),
            creditor_name: None,
            debtor_name: None,
            amount: -100,
            currency: None,
            remittance_info: None,
            coa_set_by: None,
            enrichment: None,
            created_utc: Utc::now(),
        });
    }

    fn result(id: &str, account_id: Option<Uuid>) -> ClassificationResult {
        ClassificationResult {
            transaction_id: id.to_string(),
            account_code: "6020".to_string(),
            account_id,
            reasoning: "subscription".to_string(),
            confidence: 0.9,
            set_by: Attribution::Ai,
            outcome: RowOutcome::Pending,
        }
    }

    #[tokio::test]
    async fn tallies_updated_skipped_and_failed_rows() {
        let store = MemoryStore::new();
        for id in ["ok", "skip", "broken"] {
            stored(&store, id);
        }
        store.fail_updates_for("broken");
        let account = Uuid::new_v4();

        let mut results = vec![
            result("ok", Some(account)),
            result("skip", None),
            result("broken", Some(account)),
            result("missing", Some(account)),
        ];

        let tally = persist_results(&store, &mut results).await;

        assert_eq!(
            tally,
            PersistTally {
                updated: 1,
                skipped: 1,
                failed: 2
            }
        );
        assert_eq!(results[0].outcome, RowOutcome::Updated);
        assert_eq!(results[1].outcome, RowOutcome::Skipped);
        assert_eq!(results[2].outcome, RowOutcome::Failed);
        assert_eq!(results[3].outcome, RowOutcome::Failed);

        let written = store.classification_of("ok").unwrap();
        assert_eq!(written.account_id, account);
        assert_eq!(written.set_by, Attribution::Ai);
        assert!(store.classification_of("skip").is_none());
        assert_eq!(store.update_calls(), 3);
    }
}
