//! Expands group classifications to every member and resolves account codes.

use crate::models::{
    Attribution, ChartSnapshot, Classification, ClassificationResult, PreparedTransaction,
    RowOutcome, TransactionGroup,
};
use std::collections::HashMap;
use tracing::warn;

/// One result per transaction, in fetch order.
///
/// `classifications[i]` belongs to `groups[i]`. Codes missing from the chart,
/// ERROR sentinels included, leave `account_id` empty.
pub fn map_results(
    transactions: &[PreparedTransaction],
    groups: &[TransactionGroup],
    classifications: &[Classification],
    chart: &ChartSnapshot,
) -> Vec<ClassificationResult> {
    let mut by_member: HashMap<&str, &Classification> = HashMap::new();
    for (group, classification) in groups.iter().zip(classifications) {
        for id in &group.member_ids {
            by_member.insert(id.as_str(), classification);
        }
    }

    let unclassified = Classification::error("transaction was not classified");

    transactions
        .iter()
        .map(|t| {
            let classification = by_member.get(t.id.as_str()).copied().unwrap_or(&unclassified);
            let account_id = if classification.is_error() {
                None
            } else {
                let resolved = chart.resolve(&classification.account);
                if resolved.is_none() {
                    warn!(
                        transaction_id = %t.id,
                        account_code = %classification.account,
                        "Classified account code is not in the active chart"
                    );
                }
                resolved
            };

            ClassificationResult {
                transaction_id: t.id.clone(),
                account_code: classification.account.clone(),
                account_id,
                reasoning: classification.reasoning.clone(),
                confidence: classification.confidence,
                set_by: Attribution::Ai,
                outcome: RowOutcome::Pending,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChartOfAccountsEntry;
    use crate::pipeline::grouper::group_transactions;
    use uuid::Uuid;

    fn prepared(id: &str, remittance: &str) -> PreparedTransaction {
        PreparedTransaction {
            id: id.to_string(),
            entity_name: String::new(),
            amount: -100,
            currency: None,
            remittance_info: Some(remittance.to_string()),
            enrichment: None,
        }
    }

    fn chart(codes: &[&str]) -> ChartSnapshot {
        let entries: Vec<ChartOfAccountsEntry> = codes
            .iter()
            .map(|code| ChartOfAccountsEntry {
                account_id: Uuid::new_v4(),
                code: code.to_string(),
                name: code.to_string(),
                account_type: "EXPENSE".to_string(),
                account_class: None,
                description: None,
                status: "ACTIVE".to_string(),
            })
            .collect();
        ChartSnapshot::from_entries(&entries)
    }

    fn classification(account: &str, reasoning: &str, confidence: f64) -> Classification {
        Classification {
            account: account.to_string(),
            reasoning: reasoning.to_string(),
            confidence,
        }
    }

    #[test]
    fn members_share_their_group_classification() {
        let transactions = vec![
            prepared("t1", "NETFLIX"),
            prepared("t2", "AWS INVOICE"),
            prepared("t3", "NETFLIX"),
        ];
        let groups = group_transactions(&transactions);
        let chart = chart(&["6020", "6030"]);
        let classifications = vec![
            classification("6020", "subscription", 0.9),
            classification("6030", "hosting", 0.95),
        ];

        let results = map_results(&transactions, &groups, &classifications, &chart);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].transaction_id, "t1");
        assert_eq!(results[2].transaction_id, "t3");
        assert_eq!(results[0].account_code, results[2].account_code);
        assert_eq!(results[0].reasoning, results[2].reasoning);
        assert_eq!(results[0].confidence, results[2].confidence);
        assert_eq!(results[0].account_id, chart.resolve("6020"));
        assert_eq!(results[1].account_id, chart.resolve("6030"));
        assert!(results.iter().all(|r| r.set_by == Attribution::Ai));
    }

    #[test]
    fn code_resembling_the_sentinel_still_resolves() {
        let transactions = vec![prepared("t1", "SUSPENSE")];
        let groups = group_transactions(&transactions);
        let chart = chart(&["ERRORS"]);

        let results = map_results(
            &transactions,
            &groups,
            &[classification("ERRORS", "suspense posting", 0.4)],
            &chart,
        );

        assert_eq!(results[0].account_id, chart.resolve("ERRORS"));
        assert!(results[0].account_id.is_some());
    }

    #[test]
    fn unknown_code_and_error_sentinel_leave_id_empty() {
        let transactions = vec![prepared("t1", "A"), prepared("t2", "B")];
        let groups = group_transactions(&transactions);
        let classifications = vec![
            classification("9999", "hallucinated", 0.8),
            Classification::error("No JSON found"),
        ];

        let results = map_results(&transactions, &groups, &classifications, &chart(&["6020"]));

        assert!(results.iter().all(|r| r.account_id.is_none()));
        assert_eq!(results[0].account_code, "9999");
        assert_eq!(results[1].account_code, "ERROR: No JSON found");
    }
}
