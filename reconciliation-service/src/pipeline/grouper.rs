//! Clusters transactions by remittance text so each distinct narration is
//! classified once.

use crate::models::{PreparedTransaction, TransactionGroup};
use std::collections::HashMap;

/// Partitions `transactions` by exact remittance text.
///
/// Groups appear in order of first appearance and the representative is the
/// first member in input order. Transactions with a missing or blank
/// remittance each form their own group.
pub fn group_transactions(transactions: &[PreparedTransaction]) -> Vec<TransactionGroup> {
    let mut groups: Vec<TransactionGroup> = Vec::new();
    let mut by_key: HashMap<&str, usize> = HashMap::new();

    for transaction in transactions {
        let Some(key) = transaction.grouping_key() else {
            groups.push(TransactionGroup {
                key: None,
                representative: transaction.clone(),
                member_ids: vec![transaction.id.clone()],
            });
            continue;
        };

        match by_key.get(key).copied() {
            Some(index) => groups[index].member_ids.push(transaction.id.clone()),
            None => {
                by_key.insert(key, groups.len());
                groups.push(TransactionGroup {
                    key: Some(key.to_string()),
                    representative: transaction.clone(),
                    member_ids: vec![transaction.id.clone()],
                });
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn prepared(id: &str, remittance: Option<&str>) -> PreparedTransaction {
        PreparedTransaction {
            id: id.to_string(),
            entity_name: String::new(),
            amount: -100,
            currency: None,
            remittance_info: remittance.map(str::to_string),
            enrichment: None,
        }
    }

    fn memberships(groups: &[TransactionGroup]) -> BTreeSet<BTreeSet<String>> {
        groups
            .iter()
            .map(|g| g.member_ids.iter().cloned().collect())
            .collect()
    }

    #[test]
    fn groups_by_exact_remittance_in_first_appearance_order() {
        let input = vec![
            prepared("t1", Some("NETFLIX")),
            prepared("t2", Some("AWS INVOICE")),
            prepared("t3", Some("NETFLIX")),
            prepared("t4", Some("netflix")),
        ];

        let groups = group_transactions(&input);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].key.as_deref(), Some("NETFLIX"));
        assert_eq!(groups[0].member_ids, vec!["t1", "t3"]);
        assert_eq!(groups[0].representative.id, "t1");
        assert_eq!(groups[0].size(), 2);
        assert_eq!(groups[1].key.as_deref(), Some("AWS INVOICE"));
        assert_eq!(groups[2].key.as_deref(), Some("netflix"));
    }

    #[test]
    fn blank_remittance_is_never_merged() {
        let input = vec![
            prepared("t1", None),
            prepared("t2", Some("   ")),
            prepared("t3", None),
        ];

        let groups = group_transactions(&input);

        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| g.key.is_none() && g.size() == 1));
    }

    #[test]
    fn regrouping_any_order_yields_same_membership() {
        let input = vec![
            prepared("t1", Some("A")),
            prepared("t2", Some("B")),
            prepared("t3", Some("A")),
            prepared("t4", None),
            prepared("t5", Some("B")),
        ];
        let mut reversed = input.clone();
        reversed.reverse();

        let first = group_transactions(&input);
        let again = group_transactions(&input);
        let other_order = group_transactions(&reversed);

        assert_eq!(first, again);
        assert_eq!(memberships(&first), memberships(&other_order));
    }

    #[test]
    fn every_transaction_lands_in_exactly_one_group() {
        let input: Vec<PreparedTransaction> = (0..20)
            .map(|i| {
                let remittance = match i % 4 {
                    0 => None,
                    1 => Some("RENT"),
                    2 => Some("PAYROLL"),
                    _ => Some("RENT"),
                };
                prepared(&format!("t{i}"), remittance)
            })
            .collect();

        let groups = group_transactions(&input);
        let mut seen: Vec<String> = groups.iter().flat_map(|g| g.member_ids.clone()).collect();
        seen.sort();
        let mut expected: Vec<String> = input.iter().map(|t| t.id.clone()).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }
}
