//! Domain models for reconciliation-service.

#![allow(clippy::should_implement_trait)]

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

/// Prefix of the account code recorded for groups whose batch failed.
pub const ERROR_SENTINEL_PREFIX: &str = "ERROR";

// ============================================================================
// Attribution
// ============================================================================

/// Who set a transaction's chart-of-accounts classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attribution {
    #[serde(rename = "AI")]
    Ai,
    #[serde(rename = "USER")]
    User,
}

impl Attribution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "AI",
            Self::User => "USER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "AI" => Some(Self::Ai),
            "USER" => Some(Self::User),
            _ => None,
        }
    }
}

// ============================================================================
// Transaction Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    /// Negative amounts leave the account; zero and positive amounts arrive.
    pub fn from_amount(amount: i64) -> Self {
        if amount < 0 {
            Self::Outgoing
        } else {
            Self::Incoming
        }
    }
}

/// A bank ledger row as read for reconciliation, with any enrichment joined in.
#[derive(Debug, Clone, FromRow)]
pub struct BankTransaction {
    pub id: String,
    pub user_id: String,
    pub creditor_name: Option<String>,
    pub debtor_name: Option<String>,
    /// Signed amount in minor currency units.
    pub amount: i64,
    pub currency: Option<String>,
    pub remittance_info: Option<String>,
    pub coa_set_by: Option<String>,
    pub enrichment: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

impl BankTransaction {
    pub fn direction(&self) -> Direction {
        Direction::from_amount(self.amount)
    }

    /// Counterparty shown to the classifier: the creditor (payee) for money
    /// going out, the debtor (payer) for money coming in. Falls back to the
    /// other side when the preferred one is missing.
    pub fn entity_name(&self) -> String {
        let (preferred, fallback) = match self.direction() {
            Direction::Outgoing => (&self.creditor_name, &self.debtor_name),
            Direction::Incoming => (&self.debtor_name, &self.creditor_name),
        };
        non_blank(preferred)
            .or_else(|| non_blank(fallback))
            .unwrap_or_default()
    }

    pub fn attribution(&self) -> Option<Attribution> {
        self.coa_set_by.as_deref().and_then(Attribution::from_str)
    }

    /// Whether the pipeline should pick this row up: never classified by the
    /// pipeline itself and never classified by a person.
    pub fn awaits_reconciliation(&self) -> bool {
        self.attribution().is_none()
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Fields read out of a third-party enrichment document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentSummary {
    pub entity: Option<String>,
    pub category: Option<String>,
}

impl EnrichmentSummary {
    /// Returns `None` when the document carries neither field.
    pub fn from_document(doc: &serde_json::Value) -> Option<Self> {
        let entity = doc
            .pointer("/entities/counterparty/name")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let category = doc
            .pointer("/categories/general")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        if entity.is_none() && category.is_none() {
            None
        } else {
            Some(Self { entity, category })
        }
    }
}

/// A transaction flattened into the shape the classifier works with.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTransaction {
    pub id: String,
    pub entity_name: String,
    pub amount: i64,
    pub currency: Option<String>,
    pub remittance_info: Option<String>,
    pub enrichment: Option<EnrichmentSummary>,
}

impl PreparedTransaction {
    /// Amount in major units, e.g. `-999` becomes `-9.99`.
    pub fn major_amount(&self) -> Decimal {
        Decimal::new(self.amount, 2)
    }

    /// The grouping key: the remittance text, unless it is missing or blank.
    pub fn grouping_key(&self) -> Option<&str> {
        self.remittance_info
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }
}

impl From<BankTransaction> for PreparedTransaction {
    fn from(t: BankTransaction) -> Self {
        let entity_name = t.entity_name();
        let enrichment = t.enrichment.as_ref().and_then(EnrichmentSummary::from_document);
        Self {
            id: t.id,
            entity_name,
            amount: t.amount,
            currency: t.currency,
            remittance_info: t.remittance_info,
            enrichment,
        }
    }
}

// ============================================================================
// Chart of Accounts Models
// ============================================================================

pub const ACTIVE_ACCOUNT_STATUS: &str = "ACTIVE";

#[derive(Debug, Clone, FromRow)]
pub struct ChartOfAccountsEntry {
    pub account_id: Uuid,
    pub code: String,
    pub name: String,
    pub account_type: String,
    pub account_class: Option<String>,
    pub description: Option<String>,
    pub status: String,
}

impl ChartOfAccountsEntry {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case(ACTIVE_ACCOUNT_STATUS)
    }
}

/// Projection of an account embedded in the classification prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountCandidate {
    pub code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: String,
    pub description: String,
    #[serde(rename = "class")]
    pub account_class: String,
}

impl From<&ChartOfAccountsEntry> for AccountCandidate {
    fn from(a: &ChartOfAccountsEntry) -> Self {
        Self {
            code: a.code.clone(),
            name: a.name.clone(),
            account_type: a.account_type.clone(),
            description: a.description.clone().unwrap_or_default(),
            account_class: a.account_class.clone().unwrap_or_default(),
        }
    }
}

/// The active chart for one run: prompt candidates plus code lookup.
#[derive(Debug, Clone, Default)]
pub struct ChartSnapshot {
    pub candidates: Vec<AccountCandidate>,
    pub code_to_id: HashMap<String, Uuid>,
}

impl ChartSnapshot {
    /// Builds the snapshot, dropping anything that is not active.
    pub fn from_entries(entries: &[ChartOfAccountsEntry]) -> Self {
        let active: Vec<&ChartOfAccountsEntry> = entries.iter().filter(|a| a.is_active()).collect();
        Self {
            candidates: active.iter().map(|a| AccountCandidate::from(*a)).collect(),
            code_to_id: active
                .iter()
                .map(|a| (a.code.clone(), a.account_id))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn resolve(&self, code: &str) -> Option<Uuid> {
        self.code_to_id.get(code.trim()).copied()
    }
}

// ============================================================================
// Grouping & Classification Models
// ============================================================================

/// Transactions sharing one grouping key, classified once through the
/// representative (the first member in fetch order).
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionGroup {
    pub key: Option<String>,
    pub representative: PreparedTransaction,
    pub member_ids: Vec<String>,
}

impl TransactionGroup {
    pub fn size(&self) -> usize {
        self.member_ids.len()
    }
}

/// One classification decision for a group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub account: String,
    pub reasoning: String,
    pub confidence: f64,
}

impl Classification {
    pub fn error(reason: impl std::fmt::Display) -> Self {
        Self {
            account: format!("{}: {}", ERROR_SENTINEL_PREFIX, reason),
            reasoning: String::new(),
            confidence: 0.0,
        }
    }

    /// True only for the `ERROR: <reason>` sentinel, so a real code such as
    /// `ERRORS` still maps.
    pub fn is_error(&self) -> bool {
        self.account
            .strip_prefix(ERROR_SENTINEL_PREFIX)
            .is_some_and(|rest| rest.starts_with(": "))
    }
}

/// Partial update written back to a transaction row.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationUpdate {
    pub account_id: Uuid,
    pub reason: String,
    pub confidence: f64,
    pub set_by: Attribution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    Pending,
    Updated,
    Skipped,
    Failed,
}

/// Outcome of the pipeline for a single transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub transaction_id: String,
    pub account_code: String,
    pub account_id: Option<Uuid>,
    pub reasoning: String,
    pub confidence: f64,
    pub set_by: Attribution,
    pub outcome: RowOutcome,
}

impl ClassificationResult {
    /// The update payload, or `None` when the result cannot be persisted
    /// (unresolved account or unusable confidence).
    pub fn update(&self) -> Option<ClassificationUpdate> {
        let account_id = self.account_id?;
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return None;
        }
        Some(ClassificationUpdate {
            account_id,
            reason: self.reasoning.clone(),
            confidence: self.confidence,
            set_by: self.set_by,
        })
    }
}

// ============================================================================
// Run Report
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersistTally {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub run_id: Uuid,
    pub user_id: String,
    pub transactions: usize,
    pub groups: usize,
    pub batches: usize,
    pub failed_batches: usize,
    #[serde(flatten)]
    pub tally: PersistTally,
    pub started_utc: DateTime<Utc>,
    pub completed_utc: DateTime<Utc>,
    pub results: Vec<ClassificationResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transaction(amount: i64, creditor: Option<&str>, debtor: Option<&str>) -> BankTransaction {
        BankTransaction {
            id: "t1".to_string(),
            user_id: "u1".to_string(),
            creditor_name: creditor.map(str::to_string),
            debtor_name: debtor.map(str::to_string),
            amount,
            currency: Some("GBP".to_string()),
            remittance_info: Some("NETFLIX".to_string()),
            coa_set_by: None,
            enrichment: None,
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn outgoing_uses_creditor_and_incoming_uses_debtor() {
        assert_eq!(
            transaction(-999, Some("Netflix"), Some("Acme Ltd")).entity_name(),
            "Netflix"
        );
        assert_eq!(
            transaction(50_000, Some("Acme Ltd"), Some("Client plc")).entity_name(),
            "Client plc"
        );
    }

    #[test]
    fn entity_name_falls_back_to_other_side() {
        assert_eq!(transaction(-100, None, Some("Payer")).entity_name(), "Payer");
        assert_eq!(transaction(100, Some("  "), None).entity_name(), "");
    }

    #[test]
    fn human_and_ai_rows_are_not_pending() {
        let mut t = transaction(-100, None, None);
        assert!(t.awaits_reconciliation());
        t.coa_set_by = Some("AI".to_string());
        assert!(!t.awaits_reconciliation());
        t.coa_set_by = Some("USER".to_string());
        assert!(!t.awaits_reconciliation());
        t.coa_set_by = Some("import".to_string());
        assert!(t.awaits_reconciliation());
    }

    #[test]
    fn only_the_full_sentinel_counts_as_error() {
        assert!(Classification::error("upstream 500").is_error());

        let real = Classification {
            account: "ERRORS".to_string(),
            reasoning: "suspense".to_string(),
            confidence: 0.5,
        };
        assert!(!real.is_error());
    }

    #[test]
    fn enrichment_summary_reads_nested_fields() {
        let doc = json!({
            "entities": {"counterparty": {"name": "Amazon Web Services"}},
            "categories": {"general": "cloud computing"}
        });
        let summary = EnrichmentSummary::from_document(&doc).unwrap();
        assert_eq!(summary.entity.as_deref(), Some("Amazon Web Services"));
        assert_eq!(summary.category.as_deref(), Some("cloud computing"));

        assert!(EnrichmentSummary::from_document(&json!({"location": {}})).is_none());
    }

    #[test]
    fn major_amount_keeps_sign() {
        let prepared = PreparedTransaction::from(transaction(-999, None, None));
        assert_eq!(prepared.major_amount().to_string(), "-9.99");
    }

    #[test]
    fn snapshot_excludes_inactive_accounts() {
        let active = ChartOfAccountsEntry {
            account_id: Uuid::new_v4(),
            code: "6020".to_string(),
            name: "Software Subscriptions".to_string(),
            account_type: "EXPENSE".to_string(),
            account_class: Some("EXPENSE".to_string()),
            description: None,
            status: "ACTIVE".to_string(),
        };
        let archived = ChartOfAccountsEntry {
            code: "6999".to_string(),
            status: "ARCHIVED".to_string(),
            account_id: Uuid::new_v4(),
            ..active.clone()
        };

        let snapshot = ChartSnapshot::from_entries(&[active.clone(), archived]);
        assert_eq!(snapshot.candidates.len(), 1);
        assert_eq!(snapshot.resolve("6020"), Some(active.account_id));
        assert_eq!(snapshot.resolve("6999"), None);
    }

    #[test]
    fn update_requires_resolved_account_and_valid_confidence() {
        let mut result = ClassificationResult {
            transaction_id: "t1".to_string(),
            account_code: "6020".to_string(),
            account_id: None,
            reasoning: "subscription".to_string(),
            confidence: 0.9,
            set_by: Attribution::Ai,
            outcome: RowOutcome::Pending,
        };
        assert!(result.update().is_none());

        result.account_id = Some(Uuid::new_v4());
        assert!(result.update().is_some());

        result.confidence = f64::NAN;
        assert!(result.update().is_none());
    }
}
