//! Storage abstraction used by the reconciliation pipeline.
//!
//! `Database` is the PostgreSQL implementation; `MemoryStore` keeps rows in
//! process for tests and local dry runs.

use crate::models::{Attribution, BankTransaction, ChartOfAccountsEntry, ClassificationUpdate};
use async_trait::async_trait;
use service_core::error::AppError;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Transactions of `user_id` not yet classified by the pipeline or by a
    /// person, in a stable order.
    async fn fetch_unreconciled_transactions(
        &self,
        user_id: &str,
    ) -> Result<Vec<BankTransaction>, AppError>;

    /// All chart-of-accounts entries with active status.
    async fn fetch_active_accounts(&self) -> Result<Vec<ChartOfAccountsEntry>, AppError>;

    /// Write the classification fields of one transaction. Returns `false`
    /// when no row matched.
    async fn update_classification(
        &self,
        transaction_id: &str,
        update: &ClassificationUpdate,
    ) -> Result<bool, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

#[derive(Debug, Clone)]
struct StoredTransaction {
    transaction: BankTransaction,
    classification: Option<ClassificationUpdate>,
}

#[derive(Default)]
struct MemoryState {
    transactions: Vec<StoredTransaction>,
    accounts: Vec<ChartOfAccountsEntry>,
    failing_updates: HashSet<String>,
    fail_transaction_fetch: bool,
    fail_account_fetch: bool,
}

/// In-process store with failure injection.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    transaction_fetches: AtomicUsize,
    account_fetches: AtomicUsize,
    update_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_transaction(&self, transaction: BankTransaction) {
        self.with_state(|s| {
            s.transactions.push(StoredTransaction {
                transaction,
                classification: None,
            })
        });
    }

    pub fn insert_account(&self, account: ChartOfAccountsEntry) {
        self.with_state(|s| s.accounts.push(account));
    }

    /// Make every write to `transaction_id` fail with a database error.
    pub fn fail_updates_for(&self, transaction_id: &str) {
        self.with_state(|s| {
            s.failing_updates.insert(transaction_id.to_string());
        });
    }

    pub fn fail_transaction_fetch(&self, fail: bool) {
        self.with_state(|s| s.fail_transaction_fetch = fail);
    }

    pub fn fail_account_fetch(&self, fail: bool) {
        self.with_state(|s| s.fail_account_fetch = fail);
    }

    /// Mark a row as classified by a person, as the UI would.
    pub fn set_attribution(&self, transaction_id: &str, attribution: Attribution) {
        self.with_state(|s| {
            if let Some(row) = s
                .transactions
                .iter_mut()
                .find(|t| t.transaction.id == transaction_id)
            {
                row.transaction.coa_set_by = Some(attribution.as_str().to_string());
            }
        });
    }

    pub fn classification_of(&self, transaction_id: &str) -> Option<ClassificationUpdate> {
        self.with_state(|s| {
            s.transactions
                .iter()
                .find(|t| t.transaction.id == transaction_id)
                .and_then(|t| t.classification.clone())
        })
    }

    pub fn classifications(&self) -> HashMap<String, ClassificationUpdate> {
        self.with_state(|s| {
            s.transactions
                .iter()
                .filter_map(|t| {
                    t.classification
                        .clone()
                        .map(|c| (t.transaction.id.clone(), c))
                })
                .collect()
        })
    }

    pub fn transaction_fetches(&self) -> usize {
        self.transaction_fetches.load(Ordering::SeqCst)
    }

    pub fn account_fetches(&self) -> usize {
        self.account_fetches.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn fetch_unreconciled_transactions(
        &self,
        user_id: &str,
    ) -> Result<Vec<BankTransaction>, AppError> {
        self.transaction_fetches.fetch_add(1, Ordering::SeqCst);
        self.with_state(|s| {
            if s.fail_transaction_fetch {
                return Err(AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to fetch transactions: store unavailable"
                )));
            }
            let mut rows: Vec<BankTransaction> = s
                .transactions
                .iter()
                .filter(|t| t.transaction.user_id == user_id)
                .map(|t| t.transaction.clone())
                .filter(BankTransaction::awaits_reconciliation)
                .collect();
            rows.sort_by(|a, b| a.created_utc.cmp(&b.created_utc).then(a.id.cmp(&b.id)));
            Ok(rows)
        })
    }

    async fn fetch_active_accounts(&self) -> Result<Vec<ChartOfAccountsEntry>, AppError> {
        self.account_fetches.fetch_add(1, Ordering::SeqCst);
        self.with_state(|s| {
            if s.fail_account_fetch {
                return Err(AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to fetch chart of accounts: store unavailable"
                )));
            }
            Ok(s.accounts.iter().filter(|a| a.is_active()).cloned().collect())
        })
    }

    async fn update_classification(
        &self,
        transaction_id: &str,
        update: &ClassificationUpdate,
    ) -> Result<bool, AppError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.with_state(|s| {
            if s.failing_updates.contains(transaction_id) {
                return Err(AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to update transaction {}",
                    transaction_id
                )));
            }
            match s
                .transactions
                .iter_mut()
                .find(|t| t.transaction.id == transaction_id)
            {
                Some(row) => {
                    row.transaction.coa_set_by = Some(update.set_by.as_str().to_string());
                    row.classification = Some(update.clone());
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}
