//! The reconciliation pipeline.
//!
//! One run walks `Fetching → LoadingAccounts → Grouping → Classifying →
//! Mapping → Persisting → Done`. An empty fetch ends the run early; fetch and
//! chart failures abort it. Batch and row failures are absorbed and only show
//! up in the report, logs and metrics.

pub mod accounts;
pub mod classifier;
pub mod fetcher;
pub mod grouper;
pub mod guard;
pub mod mapper;
pub mod persister;
pub mod prompt;
pub mod rate_limit;
pub mod response;

pub use classifier::{ClassificationRun, TransactionClassifier};
pub use guard::{RunGuard, RunRegistry};
pub use prompt::BusinessContext;
pub use rate_limit::MinIntervalLimiter;
pub use response::ClassificationParseError;

use crate::models::{PersistTally, ReconciliationReport};
use crate::services::metrics;
use crate::services::providers::TextProvider;
use crate::services::store::TransactionStore;
use chrono::Utc;
use service_core::error::AppError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Default number of groups sent to the model per call.
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Default minimum spacing between model calls.
pub const DEFAULT_MIN_CALL_INTERVAL: Duration = Duration::from_secs(2);

/// Errors that abort a run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("User id must not be blank")]
    InvalidUser,

    #[error("A reconciliation run is already in progress for user {0}")]
    AlreadyRunning(String),

    #[error("Failed to fetch transactions: {0}")]
    FetchTransactions(#[source] AppError),

    #[error("Failed to load chart of accounts: {0}")]
    LoadAccounts(#[source] AppError),

    #[error("Chart of accounts has no active entries")]
    NoActiveAccounts,
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidUser => AppError::BadRequest(anyhow::anyhow!(err.to_string())),
            PipelineError::AlreadyRunning(_) => AppError::Conflict(anyhow::anyhow!(err.to_string())),
            PipelineError::FetchTransactions(_) | PipelineError::LoadAccounts(_) => {
                AppError::DatabaseError(anyhow::anyhow!(err.to_string()))
            }
            PipelineError::NoActiveAccounts => AppError::InternalError(anyhow::anyhow!(err.to_string())),
        }
    }
}

/// Stage markers used in run logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Fetching,
    LoadingAccounts,
    Grouping,
    Classifying,
    Mapping,
    Persisting,
    Done,
    Aborted,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetching => "FETCHING",
            Self::LoadingAccounts => "LOADING_ACCOUNTS",
            Self::Grouping => "GROUPING",
            Self::Classifying => "CLASSIFYING",
            Self::Mapping => "MAPPING",
            Self::Persisting => "PERSISTING",
            Self::Done => "DONE",
            Self::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub batch_size: usize,
    pub min_call_interval: Duration,
    pub business_context: BusinessContext,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            min_call_interval: DEFAULT_MIN_CALL_INTERVAL,
            business_context: BusinessContext::default(),
        }
    }
}

/// Runs reconciliations against a store and a model provider.
///
/// The limiter is shared by every run of this pipeline, so calls from
/// concurrent runs for different users are spaced too.
#[derive(Clone)]
pub struct ReconciliationPipeline {
    store: Arc<dyn TransactionStore>,
    provider: Arc<dyn TextProvider>,
    settings: PipelineSettings,
    limiter: Arc<Mutex<MinIntervalLimiter>>,
    runs: RunRegistry,
}

impl ReconciliationPipeline {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        provider: Arc<dyn TextProvider>,
        settings: PipelineSettings,
    ) -> Self {
        let limiter = MinIntervalLimiter::new(settings.min_call_interval);
        Self {
            store,
            provider,
            settings,
            limiter: Arc::new(Mutex::new(limiter)),
            runs: RunRegistry::new(),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn run_registry(&self) -> &RunRegistry {
        &self.runs
    }

    pub fn store(&self) -> &Arc<dyn TransactionStore> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn TextProvider> {
        &self.provider
    }

    fn classifier(&self) -> TransactionClassifier {
        TransactionClassifier::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.limiter),
            self.settings.business_context.clone(),
            self.settings.batch_size,
        )
    }

    /// Reconciles every pending transaction of `user_id`.
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn run(&self, user_id: &str) -> Result<ReconciliationReport, PipelineError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(PipelineError::InvalidUser);
        }

        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        let _guard = self.runs.try_acquire(user_id, run_id).ok_or_else(|| {
            warn!(user_id = %user_id, "Reconciliation already running for user");
            metrics::record_run("conflict");
            PipelineError::AlreadyRunning(user_id.to_string())
        })?;

        let result = self.execute(user_id, run_id).await;
        match &result {
            Ok(report) if report.transactions == 0 => metrics::record_run("empty"),
            Ok(_) => metrics::record_run("completed"),
            Err(e) => {
                warn!(stage = %RunStage::Aborted, error = %e, "Reconciliation run aborted");
                metrics::record_run("aborted");
            }
        }
        result
    }

    async fn execute(
        &self,
        user_id: &str,
        run_id: Uuid,
    ) -> Result<ReconciliationReport, PipelineError> {
        let started_utc = Utc::now();
        info!(stage = %RunStage::Fetching, user_id = %user_id, "Starting reconciliation run");

        let transactions = fetcher::fetch_prepared_transactions(self.store.as_ref(), user_id)
            .await
            .map_err(PipelineError::FetchTransactions)?;

        if transactions.is_empty() {
            info!(stage = %RunStage::Done, "No transactions to reconcile");
            return Ok(ReconciliationReport {
                run_id,
                user_id: user_id.to_string(),
                transactions: 0,
                groups: 0,
                batches: 0,
                failed_batches: 0,
                tally: PersistTally::default(),
                started_utc,
                completed_utc: Utc::now(),
                results: Vec::new(),
            });
        }

        info!(stage = %RunStage::LoadingAccounts, transactions = transactions.len(), "Loading chart of accounts");
        let chart = accounts::load_chart_snapshot(self.store.as_ref()).await?;

        let groups = grouper::group_transactions(&transactions);
        info!(stage = %RunStage::Grouping, groups = groups.len(), "Grouped transactions by remittance");

        let classifier = self.classifier();
        info!(
            stage = %RunStage::Classifying,
            batch_size = classifier.batch_size(),
            provider = self.provider.name(),
            "Classifying transaction groups"
        );
        let run = classifier.classify_groups(&groups, &chart.candidates).await;

        info!(stage = %RunStage::Mapping, "Mapping classifications to accounts");
        let mut results =
            mapper::map_results(&transactions, &groups, &run.classifications, &chart);

        info!(stage = %RunStage::Persisting, rows = results.len(), "Persisting results");
        let tally = persister::persist_results(self.store.as_ref(), &mut results).await;

        let report = ReconciliationReport {
            run_id,
            user_id: user_id.to_string(),
            transactions: transactions.len(),
            groups: groups.len(),
            batches: run.batches,
            failed_batches: run.failed_batches,
            tally,
            started_utc,
            completed_utc: Utc::now(),
            results,
        };

        info!(
            stage = %RunStage::Done,
            transactions = report.transactions,
            groups = report.groups,
            batches = report.batches,
            failed_batches = report.failed_batches,
            updated = report.tally.updated,
            skipped = report.tally.skipped,
            failed = report.tally.failed,
            "Reconciliation run completed"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn pipeline_errors_map_to_http_statuses() {
        let cases = [
            (PipelineError::InvalidUser, StatusCode::BAD_REQUEST),
            (
                PipelineError::AlreadyRunning("u1".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                PipelineError::FetchTransactions(AppError::DatabaseError(anyhow::anyhow!("down"))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                PipelineError::NoActiveAccounts,
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }

    #[test]
    fn stage_names_match_run_log_vocabulary() {
        assert_eq!(RunStage::LoadingAccounts.to_string(), "LOADING_ACCOUNTS");
        assert_eq!(RunStage::Done.to_string(), "DONE");
    }
}
