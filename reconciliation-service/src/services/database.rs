//! Database service for reconciliation-service.

use crate::models::{
    Attribution, BankTransaction, ChartOfAccountsEntry, ClassificationUpdate,
    ACTIVE_ACCOUNT_STATUS,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::TransactionStore;
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "reconciliation-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for Database {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn fetch_unreconciled_transactions(
        &self,
        user_id: &str,
    ) -> Result<Vec<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["fetch_unreconciled_transactions"])
            .start_timer();

        let transactions = sqlx::query_as::<_, BankTransaction>(
            r#"
            SELECT t.id, t.user_id, t.creditor_name, t.debtor_name, t.amount, t.currency,
                   t.remittance_info, t.coa_set_by, e.enriched_data AS enrichment, t.created_utc
            FROM bank_transactions t
            LEFT JOIN transaction_enrichments e ON e.transaction_id = t.id
            WHERE t.user_id = $1
              AND (t.coa_set_by IS NULL OR t.coa_set_by NOT IN ($2, $3))
            ORDER BY t.created_utc, t.id
            "#,
        )
        .bind(user_id)
        .bind(Attribution::Ai.as_str())
        .bind(Attribution::User.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch transactions: {}", e))
        })?;

        timer.observe_duration();
        info!(count = transactions.len(), "Fetched unreconciled transactions");

        Ok(transactions)
    }

    #[instrument(skip(self))]
    async fn fetch_active_accounts(&self) -> Result<Vec<ChartOfAccountsEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["fetch_active_accounts"])
            .start_timer();

        let accounts = sqlx::query_as::<_, ChartOfAccountsEntry>(
            r#"
            SELECT account_id, code, name, account_type, account_class, description, status
            FROM chart_of_accounts
            WHERE status = $1
            ORDER BY code
            "#,
        )
        .bind(ACTIVE_ACCOUNT_STATUS)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch chart of accounts: {}", e))
        })?;

        timer.observe_duration();
        info!(count = accounts.len(), "Loaded active chart of accounts");

        Ok(accounts)
    }

    #[instrument(skip(self, update), fields(transaction_id = %transaction_id, account_id = %update.account_id))]
    async fn update_classification(
        &self,
        transaction_id: &str,
        update: &ClassificationUpdate,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_classification"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE bank_transactions
            SET chart_of_accounts = $2,
                coa_reason = $3,
                coa_confidence = $4,
                coa_set_by = $5,
                updated_utc = NOW()
            WHERE id = $1
            "#,
        )
        .bind(transaction_id)
        .bind(update.account_id)
        .bind(&update.reason)
        .bind(update.confidence)
        .bind(update.set_by.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update transaction: {}", e))
        })?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    /// Check database health.
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }
}
