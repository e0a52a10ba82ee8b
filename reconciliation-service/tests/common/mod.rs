//! Common test utilities for reconciliation-service integration tests.

#![allow(dead_code)]

use chrono::{Duration, TimeZone, Utc};
use reconciliation_service::config::ReconciliationConfig;
use reconciliation_service::models::{BankTransaction, ChartOfAccountsEntry};
use reconciliation_service::pipeline::{BusinessContext, PipelineSettings, ReconciliationPipeline};
use reconciliation_service::services::providers::mock::MockTextProvider;
use reconciliation_service::services::MemoryStore;
use reconciliation_service::startup::Application;
use serde_json::{json, Value};
use service_core::config::Config as CommonConfig;
use std::collections::HashMap;
use std::sync::{Arc, Once};

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,reconciliation_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A pending outgoing transaction created `seq` seconds after a fixed epoch.
pub fn transaction(id: &str, user_id: &str, remittance: Option<&str>, amount: i64, seq: i64) -> BankTransaction {
    let epoch = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    BankTransaction {
        id: id.to_string(),
        user_id: user_id.to_string(),
        creditor_name: Some(format!("Payee {id}")),
        debtor_name: Some("Acme Ltd".to_string()),
        amount,
        currency: Some("GBP".to_string()),
        remittance_info: remittance.map(str::to_string),
        coa_set_by: None,
        enrichment: None,
        created_utc: epoch + Duration::seconds(seq),
    }
}

pub fn account(code: &str, name: &str) -> ChartOfAccountsEntry {
    ChartOfAccountsEntry {
        account_id: uuid::Uuid::new_v4(),
        code: code.to_string(),
        name: name.to_string(),
        account_type: "EXPENSE".to_string(),
        account_class: Some("EXPENSE".to_string()),
        description: None,
        status: "ACTIVE".to_string(),
    }
}

/// Store holding the NETFLIX/AWS example for `user_id` and its two accounts.
pub fn example_store(user_id: &str) -> (Arc<MemoryStore>, HashMap<String, uuid::Uuid>) {
    let store = Arc::new(MemoryStore::new());
    store.insert_transaction(transaction("t1", user_id, Some("NETFLIX"), -999, 0));
    store.insert_transaction(transaction("t2", user_id, Some("NETFLIX"), -999, 1));
    store.insert_transaction(transaction("t3", user_id, Some("AWS INVOICE"), -5000, 2));

    let mut ids = HashMap::new();
    for (code, name) in [("6020", "Software Subscriptions"), ("6030", "Cloud Hosting")] {
        let entry = account(code, name);
        ids.insert(code.to_string(), entry.account_id);
        store.insert_account(entry);
    }
    (store, ids)
}

/// The answer the example scenario expects for its two groups.
pub fn example_answer() -> String {
    json!({
        "classifications": [
            {"transaction_index": 0, "reasoning": "subscription", "account": "6020", "confidence": 0.9},
            {"transaction_index": 1, "reasoning": "hosting", "account": "6030", "confidence": 0.95}
        ]
    })
    .to_string()
}

pub fn settings(batch_size: usize, interval_ms: u64) -> PipelineSettings {
    PipelineSettings {
        batch_size,
        min_call_interval: std::time::Duration::from_millis(interval_ms),
        business_context: BusinessContext::new("Acme Ltd", "Software consultancy"),
    }
}

pub fn pipeline(
    store: Arc<MemoryStore>,
    provider: Arc<MockTextProvider>,
    settings: PipelineSettings,
) -> ReconciliationPipeline {
    init_tracing();
    ReconciliationPipeline::new(store, provider, settings)
}

/// The transactions embedded in a classification prompt.
pub fn prompt_transactions(prompt: &str) -> Vec<Value> {
    let start = prompt.find("Transactions:").expect("prompt has transactions") + "Transactions:".len();
    let end = prompt.find("chart of accounts:").expect("prompt has accounts");
    serde_json::from_str(prompt[start..end].trim()).expect("transactions are JSON")
}

/// Builds a response classifying every prompted group with `code_for`.
pub fn answer_with<F>(prompt: &str, code_for: F) -> String
where
    F: Fn(&Value) -> String,
{
    let classifications: Vec<Value> = prompt_transactions(prompt)
        .iter()
        .map(|t| {
            json!({
                "transaction_index": t["transaction_index"],
                "reasoning": format!("classified {}", t["remittance_info"]),
                "account": code_for(t),
                "confidence": 0.8
            })
        })
        .collect();
    json!({ "classifications": classifications }).to_string()
}

/// Test application wrapper.
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub store: Arc<MemoryStore>,
    pub pipeline: ReconciliationPipeline,
}

fn test_config() -> ReconciliationConfig {
    let vars: HashMap<&str, &str> = [
        ("SERVICE_NAME", "reconciliation-service-test"),
        ("LOG_LEVEL", "debug"),
        ("STORE_BACKEND", "memory"),
        ("LLM_PROVIDER", "mock"),
        ("RECONCILE_MIN_CALL_INTERVAL_MS", "0"),
    ]
    .into_iter()
    .collect();

    let common = CommonConfig {
        port: 0,
        ..Default::default()
    };
    ReconciliationConfig::from_vars(common, |key| vars.get(key).map(|v| v.to_string()))
        .expect("test configuration is valid")
}

/// Spawn the HTTP application over `store` and `provider` on a random port.
pub async fn spawn_app(store: Arc<MemoryStore>, provider: Arc<MockTextProvider>) -> TestApp {
    init_tracing();

    let app = Application::build_with(test_config(), store.clone(), provider)
        .await
        .expect("Failed to build application");

    let port = app.port();
    let pipeline = app.state().pipeline.clone();

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
        store,
        pipeline,
    }
}
