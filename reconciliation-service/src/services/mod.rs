//! Services module for reconciliation-service.

pub mod database;
pub mod metrics;
pub mod providers;
pub mod store;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
pub use providers::{GenerationParams, ProviderError, TextProvider};
pub use store::{MemoryStore, TransactionStore};
