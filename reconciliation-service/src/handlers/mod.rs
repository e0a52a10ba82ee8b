//! HTTP handlers for reconciliation-service.

pub mod health;
pub mod reconcile;

pub use health::{health_check, metrics_handler, readiness_check};
pub use reconcile::reconcile_user;
