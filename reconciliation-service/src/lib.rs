//! Reconciliation Service - LLM-assisted chart-of-accounts classification of
//! bank transactions.

pub mod config;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod startup;
