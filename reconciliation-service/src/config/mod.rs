//! Configuration module for reconciliation-service.

use crate::pipeline::{BusinessContext, PipelineSettings, DEFAULT_BATCH_SIZE};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub store: StoreBackend,
    pub database: Option<DatabaseConfig>,
    pub llm: LlmConfig,
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "Unknown STORE_BACKEND '{}', expected postgres or memory",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderKind {
    OpenAi,
    Gemini,
    Mock,
}

impl LlmProviderKind {
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o",
            Self::Gemini => "gemini-2.0-flash",
            Self::Mock => "mock",
        }
    }
}

impl FromStr for LlmProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "mock" => Ok(Self::Mock),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "Unknown LLM_PROVIDER '{}', expected openai, gemini or mock",
                other
            ))),
        }
    }
}

#[derive(Clone)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub batch_size: usize,
    pub min_call_interval: Duration,
    pub company_name: String,
    pub company_description: String,
    pub directors: Vec<String>,
    pub shareholders: Vec<String>,
    pub employees: Vec<String>,
}

impl ReconcileConfig {
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            batch_size: self.batch_size,
            min_call_interval: self.min_call_interval,
            business_context: BusinessContext::new(
                self.company_name.clone(),
                self.company_description.clone(),
            )
            .with_personnel(
                self.directors.clone(),
                self.shareholders.clone(),
                self.employees.clone(),
            ),
        }
    }
}

impl ReconciliationConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_vars(common, |key| env::var(key).ok())
    }

    /// Builds the service settings from `lookup`, which returns the value of
    /// an environment variable.
    pub fn from_vars<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parse_or = |key: &str, default: u64| -> Result<u64, AppError> {
            match get(key) {
                Some(v) => v.trim().parse().map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("{} must be a number, got '{}'", key, v))
                }),
                None => Ok(default),
            }
        };
        let parse_u32_or = |key: &str, default: u32| -> Result<u32, AppError> {
            let value = parse_or(key, u64::from(default))?;
            u32::try_from(value).map_err(|_| {
                AppError::ConfigError(anyhow::anyhow!("{} is out of range, got {}", key, value))
            })
        };
        let names = |key: &str| -> Vec<String> {
            get(key)
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };

        let store: StoreBackend = match get("STORE_BACKEND") {
            Some(v) => v.parse()?,
            None => StoreBackend::Postgres,
        };

        let database = match store {
            StoreBackend::Postgres => Some(DatabaseConfig {
                url: get("DATABASE_URL").ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: parse_u32_or("DATABASE_MAX_CONNECTIONS", 10)?,
                min_connections: parse_u32_or("DATABASE_MIN_CONNECTIONS", 2)?,
            }),
            StoreBackend::Memory => None,
        };

        let provider: LlmProviderKind = match get("LLM_PROVIDER") {
            Some(v) => v.parse()?,
            None => LlmProviderKind::OpenAi,
        };
        let api_key = get("LLM_API_KEY").unwrap_or_default();
        if provider != LlmProviderKind::Mock && api_key.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "LLM_API_KEY is required for the {:?} provider",
                provider
            )));
        }

        let batch_size = parse_or("RECONCILE_BATCH_SIZE", DEFAULT_BATCH_SIZE as u64)? as usize;
        if batch_size == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RECONCILE_BATCH_SIZE must be at least 1"
            )));
        }

        Ok(Self {
            common,
            service_name: get("SERVICE_NAME")
                .unwrap_or_else(|| "reconciliation-service".to_string()),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            otlp_endpoint: get("OTLP_ENDPOINT"),
            store,
            database,
            llm: LlmConfig {
                provider,
                model: get("LLM_MODEL").unwrap_or_else(|| provider.default_model().to_string()),
                api_key,
                base_url: get("LLM_BASE_URL"),
                timeout: Duration::from_secs(parse_or("LLM_TIMEOUT_SECS", 120)?),
            },
            reconcile: ReconcileConfig {
                batch_size,
                min_call_interval: Duration::from_millis(parse_or(
                    "RECONCILE_MIN_CALL_INTERVAL_MS",
                    2000,
                )?),
                company_name: get("RECONCILE_COMPANY_NAME").unwrap_or_default(),
                company_description: get("RECONCILE_COMPANY_DESCRIPTION").unwrap_or_default(),
                directors: names("RECONCILE_DIRECTORS"),
                shareholders: names("RECONCILE_SHAREHOLDERS"),
                employees: names("RECONCILE_EMPLOYEES"),
            },
        })
    }
}
