//! Application startup and lifecycle management.

use crate::config::{LlmConfig, LlmProviderKind, ReconciliationConfig, StoreBackend};
use crate::handlers::{health_check, metrics_handler, readiness_check, reconcile_user};
use crate::pipeline::ReconciliationPipeline;
use crate::services::providers::gemini::{GeminiConfig, GeminiTextProvider};
use crate::services::providers::mock::MockTextProvider;
use crate::services::providers::openai::{OpenAiConfig, OpenAiTextProvider};
use crate::services::{init_metrics, Database, MemoryStore, TextProvider, TransactionStore};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware};
use service_core::observability::install_metrics_recorder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ReconciliationConfig>,
    pub pipeline: ReconciliationPipeline,
}

/// Builds the HTTP router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/users/:user_id/reconcile", post(reconcile_user))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: ReconciliationConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: ReconciliationConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(
        config: ReconciliationConfig,
        run_migrations: bool,
    ) -> Result<Self, AppError> {
        let store: Arc<dyn TransactionStore> = match (config.store, &config.database) {
            (StoreBackend::Memory, _) => {
                tracing::warn!("Using in-memory store - results are not persisted across restarts");
                Arc::new(MemoryStore::new())
            }
            (StoreBackend::Postgres, Some(database)) => {
                let db = Database::new(
                    &database.url,
                    database.max_connections,
                    database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    e
                })?;

                if run_migrations {
                    db.run_migrations().await.map_err(|e| {
                        tracing::error!(error = %e, "Failed to run migrations");
                        e
                    })?;
                }

                Arc::new(db)
            }
            (StoreBackend::Postgres, None) => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "PostgreSQL store selected without database settings"
                )))
            }
        };

        let provider = build_provider(&config.llm)?;

        Self::build_with(config, store, provider).await
    }

    /// Build the application over an existing store and provider.
    pub async fn build_with(
        config: ReconciliationConfig,
        store: Arc<dyn TransactionStore>,
        provider: Arc<dyn TextProvider>,
    ) -> Result<Self, AppError> {
        init_metrics();
        install_metrics_recorder();

        let pipeline =
            ReconciliationPipeline::new(store, provider, config.reconcile.pipeline_settings());

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            http_port = port,
            provider = pipeline.provider().name(),
            batch_size = pipeline.settings().batch_size,
            "Reconciliation service listener bound"
        );

        Ok(Self {
            port,
            listener,
            state: AppState {
                config: Arc::new(config),
                pipeline,
            },
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let app = router(self.state);

        tracing::info!(
            service = "reconciliation-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, app).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}

/// Creates the configured model provider.
pub fn build_provider(config: &LlmConfig) -> Result<Arc<dyn TextProvider>, AppError> {
    let provider: Arc<dyn TextProvider> = match config.provider {
        LlmProviderKind::OpenAi => Arc::new(
            OpenAiTextProvider::new(OpenAiConfig {
                api_key: config.api_key.clone(),
                model: config.model.clone(),
                base_url: config.base_url.clone(),
                timeout: config.timeout,
            })
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?,
        ),
        LlmProviderKind::Gemini => Arc::new(
            GeminiTextProvider::new(GeminiConfig {
                api_key: config.api_key.clone(),
                model: config.model.clone(),
                base_url: config.base_url.clone(),
                timeout: config.timeout,
            })
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?,
        ),
        LlmProviderKind::Mock => {
            tracing::warn!("Using mock LLM provider - every batch returns no classifications");
            Arc::new(MockTextProvider::new(true))
        }
    };

    tracing::info!(provider = provider.name(), model = %config.model, "LLM provider configured");
    Ok(provider)
}
