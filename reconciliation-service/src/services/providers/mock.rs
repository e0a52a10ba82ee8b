//! Mock provider for tests and dry runs.

use super::{FinishReason, GenerationParams, ProviderError, ProviderResponse, TextProvider};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Response used when nothing was scripted: no classifications at all.
const EMPTY_CLASSIFICATIONS: &str = r#"{"classifications": []}"#;

/// One recorded call to the mock.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub index: usize,
    pub at: Instant,
    pub system: String,
    pub prompt: String,
}

type Responder = dyn Fn(&MockCall) -> Result<String, ProviderError> + Send + Sync;

/// Mock text provider. Answers come from, in order: the scripted queue, the
/// responder function, or an empty classification document.
pub struct MockTextProvider {
    enabled: bool,
    scripted: Mutex<VecDeque<Result<String, ProviderError>>>,
    responder: Option<Box<Responder>>,
    latency: Duration,
    calls: Mutex<Vec<MockCall>>,
}

impl MockTextProvider {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            scripted: Mutex::new(VecDeque::new()),
            responder: None,
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replies with `responses` in order, one per call.
    pub fn scripted(responses: Vec<Result<String, ProviderError>>) -> Self {
        let provider = Self::new(true);
        *provider.lock_scripted() = responses.into();
        provider
    }

    /// Replies by calling `f` with the recorded call.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&MockCall) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(f)),
            ..Self::new(true)
        }
    }

    /// Simulated time spent inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_scripted(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, ProviderError>>> {
        self.scripted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, system: &str, prompt: &str) -> MockCall {
        let mut calls = self
            .calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let call = MockCall {
            index: calls.len(),
            at: Instant::now(),
            system: system.to_string(),
            prompt: prompt.to_string(),
        };
        calls.push(call.clone());
        call
    }
}

#[async_trait]
impl TextProvider for MockTextProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        if !self.enabled {
            return Err(ProviderError::NotConfigured(
                "Mock text provider not enabled".to_string(),
            ));
        }

        let call = self.record(system, prompt);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = self.lock_scripted().pop_front();
        let text = match (scripted, &self.responder) {
            (Some(response), _) => response?,
            (None, Some(responder)) => responder(&call)?,
            (None, None) => EMPTY_CLASSIFICATIONS.to_string(),
        };

        Ok(ProviderResponse {
            input_tokens: prompt.len() as i32 / 4,
            output_tokens: text.len() as i32 / 4,
            text: Some(text),
            finish_reason: FinishReason::Complete,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.enabled {
            Ok(())
        } else {
            Err(ProviderError::NotConfigured(
                "Mock text provider not enabled".to_string(),
            ))
        }
    }
}
