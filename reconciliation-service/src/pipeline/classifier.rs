//! Rate-limited batch classification of transaction groups.

use super::prompt::{build_user_prompt, BusinessContext, SYSTEM_PROMPT};
use super::rate_limit::MinIntervalLimiter;
use super::response::{parse_classifications, RawClassification};
use crate::models::{AccountCandidate, Classification, TransactionGroup};
use crate::services::metrics;
use crate::services::providers::{GenerationParams, TextProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Reason recorded for groups the model left out of its answer.
const MISSING_CLASSIFICATION: &str = "no classification returned";

/// Classifications for a sequence of groups, in group order.
#[derive(Debug, Clone, Default)]
pub struct ClassificationRun {
    pub classifications: Vec<Classification>,
    pub batches: usize,
    pub failed_batches: usize,
}

/// Result of classifying one batch. `error` is set when the whole batch
/// collapsed to ERROR sentinels.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub classifications: Vec<Classification>,
    pub error: Option<String>,
}

pub struct TransactionClassifier {
    provider: Arc<dyn TextProvider>,
    limiter: Arc<Mutex<MinIntervalLimiter>>,
    context: BusinessContext,
    batch_size: usize,
    params: GenerationParams,
}

impl TransactionClassifier {
    pub fn new(
        provider: Arc<dyn TextProvider>,
        limiter: Arc<Mutex<MinIntervalLimiter>>,
        context: BusinessContext,
        batch_size: usize,
    ) -> Self {
        Self {
            provider,
            limiter,
            context,
            batch_size: batch_size.max(1),
            params: GenerationParams {
                temperature: Some(0.1),
                max_tokens: None,
                json_output: true,
            },
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Classifies `groups` in sequential batches. A failing batch never stops
    /// the batches after it.
    pub async fn classify_groups(
        &self,
        groups: &[TransactionGroup],
        accounts: &[AccountCandidate],
    ) -> ClassificationRun {
        let total_batches = groups.len().div_ceil(self.batch_size);
        let mut run = ClassificationRun {
            classifications: Vec::with_capacity(groups.len()),
            ..Default::default()
        };

        for (index, batch) in groups.chunks(self.batch_size).enumerate() {
            info!(
                batch = index + 1,
                total_batches = total_batches,
                groups = batch.len(),
                "Classifying batch"
            );

            let outcome = self.classify_batch(batch, accounts).await;
            run.batches += 1;
            if outcome.error.is_some() {
                run.failed_batches += 1;
            }
            run.classifications.extend(outcome.classifications);
        }

        run
    }

    /// One LLM call for one batch. Always returns exactly one classification
    /// per group.
    pub async fn classify_batch(
        &self,
        groups: &[TransactionGroup],
        accounts: &[AccountCandidate],
    ) -> BatchOutcome {
        let prompt = build_user_prompt(&self.context, groups, accounts);
        debug!(prompt_len = prompt.len(), "Built classification prompt");

        self.limiter.lock().await.wait().await;

        let provider = self.provider.name();
        let started = Instant::now();
        let response = self.provider.generate(SYSTEM_PROMPT, &prompt, &self.params).await;
        let elapsed = started.elapsed().as_secs_f64();

        let response = match response {
            Ok(response) => {
                metrics::record_llm_call(provider, "success", elapsed);
                response
            }
            Err(e) => {
                metrics::record_llm_call(provider, "error", elapsed);
                error!(provider = provider, error = %e, "Batch classification failed");
                return Self::failed_batch(groups.len(), e.to_string());
            }
        };

        debug!(
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "LLM response received"
        );

        match parse_classifications(response.text.as_deref()) {
            Ok(raw) => {
                metrics::record_batch("ok");
                BatchOutcome {
                    classifications: align(raw, groups.len()),
                    error: None,
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to parse classification response");
                Self::failed_batch(groups.len(), e.to_string())
            }
        }
    }

    fn failed_batch(len: usize, reason: String) -> BatchOutcome {
        metrics::record_batch("error");
        BatchOutcome {
            classifications: vec![Classification::error(&reason); len],
            error: Some(reason),
        }
    }
}

/// Zips sorted classifications onto group order, padding missing trailing
/// entries with ERROR sentinels and dropping surplus ones.
fn align(raw: Vec<RawClassification>, expected: usize) -> Vec<Classification> {
    if raw.len() > expected {
        warn!(
            expected = expected,
            received = raw.len(),
            "Ignoring surplus classifications"
        );
    } else if raw.len() < expected {
        warn!(
            expected = expected,
            received = raw.len(),
            "Model returned fewer classifications than groups"
        );
    }

    let mut classifications: Vec<Classification> = raw
        .into_iter()
        .take(expected)
        .map(|c| Classification {
            account: c.account.trim().to_string(),
            reasoning: c.reasoning,
            confidence: clamp_confidence(c.confidence),
        })
        .collect();
    classifications.resize_with(expected, || Classification::error(MISSING_CLASSIFICATION));
    classifications
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
