//! Credential rotation around a [`TextGenerator`].

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::credential::{CallAttempt, CallOutcome};
use crate::generation::{GenerationError, GenerationRequest, TextGenerator};
use crate::pool::CredentialPool;

/// Generated text plus how it was obtained.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub request_id: String,
    pub text: String,
    pub credential_id: String,
    pub model: String,
    pub attempts: Vec<CallAttempt>,
    /// True when at least one credential failed before this one answered.
    pub degraded: bool,
    pub warnings: Vec<String>,
    pub latency_ms: u64,
}

/// Why a generation request produced no text.
#[derive(Debug, Error)]
pub enum FailoverError {
    /// A failure rotation cannot fix. Surfaced on the attempt that saw it.
    #[error("generation failed: {error}")]
    NonRetryable {
        error: GenerationError,
        attempts: Vec<CallAttempt>,
    },

    /// Every attempt within the bound failed retryably.
    #[error("all {} API key-model combination(s) exhausted; last error: {last}", .attempts.len())]
    AggregateFailure {
        last: GenerationError,
        attempts: Vec<CallAttempt>,
    },
}

impl FailoverError {
    pub fn attempts(&self) -> &[CallAttempt] {
        match self {
            Self::NonRetryable { attempts, .. } | Self::AggregateFailure { attempts, .. } => {
                attempts
            }
        }
    }

    pub fn last_error(&self) -> &GenerationError {
        match self {
            Self::NonRetryable { error, .. } => error,
            Self::AggregateFailure { last, .. } => last,
        }
    }
}

/// Sends each request through the pool's best credential, rotating on
/// retryable failures.
#[derive(Clone)]
pub struct FailoverClient {
    pool: Arc<CredentialPool>,
    generator: Arc<dyn TextGenerator>,
}

impl FailoverClient {
    pub fn new(pool: Arc<CredentialPool>, generator: Arc<dyn TextGenerator>) -> Self {
        Self { pool, generator }
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    /// Generate text in at most as many attempts as there are pooled credentials.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome, FailoverError> {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let bound = self.pool.len();
        let mut tried: Vec<String> = Vec::with_capacity(bound);
        let mut attempts: Vec<CallAttempt> = Vec::with_capacity(bound);
        let mut last_error = None;

        for attempt_number in 1..=bound {
            let credential = self.pool.next_candidate_excluding(&tried);
            tried.push(credential.id().to_string());

            match self.generator.generate(&credential, request).await {
                Ok(text) => {
                    attempts.push(self.pool.record_result(&credential, &CallOutcome::Success));
                    let degraded = attempts.len() > 1;
                    self.pool.record_request(true, degraded);

                    let mut warnings = Vec::new();
                    if degraded {
                        let message = format!(
                            "credential failover succeeded with '{}' after {} failed attempt(s)",
                            credential.id(),
                            attempts.len() - 1
                        );
                        info!(
                            request_id = %request_id,
                            credential = credential.id(),
                            attempt = attempt_number,
                            "{message}"
                        );
                        warnings.push(message);
                    }

                    return Ok(GenerationOutcome {
                        request_id,
                        text,
                        credential_id: credential.id().to_string(),
                        model: credential.model().to_string(),
                        attempts,
                        degraded,
                        warnings,
                        latency_ms: elapsed_ms(started),
                    });
                }
                Err(error) => {
                    attempts.push(
                        self.pool
                            .record_result(&credential, &CallOutcome::failure(&error)),
                    );
                    warn!(
                        request_id = %request_id,
                        credential = credential.id(),
                        model = credential.model(),
                        attempt = attempt_number,
                        kind = error.kind().as_str(),
                        retryable = error.retryable(),
                        "generation attempt failed"
                    );

                    if !error.retryable() {
                        self.pool.record_request(false, attempts.len() > 1);
                        return Err(FailoverError::NonRetryable { error, attempts });
                    }
                    last_error = Some(error);
                }
            }
        }

        self.pool.record_request(false, attempts.len() > 1);
        let last = last_error
            .unwrap_or_else(|| GenerationError::transient("no credential attempts were made"));
        warn!(
            request_id = %request_id,
            attempts = attempts.len(),
            "all credentials exhausted"
        );
        Err(FailoverError::AggregateFailure { last, attempts })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
