//! Text generation contract and the Gemini REST backend.
//!
//! A [`TextGenerator`] performs exactly one call with one credential and
//! reports a classified [`GenerationError`] on failure. Rotation across
//! credentials is the failover client's job, not the generator's.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::credential::Credential;
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const MAX_ERROR_DETAIL_CHARS: usize = 300;

/// Classification of a failed generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationErrorKind {
    QuotaExceeded,
    RateLimited,
    AuthFailure,
    TransientNetwork,
    ModelNotFound,
    MalformedRequest,
}

impl GenerationErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QuotaExceeded => "quota_exceeded",
            Self::RateLimited => "rate_limited",
            Self::AuthFailure => "auth_failure",
            Self::TransientNetwork => "transient_network",
            Self::ModelNotFound => "model_not_found",
            Self::MalformedRequest => "malformed_request",
        }
    }

    /// Whether another credential might succeed where this one failed.
    pub const fn retryable(self) -> bool {
        matches!(
            self,
            Self::QuotaExceeded | Self::RateLimited | Self::TransientNetwork | Self::ModelNotFound
        )
    }
}

impl Display for GenerationErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured generation error used by failover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationError {
    kind: GenerationErrorKind,
    message: String,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::QuotaExceeded, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::RateLimited, message)
    }

    pub fn auth_failure(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::AuthFailure, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::TransientNetwork, message)
    }

    pub fn model_not_found(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::ModelNotFound, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::MalformedRequest, message)
    }

    pub const fn kind(&self) -> GenerationErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.kind.retryable()
    }
}

impl Display for GenerationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl std::error::Error for GenerationError {}

/// A single prompt plus sampling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: 0.3,
            max_output_tokens: 500,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }
}

/// One generate-text call with one credential.
pub trait TextGenerator: Send + Sync {
    fn generate<'a>(
        &'a self,
        credential: &'a Credential,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, GenerationError>> + Send + 'a>>;
}

/// Gemini `models/{model}:generateContent` backend.
#[derive(Clone)]
pub struct GeminiGenerator {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    timeout_ms: u64,
}

impl GeminiGenerator {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            base_url: String::from(DEFAULT_GEMINI_BASE_URL),
            timeout_ms: 30_000,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn endpoint_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url,
            urlencoding::encode(model)
        )
    }

    fn build_request(&self, credential: &Credential, request: &GenerationRequest) -> HttpRequest {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }],
            }],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_output_tokens,
            },
        });

        HttpRequest::post(self.endpoint_url(credential.model()))
            .with_header("x-goog-api-key", credential.api_key().expose())
            .with_json(&body)
            .with_timeout_ms(self.timeout_ms)
    }
}

impl TextGenerator for GeminiGenerator {
    fn generate<'a>(
        &'a self,
        credential: &'a Credential,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, GenerationError>> + Send + 'a>> {
        Box::pin(async move {
            let http_request = self.build_request(credential, request);
            let response = self.http_client.execute(http_request).await.map_err(|error| {
                if error.retryable() {
                    GenerationError::transient(format!("transport error: {}", error.message()))
                } else {
                    GenerationError::malformed(format!("transport error: {}", error.message()))
                }
            })?;

            parse_generate_response(&response)
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseCandidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Turn a raw HTTP response into generated text or a classified error.
pub fn parse_generate_response(response: &HttpResponse) -> Result<String, GenerationError> {
    if !response.is_success() {
        return Err(classify_http_failure(response.status, &response.body));
    }

    let parsed: GenerateContentResponse = serde_json::from_str(&response.body).map_err(|error| {
        GenerationError::transient(format!("unreadable response body: {error}"))
    })?;

    let text: String = parsed
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = parsed
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
            .or_else(|| {
                parsed
                    .candidates
                    .first()
                    .and_then(|candidate| candidate.finish_reason.clone())
            })
            .unwrap_or_else(|| String::from("no candidates"));
        return Err(GenerationError::malformed(format!(
            "response contained no text ({reason})"
        )));
    }

    Ok(text)
}

/// Map a non-2xx status and body to an error classification.
pub fn classify_http_failure(status: u16, body: &str) -> GenerationError {
    let detail = error_detail(body);
    let lowered = detail.to_lowercase();
    let message = format!("HTTP {status}: {detail}");

    match status {
        429 if mentions_quota(&lowered) => GenerationError::quota_exceeded(message),
        429 => GenerationError::rate_limited(message),
        401 | 403 => GenerationError::auth_failure(message),
        400 if mentions_invalid_key(&lowered) => GenerationError::auth_failure(message),
        404 => GenerationError::model_not_found(message),
        400..=499 => GenerationError::malformed(message),
        _ => GenerationError::transient(message),
    }
}

fn error_detail(body: &str) -> String {
    let detail = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if envelope.error.status.is_empty() => envelope.error.message,
        Ok(envelope) => format!("{} {}", envelope.error.status, envelope.error.message),
        Err(_) => body.trim().to_string(),
    };
    truncate_chars(detail.trim(), MAX_ERROR_DETAIL_CHARS)
}

fn mentions_quota(lowered: &str) -> bool {
    ["quota", "resource exhausted", "resource_exhausted"]
        .iter()
        .any(|needle| lowered.contains(needle))
}

fn mentions_invalid_key(lowered: &str) -> bool {
    ["api key", "api_key", "invalid key", "unauthorized", "authentication"]
        .iter()
        .any(|needle| lowered.contains(needle))
}

fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((index, _)) => format!("{}...", &value[..index]),
        None => value.to_string(),
    }
}
