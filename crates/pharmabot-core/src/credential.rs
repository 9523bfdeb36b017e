//! Credentials and per-call attempt records.

use std::fmt::{Debug, Display, Formatter};

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::generation::{GenerationError, GenerationErrorKind};

/// API key that never renders its value through `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw secret, for the transport only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Debug for ApiKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

impl Display for ApiKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

/// One (API key, model) pair the pool can route a call through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    id: String,
    key_name: String,
    api_key: ApiKey,
    model: String,
}

impl Credential {
    /// Build a credential; its id is `{key_name}/{model}`.
    pub fn new(key_name: impl Into<String>, api_key: ApiKey, model: impl Into<String>) -> Self {
        let key_name = key_name.into();
        let model = normalize_model(model.into());
        Self {
            id: format!("{key_name}/{model}"),
            key_name,
            api_key,
            model,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    pub fn api_key(&self) -> &ApiKey {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Strip the `models/` resource prefix some configurations carry.
fn normalize_model(model: String) -> String {
    let trimmed = model.trim();
    trimmed
        .strip_prefix("models/")
        .unwrap_or(trimmed)
        .to_string()
}

/// Outcome of one generation call, as fed back into the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure {
        kind: GenerationErrorKind,
        message: String,
    },
}

impl CallOutcome {
    pub fn failure(error: &GenerationError) -> Self {
        Self::Failure {
            kind: error.kind(),
            message: error.message().to_string(),
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub const fn error_kind(&self) -> Option<GenerationErrorKind> {
        match self {
            Self::Success => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }
}

/// Ephemeral record of a single attempt against one credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallAttempt {
    pub credential_id: String,
    pub model: String,
    pub timestamp: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<GenerationErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CallAttempt {
    pub fn new(credential: &Credential, outcome: &CallOutcome) -> Self {
        let (error_kind, error_message) = match outcome {
            CallOutcome::Success => (None, None),
            CallOutcome::Failure { kind, message } => (Some(*kind), Some(message.clone())),
        };

        Self {
            credential_id: credential.id().to_string(),
            model: credential.model().to_string(),
            timestamp: now_rfc3339(),
            success: outcome.is_success(),
            error_kind,
            error_message,
        }
    }
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
