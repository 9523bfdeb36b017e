//! Read-only view of pool health for presentation.

use std::sync::Arc;

use serde::Serialize;

use crate::credential::CallAttempt;
use crate::generation::GenerationErrorKind;
use crate::pool::CredentialPool;

/// Health label of one credential.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    #[default]
    Untested,
    Working,
    QuotaExceeded,
    RateLimited,
    AuthFailure,
    Failing,
}

impl CredentialStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Untested => "untested",
            Self::Working => "working",
            Self::QuotaExceeded => "quota_exceeded",
            Self::RateLimited => "rate_limited",
            Self::AuthFailure => "auth_failure",
            Self::Failing => "failing",
        }
    }
}

/// Snapshot of one credential. The secret is never part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialView {
    pub id: String,
    pub key_name: String,
    pub model: String,
    pub active: bool,
    pub status: CredentialStatus,
    pub in_cooldown: bool,
    pub cooldown_remaining_ms: Option<u64>,
    /// Consecutive failures since the last success.
    pub failure_count: u32,
    pub total_failures: u64,
    pub success_count: u64,
    pub last_error: Option<GenerationErrorKind>,
    pub last_error_message: Option<String>,
    pub last_used_at: Option<String>,
}

/// Request-level counters across the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RequestCounters {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Requests that needed more than one attempt.
    pub failovers: u64,
    pub success_rate: f64,
}

impl RequestCounters {
    pub(crate) fn record(&mut self, succeeded: bool, rotated: bool) {
        self.total_requests += 1;
        if succeeded {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
        if rotated {
            self.failovers += 1;
        }
        self.success_rate = if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        };
    }
}

/// Point-in-time pool health.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolSnapshot {
    pub active: Option<String>,
    pub available: usize,
    pub credentials: Vec<CredentialView>,
    pub counters: RequestCounters,
    pub recent_attempts: Vec<CallAttempt>,
}

impl PoolSnapshot {
    pub fn credential(&self, id: &str) -> Option<&CredentialView> {
        self.credentials.iter().find(|view| view.id == id)
    }
}

/// Exposes pool health without any way to change it.
#[derive(Clone)]
pub struct StatusReporter {
    pool: Arc<CredentialPool>,
}

impl StatusReporter {
    pub fn new(pool: Arc<CredentialPool>) -> Self {
        Self { pool }
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        self.pool.snapshot()
    }
}
