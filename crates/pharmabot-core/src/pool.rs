//! Credential pool manager.
//!
//! The pool owns every configured (API key, model) pair together with its
//! health. Selection prefers credentials outside cooldown with the fewest
//! consecutive failures, and alternates between equally healthy ones with a
//! round-robin cursor. When every credential is cooling down the one whose
//! cooldown ends first is returned, so a caller always gets a candidate.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::ConfigError;
use crate::credential::{now_rfc3339, CallAttempt, CallOutcome, Credential};
use crate::generation::GenerationErrorKind;
use crate::status::{CredentialStatus, CredentialView, PoolSnapshot, RequestCounters};

/// Longest cooldown a credential can be given.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Cooldown and circuit thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// How long a credential sits out after quota, rate-limit or auth failures.
    /// Capped at [`MAX_COOLDOWN`].
    pub cooldown: Duration,
    /// Consecutive transient failures before a credential also cools down.
    pub failure_threshold: u32,
    /// Number of recent attempts kept for display.
    pub history_limit: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(300),
            failure_threshold: 3,
            history_limit: 32,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Health {
    status: CredentialStatus,
    consecutive_failures: u32,
    total_failures: u64,
    success_count: u64,
    cooldown_until: Option<Instant>,
    last_error: Option<GenerationErrorKind>,
    last_error_message: Option<String>,
    last_used_at: Option<String>,
}

impl Health {
    fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    fn record_failure(&mut self, kind: GenerationErrorKind, message: &str) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.total_failures = self.total_failures.saturating_add(1);
        self.last_error = Some(kind);
        self.last_error_message = Some(message.to_string());
    }
}

#[derive(Debug)]
struct PoolEntry {
    credential: Credential,
    health: Health,
}

#[derive(Debug, Default)]
struct PoolInner {
    entries: Vec<PoolEntry>,
    cursor: usize,
    active: Option<usize>,
    counters: RequestCounters,
    recent: VecDeque<CallAttempt>,
}

/// Thread-safe owner of credential health.
pub struct CredentialPool {
    config: PoolConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<PoolInner>,
}

impl CredentialPool {
    /// Build a pool over `credentials` using the system clock.
    ///
    /// # Errors
    /// Fails when `credentials` is empty or contains duplicate ids.
    pub fn new(credentials: Vec<Credential>, config: PoolConfig) -> Result<Self, ConfigError> {
        Self::with_clock(credentials, config, Arc::new(SystemClock))
    }

    /// Build a pool that reads time from `clock`.
    pub fn with_clock(
        credentials: Vec<Credential>,
        config: PoolConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        if credentials.is_empty() {
            return Err(ConfigError::NoCredentials);
        }

        let mut seen = HashSet::new();
        for credential in &credentials {
            if !seen.insert(credential.id().to_string()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate credential '{}'",
                    credential.id()
                )));
            }
        }

        let entries = credentials
            .into_iter()
            .map(|credential| PoolEntry {
                credential,
                health: Health::default(),
            })
            .collect();

        Ok(Self {
            config,
            clock,
            inner: Mutex::new(PoolInner {
                entries,
                ..PoolInner::default()
            }),
        })
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Always false; a pool cannot be built empty.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Best available credential right now.
    pub fn next_candidate(&self) -> Credential {
        self.next_candidate_excluding(&[])
    }

    /// Like [`next_candidate`](Self::next_candidate), preferring ids not in
    /// `tried`. A tried credential outside cooldown still wins over an untried
    /// one that is cooling down.
    pub fn next_candidate_excluding(&self, tried: &[String]) -> Credential {
        let now = self.clock.now();
        let mut inner = self.lock();
        let index = select_index(&inner, tried, now);

        let count = inner.entries.len();
        inner.cursor = (index + 1) % count;
        inner.active = Some(index);

        let entry = &inner.entries[index];
        if entry.health.in_cooldown(now) {
            warn!(
                credential = entry.credential.id(),
                "every credential is cooling down; using the earliest to recover"
            );
        } else {
            debug!(
                credential = entry.credential.id(),
                failures = entry.health.consecutive_failures,
                "selected credential"
            );
        }
        entry.credential.clone()
    }

    /// Fold one call outcome into the credential's health.
    pub fn record_result(&self, credential: &Credential, outcome: &CallOutcome) -> CallAttempt {
        let now = self.clock.now();
        let attempt = CallAttempt::new(credential, outcome);
        let cooldown_until = cooldown_deadline(now, self.config.cooldown);
        let threshold = self.config.failure_threshold.max(1);

        let mut inner = self.lock();
        let Some(index) = inner
            .entries
            .iter()
            .position(|entry| entry.credential.id() == credential.id())
        else {
            warn!(credential = credential.id(), "outcome for unknown credential ignored");
            return attempt;
        };

        let health = &mut inner.entries[index].health;
        health.last_used_at = Some(attempt.timestamp.clone());

        match outcome {
            CallOutcome::Success => {
                health.status = CredentialStatus::Working;
                health.consecutive_failures = 0;
                health.cooldown_until = None;
                health.success_count = health.success_count.saturating_add(1);
            }
            CallOutcome::Failure { kind, message } => match kind {
                GenerationErrorKind::MalformedRequest => {}
                GenerationErrorKind::QuotaExceeded
                | GenerationErrorKind::RateLimited
                | GenerationErrorKind::AuthFailure => {
                    health.record_failure(*kind, message);
                    health.cooldown_until = Some(cooldown_until);
                    health.status = match kind {
                        GenerationErrorKind::QuotaExceeded => CredentialStatus::QuotaExceeded,
                        GenerationErrorKind::RateLimited => CredentialStatus::RateLimited,
                        _ => CredentialStatus::AuthFailure,
                    };
                }
                GenerationErrorKind::TransientNetwork | GenerationErrorKind::ModelNotFound => {
                    health.record_failure(*kind, message);
                    health.status = CredentialStatus::Failing;
                    if health.consecutive_failures >= threshold {
                        health.cooldown_until = Some(cooldown_until);
                    }
                }
            },
        }

        if self.config.history_limit > 0 {
            if inner.recent.len() >= self.config.history_limit {
                inner.recent.pop_front();
            }
            inner.recent.push_back(attempt.clone());
        }

        attempt
    }

    /// Count one finished request.
    pub fn record_request(&self, succeeded: bool, rotated: bool) {
        self.lock().counters.record(succeeded, rotated);
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let now = self.clock.now();
        let inner = self.lock();

        let credentials: Vec<CredentialView> = inner
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| entry_view(index, entry, inner.active, now))
            .collect();
        let available = credentials.iter().filter(|view| !view.in_cooldown).count();

        PoolSnapshot {
            active: inner
                .active
                .map(|index| inner.entries[index].credential.id().to_string()),
            available,
            credentials,
            counters: inner.counters,
            recent_attempts: inner.recent.iter().cloned().collect(),
        }
    }

    /// Forget all health, counters and history.
    pub fn reset(&self) {
        let mut inner = self.lock();
        for entry in &mut inner.entries {
            entry.health = Health::default();
        }
        inner.cursor = 0;
        inner.active = None;
        inner.counters = RequestCounters::default();
        inner.recent.clear();
        info!(credentials = inner.entries.len(), at = %now_rfc3339(), "credential pool reset");
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn select_index(inner: &PoolInner, tried: &[String], now: Instant) -> usize {
    let count = inner.entries.len();
    let is_tried = |index: usize| {
        let id = inner.entries[index].credential.id();
        tried.iter().any(|tried_id| tried_id == id)
    };
    let prefer_untried = |indexes: Vec<usize>| {
        let untried: Vec<usize> = indexes.iter().copied().filter(|&index| !is_tried(index)).collect();
        if untried.is_empty() {
            indexes
        } else {
            untried
        }
    };

    let ready: Vec<usize> = (0..count)
        .filter(|&index| !inner.entries[index].health.in_cooldown(now))
        .collect();

    // Cooling credentials are only eligible when nothing else is.
    if ready.is_empty() {
        return prefer_untried((0..count).collect())
            .into_iter()
            .min_by_key(|&index| (inner.entries[index].health.cooldown_until, index))
            .unwrap_or(0);
    }

    let candidates = prefer_untried(ready);
    let fewest = candidates
        .iter()
        .map(|&index| inner.entries[index].health.consecutive_failures)
        .min()
        .unwrap_or(0);

    (0..count)
        .map(|offset| (inner.cursor + offset) % count)
        .find(|index| {
            candidates.contains(index)
                && inner.entries[*index].health.consecutive_failures == fewest
        })
        .unwrap_or(candidates[0])
}

/// `now + cooldown`, with the cooldown capped at [`MAX_COOLDOWN`].
fn cooldown_deadline(now: Instant, cooldown: Duration) -> Instant {
    let cooldown = cooldown.min(MAX_COOLDOWN);
    now.checked_add(cooldown).unwrap_or(now)
}

fn entry_view(index: usize, entry: &PoolEntry, active: Option<usize>, now: Instant) -> CredentialView {
    let health = &entry.health;
    let remaining = health
        .cooldown_until
        .filter(|until| *until > now)
        .map(|until| u64::try_from((until - now).as_millis()).unwrap_or(u64::MAX));

    CredentialView {
        id: entry.credential.id().to_string(),
        key_name: entry.credential.key_name().to_string(),
        model: entry.credential.model().to_string(),
        active: active == Some(index),
        status: health.status,
        in_cooldown: remaining.is_some(),
        cooldown_remaining_ms: remaining,
        failure_count: health.consecutive_failures,
        total_failures: health.total_failures,
        success_count: health.success_count,
        last_error: health.last_error,
        last_error_message: health.last_error_message.clone(),
        last_used_at: health.last_used_at.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::credential::ApiKey;
    use crate::generation::GenerationError;

    fn credentials(names: &[&str]) -> Vec<Credential> {
        names
            .iter()
            .map(|name| Credential::new(*name, ApiKey::new(format!("secret-{name}")), "gemini-2.0-flash"))
            .collect()
    }

    fn pool(names: &[&str]) -> (CredentialPool, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let pool = CredentialPool::with_clock(credentials(names), PoolConfig::default(), clock.clone())
            .expect("pool");
        (pool, clock)
    }

    fn fail(pool: &CredentialPool, credential: &Credential, error: GenerationError) {
        pool.record_result(credential, &CallOutcome::failure(&error));
    }

    #[test]
    fn empty_pool_is_a_configuration_error() {
        let result = CredentialPool::new(Vec::new(), PoolConfig::default());
        assert!(matches!(result, Err(ConfigError::NoCredentials)));
    }

    #[test]
    fn duplicate_credentials_are_rejected() {
        let result = CredentialPool::new(credentials(&["a", "a"]), PoolConfig::default());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn healthy_credentials_alternate_round_robin() {
        let (pool, _) = pool(&["a", "b", "c"]);

        let order: Vec<String> = (0..4).map(|_| pool.next_candidate().key_name().to_string()).collect();

        assert_eq!(order, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn fewest_consecutive_failures_wins_over_cursor() {
        let (pool, _) = pool(&["a", "b"]);
        let a = pool.next_candidate();
        fail(&pool, &a, GenerationError::transient("reset by peer"));
        let b = pool.next_candidate();
        fail(&pool, &b, GenerationError::transient("reset by peer"));
        fail(&pool, &b, GenerationError::transient("reset by peer"));

        assert_eq!(pool.next_candidate().key_name(), "a");
        assert_eq!(pool.next_candidate().key_name(), "a");
    }

    #[test]
    fn quota_failure_cools_down_until_expiry() {
        let (pool, clock) = pool(&["a", "b"]);
        let a = pool.next_candidate();
        fail(&pool, &a, GenerationError::quota_exceeded("quota"));

        assert_eq!(pool.next_candidate().key_name(), "b");
        assert_eq!(pool.next_candidate().key_name(), "b");

        clock.advance(Duration::from_secs(301));
        let snapshot = pool.snapshot();
        assert!(!snapshot.credential("a/gemini-2.0-flash").expect("a").in_cooldown);
        assert_eq!(snapshot.available, 2);
    }

    #[test]
    fn all_cooling_down_returns_earliest_expiry() {
        let (pool, clock) = pool(&["a", "b", "c"]);
        let all = credentials(&["a", "b", "c"]);

        fail(&pool, &all[1], GenerationError::rate_limited("429"));
        clock.advance(Duration::from_secs(10));
        fail(&pool, &all[2], GenerationError::rate_limited("429"));
        clock.advance(Duration::from_secs(10));
        fail(&pool, &all[0], GenerationError::rate_limited("429"));

        assert_eq!(pool.next_candidate().key_name(), "b");
        assert_eq!(pool.snapshot().available, 0);
    }

    #[test]
    fn transient_failures_trip_cooldown_at_threshold() {
        let (pool, _) = pool(&["a", "b"]);
        let a = credentials(&["a"]).remove(0);

        fail(&pool, &a, GenerationError::transient("timeout"));
        fail(&pool, &a, GenerationError::model_not_found("404"));
        assert!(!pool.snapshot().credentials[0].in_cooldown);

        fail(&pool, &a, GenerationError::transient("timeout"));
        let view = pool.snapshot().credentials[0].clone();
        assert!(view.in_cooldown);
        assert_eq!(view.failure_count, 3);
        assert_eq!(view.status, CredentialStatus::Failing);
    }

    #[test]
    fn malformed_request_leaves_health_untouched() {
        let (pool, _) = pool(&["a"]);
        let a = pool.next_candidate();

        fail(&pool, &a, GenerationError::malformed("bad field"));

        let snapshot = pool.snapshot();
        let view = &snapshot.credentials[0];
        assert_eq!(view.failure_count, 0);
        assert_eq!(view.status, CredentialStatus::Untested);
        assert!(!view.in_cooldown);
        assert_eq!(snapshot.recent_attempts.len(), 1);
    }

    #[test]
    fn success_resets_failures_and_clears_cooldown() {
        let (pool, _) = pool(&["a"]);
        let a = pool.next_candidate();
        fail(&pool, &a, GenerationError::quota_exceeded("quota"));

        pool.record_result(&a, &CallOutcome::Success);

        let view = pool.snapshot().credentials[0].clone();
        assert_eq!(view.failure_count, 0);
        assert_eq!(view.total_failures, 1);
        assert_eq!(view.success_count, 1);
        assert!(!view.in_cooldown);
        assert_eq!(view.status, CredentialStatus::Working);
    }

    #[test]
    fn excluded_credentials_are_skipped_until_all_tried() {
        let (pool, _) = pool(&["a", "b"]);

        let first = pool.next_candidate_excluding(&[String::from("b/gemini-2.0-flash")]);
        let everything = pool.next_candidate_excluding(&[
            String::from("a/gemini-2.0-flash"),
            String::from("b/gemini-2.0-flash"),
        ]);

        assert_eq!(first.key_name(), "a");
        assert_eq!(everything.key_name(), "b");
    }

    #[test]
    fn tried_but_ready_credential_beats_untried_cooling_one() {
        let (pool, _) = pool(&["a", "b"]);
        let all = credentials(&["a", "b"]);
        fail(&pool, &all[1], GenerationError::quota_exceeded("quota"));
        fail(&pool, &all[0], GenerationError::transient("timeout"));

        let next = pool.next_candidate_excluding(&[String::from("a/gemini-2.0-flash")]);

        assert_eq!(next.key_name(), "a");
    }

    #[test]
    fn oversized_cooldown_is_capped_instead_of_overflowing() {
        let clock = Arc::new(ManualClock::new());
        let config = PoolConfig {
            cooldown: Duration::MAX,
            ..PoolConfig::default()
        };
        let pool = CredentialPool::with_clock(credentials(&["a"]), config, clock.clone())
            .expect("pool");
        let a = pool.next_candidate();

        fail(&pool, &a, GenerationError::quota_exceeded("quota"));

        let view = pool.snapshot().credentials[0].clone();
        assert!(view.in_cooldown);
        let remaining = view.cooldown_remaining_ms.expect("remaining");
        assert_eq!(u128::from(remaining), MAX_COOLDOWN.as_millis());

        clock.advance(MAX_COOLDOWN);
        assert!(!pool.snapshot().credentials[0].in_cooldown);
    }

    #[test]
    fn history_ring_is_bounded() {
        let clock = Arc::new(ManualClock::new());
        let config = PoolConfig {
            history_limit: 2,
            ..PoolConfig::default()
        };
        let pool = CredentialPool::with_clock(credentials(&["a"]), config, clock).expect("pool");
        let a = pool.next_candidate();

        for _ in 0..5 {
            pool.record_result(&a, &CallOutcome::Success);
        }

        assert_eq!(pool.snapshot().recent_attempts.len(), 2);
    }

    #[test]
    fn reset_restores_untested_state() {
        let (pool, _) = pool(&["a", "b"]);
        let a = pool.next_candidate();
        fail(&pool, &a, GenerationError::auth_failure("401"));
        pool.record_request(false, false);

        pool.reset();

        let snapshot = pool.snapshot();
        assert_eq!(snapshot.active, None);
        assert_eq!(snapshot.counters.total_requests, 0);
        assert!(snapshot.recent_attempts.is_empty());
        assert!(snapshot
            .credentials
            .iter()
            .all(|view| view.status == CredentialStatus::Untested && !view.in_cooldown));
        assert_eq!(pool.next_candidate().key_name(), "a");
    }
}
