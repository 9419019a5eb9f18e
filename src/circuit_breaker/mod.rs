//! Per-operation circuit breaker for backend calls
//!
//! Every operation key (`search:engine`, `search:vector`, ...) owns an
//! independent three-state machine. State lives in a sharded [`DashMap`] so
//! concurrent requests touching different keys never contend, and no lock is
//! held across an `.await`.

use crate::config::CircuitBreakerSettings;
use crate::error::{Result, SearchError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed,

    /// Circuit is open, requests are short-circuited
    Open,

    /// Circuit is half-open, one trial request is allowed
    HalfOpen,
}

impl CircuitState {
    fn severity(self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: usize,

    /// Time an open circuit waits before allowing a trial call
    pub reset_timeout: Duration,

    /// Timeout applied to each guarded call; a timeout counts as a failure
    pub call_timeout: Option<Duration>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            call_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            reset_timeout: settings.reset_timeout(),
            call_timeout: Some(settings.call_timeout()),
        }
    }
}

/// A state transition on one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub key: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub at: DateTime<Utc>,
}

/// Point-in-time view of one key
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitSnapshot {
    pub key: String,
    pub state: CircuitState,
    pub failure_count: usize,
    pub success_count: usize,
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Milliseconds until an open circuit admits a trial call
    pub retry_in_ms: Option<u64>,
}

#[derive(Debug, Clone)]
struct KeyState {
    state: CircuitState,
    failure_count: usize,
    success_count: usize,
    last_failure_time: Option<DateTime<Utc>>,
    next_attempt_time: Option<Instant>,
    trial_in_flight: bool,
}

impl KeyState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            next_attempt_time: None,
            trial_in_flight: false,
        }
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.success_count = 0;
        self.next_attempt_time = None;
        self.trial_in_flight = false;
    }
}

enum Admission {
    Allowed { trial: bool },
    Rejected,
}

enum Guarded<T> {
    Completed(Result<T>),
    Rejected,
}

/// Releases a half-open trial slot if the guarded future is dropped mid-call
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    key: &'a str,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_trial(self.key);
        }
    }
}

/// Registry of per-key circuit breakers
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    states: DashMap<String, KeyState>,
    events: broadcast::Sender<StateChange>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker registry
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            config,
            states: DashMap::new(),
            events,
        }
    }

    /// Subscribe to state-change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    /// Run `operation` under the breaker for `key`.
    ///
    /// Fails with [`SearchError::CircuitOpen`] when the circuit rejects the call.
    pub async fn execute<T, F, Fut>(&self, key: &str, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.guarded(key, operation).await {
            Guarded::Completed(result) => result,
            Guarded::Rejected => Err(SearchError::CircuitOpen { key: key.to_string() }),
        }
    }

    /// Run `operation` under the breaker for `key`, serving `fallback` when the
    /// circuit is open or the call fails transiently.
    ///
    /// Non-transient errors (validation, index not found) still propagate.
    pub async fn execute_with_fallback<T, F, Fut, FB, FBFut>(
        &self,
        key: &str,
        operation: F,
        fallback: FB,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        FB: FnOnce() -> FBFut,
        FBFut: Future<Output = T>,
    {
        match self.guarded(key, operation).await {
            Guarded::Completed(Ok(value)) => Ok(value),
            Guarded::Completed(Err(e)) if e.is_transient() => {
                warn!("Operation '{}' failed, serving fallback: {}", key, e);
                Ok(fallback().await)
            }
            Guarded::Completed(Err(e)) => Err(e),
            Guarded::Rejected => {
                debug!("Circuit open for '{}', serving fallback", key);
                Ok(fallback().await)
            }
        }
    }

    async fn guarded<T, F, Fut>(&self, key: &str, operation: F) -> Guarded<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let trial = match self.admit(key) {
            Admission::Allowed { trial } => trial,
            Admission::Rejected => return Guarded::Rejected,
        };

        let mut guard = TrialGuard {
            breaker: self,
            key,
            armed: trial,
        };

        let result = match self.config.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, operation()).await {
                Ok(result) => result,
                Err(_) => Err(SearchError::Timeout {
                    operation: key.to_string(),
                    timeout_ms: limit.as_millis() as u64,
                }),
            },
            None => operation().await,
        };

        guard.armed = false;
        match &result {
            Ok(_) => self.record_success(key),
            Err(e) if e.is_transient() => self.record_failure(key),
            Err(e) => {
                debug!("Operation '{}' failed with non-transient error: {}", key, e);
                self.release_trial(key);
            }
        }

        Guarded::Completed(result)
    }

    fn admit(&self, key: &str) -> Admission {
        let mut transition = None;
        let admission = {
            let mut entry = self.states.entry(key.to_string()).or_insert_with(KeyState::new);
            match entry.state {
                CircuitState::Closed => Admission::Allowed { trial: false },
                CircuitState::Open => {
                    let ready = entry
                        .next_attempt_time
                        .map(|at| Instant::now() >= at)
                        .unwrap_or(true);
                    if ready {
                        entry.state = CircuitState::HalfOpen;
                        entry.trial_in_flight = true;
                        entry.success_count = 0;
                        transition = Some((CircuitState::Open, CircuitState::HalfOpen));
                        Admission::Allowed { trial: true }
                    } else {
                        Admission::Rejected
                    }
                }
                CircuitState::HalfOpen => {
                    if entry.trial_in_flight {
                        Admission::Rejected
                    } else {
                        entry.trial_in_flight = true;
                        Admission::Allowed { trial: true }
                    }
                }
            }
        };

        if let Some((from, to)) = transition {
            self.emit(key, from, to);
        }
        admission
    }

    /// Record a successful call on `key`
    pub fn record_success(&self, key: &str) {
        let mut transition = None;
        {
            let mut entry = self.states.entry(key.to_string()).or_insert_with(KeyState::new);
            match entry.state {
                CircuitState::Closed => {
                    entry.failure_count = 0;
                    entry.success_count += 1;
                }
                CircuitState::HalfOpen => {
                    entry.close();
                    transition = Some((CircuitState::HalfOpen, CircuitState::Closed));
                }
                CircuitState::Open => {}
            }
        }

        if let Some((from, to)) = transition {
            info!("Circuit '{}' closed after successful trial call", key);
            self.emit(key, from, to);
        }
    }

    /// Record a failed call on `key`
    pub fn record_failure(&self, key: &str) {
        let mut transition = None;
        {
            let mut entry = self.states.entry(key.to_string()).or_insert_with(KeyState::new);
            entry.last_failure_time = Some(Utc::now());
            match entry.state {
                CircuitState::Closed => {
                    entry.failure_count += 1;
                    if entry.failure_count >= self.config.failure_threshold {
                        entry.state = CircuitState::Open;
                        entry.next_attempt_time = Some(Instant::now() + self.config.reset_timeout);
                        transition = Some((CircuitState::Closed, CircuitState::Open));
                        warn!("Circuit '{}' opened after {} failures", key, entry.failure_count);
                    }
                }
                CircuitState::HalfOpen => {
                    entry.state = CircuitState::Open;
                    entry.failure_count += 1;
                    entry.trial_in_flight = false;
                    entry.next_attempt_time = Some(Instant::now() + self.config.reset_timeout);
                    transition = Some((CircuitState::HalfOpen, CircuitState::Open));
                    warn!("Circuit '{}' reopened after failed trial call", key);
                }
                CircuitState::Open => {
                    entry.failure_count += 1;
                }
            }
        }

        if let Some((from, to)) = transition {
            self.emit(key, from, to);
        }
    }

    fn release_trial(&self, key: &str) {
        if let Some(mut entry) = self.states.get_mut(key) {
            entry.trial_in_flight = false;
        }
    }

    /// Force `key` back to closed
    pub fn reset(&self, key: &str) {
        let previous = self.states.get_mut(key).map(|mut entry| {
            let previous = entry.state;
            entry.close();
            previous
        });

        if let Some(from) = previous {
            debug!("Circuit '{}' reset", key);
            if from != CircuitState::Closed {
                self.emit(key, from, CircuitState::Closed);
            }
        }
    }

    /// Force every key back to closed
    pub fn reset_all(&self) {
        let mut reopened = Vec::new();
        for mut entry in self.states.iter_mut() {
            if entry.state != CircuitState::Closed {
                reopened.push((entry.key().clone(), entry.state));
            }
            entry.close();
        }

        for (key, from) in reopened {
            self.emit(&key, from, CircuitState::Closed);
        }
        debug!("All circuits reset");
    }

    /// Current state of `key`; unknown keys are closed
    pub fn state(&self, key: &str) -> CircuitState {
        self.states
            .get(key)
            .map(|entry| entry.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Most severe state across all keys
    pub fn overall_state(&self) -> CircuitState {
        self.states
            .iter()
            .map(|entry| entry.state)
            .max_by_key(|state| state.severity())
            .unwrap_or(CircuitState::Closed)
    }

    /// Snapshot of one key
    pub fn stats(&self, key: &str) -> Option<CircuitSnapshot> {
        self.states.get(key).map(|entry| Self::snapshot(key, &entry))
    }

    /// Snapshots of all keys, sorted by key
    pub fn snapshot_all(&self) -> Vec<CircuitSnapshot> {
        let mut snapshots: Vec<_> = self
            .states
            .iter()
            .map(|entry| Self::snapshot(entry.key(), entry.value()))
            .collect();
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        snapshots
    }

    fn snapshot(key: &str, state: &KeyState) -> CircuitSnapshot {
        let retry_in_ms = match state.state {
            CircuitState::Open => state
                .next_attempt_time
                .map(|at| at.saturating_duration_since(Instant::now()).as_millis() as u64),
            _ => None,
        };

        CircuitSnapshot {
            key: key.to_string(),
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            last_failure_time: state.last_failure_time,
            retry_in_ms,
        }
    }

    fn emit(&self, key: &str, from: CircuitState, to: CircuitState) {
        // No receivers is fine
        let _ = self.events.send(StateChange {
            key: key.to_string(),
            from,
            to,
            at: Utc::now(),
        });
    }
}
