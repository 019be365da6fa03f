//! # Circuit Breaker Module
//!
//! Per-provider circuit breaker with persistent state. Breakers isolate a
//! failing upstream so the rest of the chain keeps serving, and let the
//! upstream recover without being hammered.
//!
//! ## States
//!
//! ### Closed (normal operation)
//! - Requests pass through; consecutive failures are counted
//! - Reaching the failure threshold opens the circuit
//!
//! ### Open (failure detected)
//! - Requests are rejected without touching the upstream
//! - Once the open timeout elapses, the next admission moves to Half-Open
//!
//! ### Half-Open (testing recovery)
//! - A bounded number of probe calls are admitted
//! - Enough consecutive successes close the circuit; any failure reopens it
//!
//! ## Persistence
//!
//! The authoritative record lives in the key-value store at
//! `circuit-breaker:<provider>` (no TTL). A 5-second in-memory cache fronts
//! reads; every recorded outcome writes through. Concurrent writers converge
//! last-writer-wins: a write-back is skipped when the stored record carries a
//! newer `last_transition_time`, so a losing writer never overwrites a newer
//! transition. A missing or corrupt stored record re-initializes as a fresh
//! CLOSED record.
//!
//! ## Observability
//!
//! Every transition emits a [`CircuitBreakerEvent`](crate::metrics::CircuitBreakerEvent)
//! to the injected collector, stamped with the reason
//! (`failure_threshold`, `success_threshold`, `timeout`, `manual_reset`).

use crate::error::GatewayError;
use crate::kv::{KvStore, PutOptions};
use crate::metrics::{CircuitBreakerEvent, MetricsCollector, TransitionReason};
use crate::providers::ProviderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const STATE_CACHE_TTL: Duration = Duration::from_secs(5);

fn breaker_key(provider: ProviderId) -> String {
    format!("circuit-breaker:{provider}")
}

/// Circuit breaker operational states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    #[serde(rename = "CLOSED")]
    Closed,
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "HALF_OPEN")]
    HalfOpen,
}

/// Configuration for circuit breaker behavior. Immutable per instance.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in CLOSED before opening the circuit
    pub failure_threshold: u32,
    /// Consecutive successes in HALF_OPEN before closing the circuit
    pub success_threshold: u32,
    /// How long an OPEN circuit rejects before probing recovery
    pub open_timeout: Duration,
    /// Concurrent probe calls admitted in HALF_OPEN
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            open_timeout: Duration::from_secs(60),
            half_open_max_calls: 1,
        }
    }
}

/// Persisted breaker state, one record per provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitRecord {
    pub state: CircuitState,
    /// Consecutive failures accumulated in CLOSED; reset on success or transition
    pub failure_count: u32,
    /// Consecutive successes accumulated in HALF_OPEN; reset on failure or transition
    pub success_count: u32,
    pub last_transition_time: DateTime<Utc>,
    pub last_failure_time: Option<DateTime<Utc>>,
}

impl CircuitRecord {
    fn fresh() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_transition_time: Utc::now(),
            last_failure_time: None,
        }
    }
}

/// Point-in-time breaker snapshot for observability surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    pub provider: ProviderId,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_transition_time: DateTime<Utc>,
}

struct CachedState {
    fetched_at: Instant,
    record: CircuitRecord,
}

/// Circuit breaker for one provider.
///
/// In-process mutations are serialized behind a lock; cross-process
/// consistency is last-writer-wins on the store (eventual convergence
/// suffices, no distributed coordination).
pub struct CircuitBreaker {
    provider: ProviderId,
    config: CircuitBreakerConfig,
    store: Arc<dyn KvStore>,
    collector: Option<Arc<MetricsCollector>>,
    state: Mutex<Option<CachedState>>,
    half_open_in_flight: AtomicU32,
}

impl CircuitBreaker {
    pub fn new(
        provider: ProviderId,
        config: CircuitBreakerConfig,
        store: Arc<dyn KvStore>,
        collector: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            provider,
            config,
            store,
            collector,
            state: Mutex::new(None),
            half_open_in_flight: AtomicU32::new(0),
        }
    }

    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    /// Execute an operation through the admission gate.
    ///
    /// Rejects with `CIRCUIT_OPEN` without invoking the operation when the
    /// circuit is open and the open timeout has not elapsed; otherwise
    /// invokes it and records the outcome. Cancelled calls count as
    /// failures.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let half_open_probe = self.admit().await?;

        let result = operation().await;

        match &result {
            Ok(_) => self.on_success().await,
            Err(_) => self.on_failure().await,
        }

        if half_open_probe {
            let _ = self
                .half_open_in_flight
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                    Some(v.saturating_sub(1))
                });
        }

        result
    }

    /// Current breaker record, read through the cache.
    pub async fn get_state(&self) -> CircuitRecord {
        let mut guard = self.state.lock().await;
        self.current_record(&mut guard).await
    }

    /// Snapshot for health and comparison surfaces.
    pub async fn get_metrics(&self) -> CircuitBreakerSnapshot {
        let record = self.get_state().await;
        CircuitBreakerSnapshot {
            provider: self.provider,
            state: record.state,
            failure_count: record.failure_count,
            success_count: record.success_count,
            last_transition_time: record.last_transition_time,
        }
    }

    /// Force the breaker back to CLOSED with zeroed counters.
    ///
    /// Idempotent; a reset racing an in-flight transition wins because its
    /// record carries the newest transition timestamp.
    pub async fn reset(&self) {
        let mut guard = self.state.lock().await;
        let previous = self.current_record(&mut guard).await;
        let fresh = CircuitRecord::fresh();
        self.write_through(&mut guard, fresh).await;
        self.half_open_in_flight.store(0, Ordering::Release);

        if previous.state != CircuitState::Closed
            || previous.failure_count != 0
            || previous.success_count != 0
        {
            tracing::info!(provider = %self.provider, "circuit breaker manually reset to CLOSED");
            self.emit_event(
                previous.state,
                CircuitState::Closed,
                TransitionReason::ManualReset,
                &previous,
            );
        }
    }

    /// Admission decision. Returns whether the admitted call is a half-open
    /// probe (so the probe slot can be released on completion).
    async fn admit(&self) -> Result<bool, GatewayError> {
        let mut guard = self.state.lock().await;
        let record = self.current_record(&mut guard).await;

        match record.state {
            CircuitState::Closed => Ok(false),
            CircuitState::Open => {
                if self.open_timeout_elapsed(&record) {
                    let previous = record.clone();
                    let mut next = record;
                    next.state = CircuitState::HalfOpen;
                    next.failure_count = 0;
                    next.success_count = 0;
                    next.last_transition_time = Utc::now();
                    self.write_through(&mut guard, next).await;
                    self.half_open_in_flight.store(1, Ordering::Release);
                    tracing::info!(provider = %self.provider, "circuit breaker transitioning to HALF_OPEN");
                    self.emit_event(
                        CircuitState::Open,
                        CircuitState::HalfOpen,
                        TransitionReason::Timeout,
                        &previous,
                    );
                    Ok(true)
                } else {
                    tracing::warn!(provider = %self.provider, "circuit breaker OPEN, rejecting request");
                    Err(GatewayError::CircuitOpen {
                        provider: self.provider,
                    })
                }
            }
            CircuitState::HalfOpen => {
                let admitted = self
                    .half_open_in_flight
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                        (v < self.config.half_open_max_calls).then_some(v + 1)
                    })
                    .is_ok();
                if admitted {
                    Ok(true)
                } else {
                    Err(GatewayError::CircuitOpen {
                        provider: self.provider,
                    })
                }
            }
        }
    }

    async fn on_success(&self) {
        let mut guard = self.state.lock().await;
        let record = self.current_record(&mut guard).await;

        match record.state {
            CircuitState::Closed => {
                let mut next = record;
                next.failure_count = 0;
                self.write_through(&mut guard, next).await;
            }
            CircuitState::HalfOpen => {
                if record.success_count + 1 >= self.config.success_threshold {
                    let previous = record.clone();
                    let mut next = record;
                    next.state = CircuitState::Closed;
                    next.failure_count = 0;
                    next.success_count = 0;
                    next.last_transition_time = Utc::now();
                    self.write_through(&mut guard, next).await;
                    tracing::info!(provider = %self.provider, "circuit breaker recovered, transitioning to CLOSED");
                    self.emit_event(
                        CircuitState::HalfOpen,
                        CircuitState::Closed,
                        TransitionReason::SuccessThreshold,
                        &previous,
                    );
                } else {
                    let mut next = record;
                    next.success_count += 1;
                    next.failure_count = 0;
                    self.write_through(&mut guard, next).await;
                }
            }
            // A call admitted before the circuit opened may land here.
            CircuitState::Open => {}
        }
    }

    async fn on_failure(&self) {
        let mut guard = self.state.lock().await;
        let record = self.current_record(&mut guard).await;
        let now = Utc::now();

        match record.state {
            CircuitState::Closed => {
                if record.failure_count + 1 >= self.config.failure_threshold {
                    let mut previous = record.clone();
                    previous.failure_count += 1;
                    let mut next = record;
                    next.state = CircuitState::Open;
                    next.failure_count = 0;
                    next.success_count = 0;
                    next.last_transition_time = now;
                    next.last_failure_time = Some(now);
                    self.write_through(&mut guard, next).await;
                    tracing::warn!(
                        provider = %self.provider,
                        failures = previous.failure_count,
                        "circuit breaker transitioning to OPEN"
                    );
                    self.emit_event(
                        CircuitState::Closed,
                        CircuitState::Open,
                        TransitionReason::FailureThreshold,
                        &previous,
                    );
                } else {
                    let mut next = record;
                    next.failure_count += 1;
                    next.last_failure_time = Some(now);
                    self.write_through(&mut guard, next).await;
                }
            }
            CircuitState::HalfOpen => {
                let previous = record.clone();
                let mut next = record;
                next.state = CircuitState::Open;
                next.failure_count = 0;
                next.success_count = 0;
                next.last_transition_time = now;
                next.last_failure_time = Some(now);
                self.write_through(&mut guard, next).await;
                tracing::warn!(provider = %self.provider, "probe failed, circuit breaker back to OPEN");
                self.emit_event(
                    CircuitState::HalfOpen,
                    CircuitState::Open,
                    TransitionReason::FailureThreshold,
                    &previous,
                );
            }
            CircuitState::Open => {
                let mut next = record;
                next.last_failure_time = Some(now);
                self.write_through(&mut guard, next).await;
            }
        }
    }

    fn open_timeout_elapsed(&self, record: &CircuitRecord) -> bool {
        Utc::now()
            .signed_duration_since(record.last_transition_time)
            .to_std()
            .map(|elapsed| elapsed >= self.config.open_timeout)
            .unwrap_or(false)
    }

    /// Read through the cache, falling back to the store; a miss with no
    /// stored record initializes a fresh CLOSED record and persists it
    /// asynchronously.
    async fn current_record(&self, guard: &mut Option<CachedState>) -> CircuitRecord {
        if let Some(cached) = guard.as_ref() {
            if cached.fetched_at.elapsed() < STATE_CACHE_TTL {
                return cached.record.clone();
            }
        }

        let record = match self.store.get(&breaker_key(self.provider)).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<CircuitRecord>(&bytes) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(provider = %self.provider, error = %e, "stored breaker record corrupt, re-initializing");
                    let fresh = CircuitRecord::fresh();
                    self.persist_async(fresh.clone());
                    fresh
                }
            },
            Ok(None) => {
                let fresh = CircuitRecord::fresh();
                self.persist_async(fresh.clone());
                fresh
            }
            Err(e) => {
                tracing::warn!(provider = %self.provider, error = %e, "breaker state read failed");
                guard
                    .as_ref()
                    .map(|c| c.record.clone())
                    .unwrap_or_else(CircuitRecord::fresh)
            }
        };

        *guard = Some(CachedState {
            fetched_at: Instant::now(),
            record: record.clone(),
        });
        record
    }

    /// Update the cache and fan the record out to the store. The write is
    /// skipped when the stored record carries a newer transition.
    async fn write_through(&self, guard: &mut Option<CachedState>, record: CircuitRecord) {
        *guard = Some(CachedState {
            fetched_at: Instant::now(),
            record: record.clone(),
        });

        let key = breaker_key(self.provider);
        if let Ok(Some(bytes)) = self.store.get(&key).await {
            if let Ok(stored) = serde_json::from_slice::<CircuitRecord>(&bytes) {
                if stored.last_transition_time > record.last_transition_time {
                    tracing::debug!(provider = %self.provider, "skipping write-back over newer transition");
                    return;
                }
            }
        }

        match serde_json::to_vec(&record) {
            Ok(bytes) => {
                if let Err(e) = self.store.put(&key, bytes, PutOptions::default()).await {
                    tracing::warn!(provider = %self.provider, error = %e, "breaker state write failed");
                }
            }
            Err(e) => {
                tracing::warn!(provider = %self.provider, error = %e, "breaker record did not serialize");
            }
        }
    }

    fn persist_async(&self, record: CircuitRecord) {
        let store = self.store.clone();
        let key = breaker_key(self.provider);
        tokio::spawn(async move {
            // Same write-back guard as the synchronous path: a late
            // initialization write must not clobber a real transition.
            if let Ok(Some(bytes)) = store.get(&key).await {
                if let Ok(stored) = serde_json::from_slice::<CircuitRecord>(&bytes) {
                    if stored.last_transition_time > record.last_transition_time {
                        return;
                    }
                }
            }
            if let Ok(bytes) = serde_json::to_vec(&record) {
                if let Err(e) = store.put(&key, bytes, PutOptions::default()).await {
                    tracing::warn!(key = %key, error = %e, "breaker record initialization write failed");
                }
            }
        });
    }

    fn emit_event(
        &self,
        previous_state: CircuitState,
        new_state: CircuitState,
        reason: TransitionReason,
        at_transition: &CircuitRecord,
    ) {
        if let Some(collector) = &self.collector {
            collector.record_circuit_breaker_state_change(CircuitBreakerEvent {
                timestamp: Utc::now(),
                provider: self.provider,
                previous_state,
                new_state,
                reason,
                failure_count: Some(at_transition.failure_count),
                success_count: Some(at_transition.success_count),
            });
        }
    }
}
