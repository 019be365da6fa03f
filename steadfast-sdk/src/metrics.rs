//! # Metrics Collection Module
//!
//! Records the outcome of every attempted provider call, aggregates
//! per-provider statistics, and persists them through the key-value port.
//!
//! ## Overview
//!
//! The collector provides:
//! - **Outcome Recording**: success/failure events with latency, tokens and
//!   error codes, one per breaker admission
//! - **Buffered Aggregation**: record calls enqueue into in-memory buffers;
//!   every read triggers a flush that merges buffered events into the
//!   persisted per-provider aggregate
//! - **Latency Analysis**: lifetime min/max, request-weighted running mean,
//!   and batch-scoped p50/p95/p99 percentiles
//! - **Circuit Visibility**: breaker transitions land in the aggregate's
//!   `circuit_state` / `circuit_failures` fields
//!
//! ## Persistence
//!
//! One record per provider at `metrics:<provider>:current` with a 7-day TTL.
//! A 5-second in-memory cache masks read amplification; every record call
//! invalidates the affected provider's cache entry.
//!
//! ## Percentile Approximation
//!
//! p50/p95/p99 are computed over the current flush batch only, not over the
//! provider's lifetime: the rank is `floor(N * p)` into the ascending batch
//! (1-based, clamped to the batch), so a batch of ten latencies
//! 100..=1000 ms yields p50 = 500 and p95 = 900. Lifetime-exact percentiles
//! would require retaining or sketching every latency; a streaming quantile
//! sketch can replace this without changing the contract.
//!
//! ## Accounting Guarantees
//!
//! `requests_success + requests_failure = requests_total` holds at every
//! observation point. Concurrent flushes resolve last-writer-wins against
//! the store; at most one batch of events may be lost (exact-once metric
//! accounting is a non-goal).

use crate::circuit_breaker::CircuitState;
use crate::kv::{KvStore, PutOptions};
use crate::providers::ProviderId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const METRICS_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const READ_CACHE_TTL: Duration = Duration::from_secs(5);

fn metrics_key(provider: ProviderId) -> String {
    format!("metrics:{provider}:current")
}

/// One recorded request outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetric {
    pub timestamp: DateTime<Utc>,
    pub provider: ProviderId,
    pub success: bool,
    pub latency_ms: u64,
    pub tokens_used: Option<u32>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// Why a circuit breaker changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    FailureThreshold,
    SuccessThreshold,
    Timeout,
    ManualReset,
}

/// One circuit breaker transition, emitted by the breaker on state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerEvent {
    pub timestamp: DateTime<Utc>,
    pub provider: ProviderId,
    pub previous_state: CircuitState,
    pub new_state: CircuitState,
    pub reason: TransitionReason,
    pub failure_count: Option<u32>,
    pub success_count: Option<u32>,
}

/// Aggregated per-provider metrics, persisted with a 7-day TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetricsRecord {
    pub provider: ProviderId,
    pub requests_total: u64,
    pub requests_success: u64,
    pub requests_failure: u64,
    pub success_rate: f64,
    pub error_rate: f64,
    /// Meaningful only once `requests_total > 0`; the first merged batch
    /// seeds min/max directly
    pub latency_min_ms: f64,
    pub latency_max_ms: f64,
    pub latency_avg_ms: f64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub tokens_total: u64,
    pub failover_count: u64,
    pub circuit_state: CircuitState,
    pub circuit_failures: u32,
    pub uptime_percentage: f64,
    pub updated_at: DateTime<Utc>,
}

impl ProviderMetricsRecord {
    /// Zeroed record distinguishing "seen, zero traffic" from "never seen".
    pub fn zeroed(provider: ProviderId) -> Self {
        Self {
            provider,
            requests_total: 0,
            requests_success: 0,
            requests_failure: 0,
            success_rate: 1.0,
            error_rate: 0.0,
            latency_min_ms: 0.0,
            latency_max_ms: 0.0,
            latency_avg_ms: 0.0,
            latency_p50_ms: 0.0,
            latency_p95_ms: 0.0,
            latency_p99_ms: 0.0,
            tokens_total: 0,
            failover_count: 0,
            circuit_state: CircuitState::Closed,
            circuit_failures: 0,
            uptime_percentage: 100.0,
            updated_at: Utc::now(),
        }
    }
}

/// Summary across all providers, derived on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub requests_total: u64,
    pub requests_success: u64,
    pub requests_failure: u64,
    pub success_rate: f64,
    pub latency_avg_ms: f64,
    pub tokens_total: u64,
    pub failover_count: u64,
    pub circuit_events: u64,
    pub providers: Vec<ProviderMetricsRecord>,
}

struct CachedRecord {
    fetched_at: Instant,
    record: ProviderMetricsRecord,
}

/// Buffered, persisting metrics collector.
///
/// Producers push events without awaiting; the flushing reader snapshots the
/// buffers atomically and performs per-provider read-modify-write against
/// the store. Store failures degrade to a warning rather than failing the
/// request path.
pub struct MetricsCollector {
    store: Arc<dyn KvStore>,
    request_buffer: Mutex<Vec<RequestMetric>>,
    failover_buffer: Mutex<Vec<ProviderId>>,
    circuit_buffer: Mutex<Vec<CircuitBreakerEvent>>,
    circuit_event_count: AtomicU64,
    cache: DashMap<ProviderId, CachedRecord>,
}

impl MetricsCollector {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            request_buffer: Mutex::new(Vec::new()),
            failover_buffer: Mutex::new(Vec::new()),
            circuit_buffer: Mutex::new(Vec::new()),
            circuit_event_count: AtomicU64::new(0),
            cache: DashMap::new(),
        }
    }

    /// Marker for an attempt entering a provider. Not an aggregate event;
    /// totals count completed outcomes only.
    pub fn record_request(&self, provider: ProviderId) {
        tracing::debug!(provider = %provider, "provider attempt started");
        self.cache.remove(&provider);
    }

    pub fn record_success(&self, provider: ProviderId, latency: Duration, tokens: Option<u32>) {
        self.push_metric(RequestMetric {
            timestamp: Utc::now(),
            provider,
            success: true,
            latency_ms: latency.as_millis() as u64,
            tokens_used: tokens,
            error_code: None,
            error_message: None,
        });
    }

    pub fn record_failure(
        &self,
        provider: ProviderId,
        latency: Duration,
        error_code: &str,
        error_message: &str,
    ) {
        self.push_metric(RequestMetric {
            timestamp: Utc::now(),
            provider,
            success: false,
            latency_ms: latency.as_millis() as u64,
            tokens_used: None,
            error_code: Some(error_code.to_string()),
            error_message: Some(error_message.to_string()),
        });
    }

    /// The chain advanced past this provider after a failure.
    pub fn record_failover(&self, provider: ProviderId) {
        self.failover_buffer.lock().unwrap().push(provider);
        self.cache.remove(&provider);
    }

    pub fn record_circuit_breaker_state_change(&self, event: CircuitBreakerEvent) {
        self.cache.remove(&event.provider);
        self.circuit_event_count.fetch_add(1, Ordering::Relaxed);
        self.circuit_buffer.lock().unwrap().push(event);
    }

    fn push_metric(&self, metric: RequestMetric) {
        self.cache.remove(&metric.provider);
        self.request_buffer.lock().unwrap().push(metric);
    }

    /// Aggregated metrics for one provider, or `None` when never seen.
    pub async fn get_provider_metrics(
        &self,
        provider: ProviderId,
    ) -> Option<ProviderMetricsRecord> {
        self.flush().await;

        if let Some(cached) = self.cache.get(&provider) {
            if cached.fetched_at.elapsed() < READ_CACHE_TTL {
                return Some(cached.record.clone());
            }
        }

        let record = self.load_record(provider).await?;
        self.cache.insert(
            provider,
            CachedRecord {
                fetched_at: Instant::now(),
                record: record.clone(),
            },
        );
        Some(record)
    }

    /// Summary across every provider that has been seen.
    pub async fn get_aggregated_metrics(&self) -> MetricsSummary {
        self.flush().await;

        let mut providers = Vec::new();
        for &provider in ProviderId::ALL {
            if let Some(record) = self.load_record(provider).await {
                providers.push(record);
            }
        }

        let requests_total: u64 = providers.iter().map(|r| r.requests_total).sum();
        let requests_success: u64 = providers.iter().map(|r| r.requests_success).sum();
        let weighted_latency: f64 = providers
            .iter()
            .map(|r| r.latency_avg_ms * r.requests_total as f64)
            .sum();

        MetricsSummary {
            requests_total,
            requests_success,
            requests_failure: requests_total - requests_success,
            success_rate: if requests_total > 0 {
                requests_success as f64 / requests_total as f64
            } else {
                1.0
            },
            latency_avg_ms: if requests_total > 0 {
                weighted_latency / requests_total as f64
            } else {
                0.0
            },
            tokens_total: providers.iter().map(|r| r.tokens_total).sum(),
            failover_count: providers.iter().map(|r| r.failover_count).sum(),
            circuit_events: self.circuit_event_count.load(Ordering::Relaxed),
            providers,
        }
    }

    /// Drop all buffered and persisted metrics.
    pub async fn reset(&self) {
        self.request_buffer.lock().unwrap().clear();
        self.failover_buffer.lock().unwrap().clear();
        self.circuit_buffer.lock().unwrap().clear();
        self.circuit_event_count.store(0, Ordering::Relaxed);
        self.cache.clear();
        for &provider in ProviderId::ALL {
            if let Err(e) = self.store.delete(&metrics_key(provider)).await {
                tracing::warn!(provider = %provider, error = %e, "failed to delete metrics record");
            }
        }
    }

    /// Drain the buffers into the persisted per-provider aggregates.
    async fn flush(&self) {
        let requests = mem::take(&mut *self.request_buffer.lock().unwrap());
        let failovers = mem::take(&mut *self.failover_buffer.lock().unwrap());
        let events = mem::take(&mut *self.circuit_buffer.lock().unwrap());

        if requests.is_empty() && failovers.is_empty() && events.is_empty() {
            return;
        }

        let mut touched: Vec<ProviderId> = Vec::new();
        for &provider in ProviderId::ALL {
            let has_data = requests.iter().any(|m| m.provider == provider)
                || failovers.iter().any(|&p| p == provider)
                || events.iter().any(|e| e.provider == provider);
            if has_data {
                touched.push(provider);
            }
        }

        for provider in touched {
            let loaded = self.load_record(provider).await;
            // Fresh records have no prior state to protect from stale events.
            let stored_at = loaded.as_ref().map(|r| r.updated_at);
            let mut record = loaded.unwrap_or_else(|| ProviderMetricsRecord::zeroed(provider));

            let batch: Vec<&RequestMetric> =
                requests.iter().filter(|m| m.provider == provider).collect();
            if !batch.is_empty() {
                merge_batch(&mut record, &batch);
            }

            record.failover_count += failovers.iter().filter(|&&p| p == provider).count() as u64;

            // Breaker events may arrive out of order with outcomes; an event
            // older than the stored record must not clobber a newer state.
            for event in events.iter().filter(|e| e.provider == provider) {
                if stored_at.is_none_or(|at| event.timestamp >= at) {
                    record.circuit_state = event.new_state;
                    if let Some(failures) = event.failure_count {
                        record.circuit_failures = failures;
                    }
                }
            }

            record.updated_at = Utc::now();

            match serde_json::to_vec(&record) {
                Ok(bytes) => {
                    if let Err(e) = self
                        .store
                        .put(
                            &metrics_key(provider),
                            bytes,
                            PutOptions::with_ttl(METRICS_TTL),
                        )
                        .await
                    {
                        tracing::warn!(provider = %provider, error = %e, "metrics flush write failed");
                    }
                }
                Err(e) => {
                    tracing::warn!(provider = %provider, error = %e, "metrics record did not serialize");
                }
            }

            self.cache.insert(
                provider,
                CachedRecord {
                    fetched_at: Instant::now(),
                    record,
                },
            );
        }
    }

    async fn load_record(&self, provider: ProviderId) -> Option<ProviderMetricsRecord> {
        match self.store.get(&metrics_key(provider)).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(provider = %provider, error = %e, "stored metrics record corrupt, discarding");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "metrics read failed");
                self.cache.get(&provider).map(|c| c.record.clone())
            }
        }
    }
}

fn merge_batch(record: &mut ProviderMetricsRecord, batch: &[&RequestMetric]) {
    let prev_total = record.requests_total;
    let n = batch.len() as u64;
    let successes = batch.iter().filter(|m| m.success).count() as u64;

    record.requests_total += n;
    record.requests_success += successes;
    record.requests_failure += n - successes;
    record.success_rate = record.requests_success as f64 / record.requests_total as f64;
    record.error_rate = 1.0 - record.success_rate;

    let mut latencies: Vec<u64> = batch.iter().map(|m| m.latency_ms).collect();
    latencies.sort_unstable();
    let batch_min = latencies[0] as f64;
    let batch_max = latencies[latencies.len() - 1] as f64;
    let batch_sum: f64 = latencies.iter().map(|&l| l as f64).sum();

    record.latency_min_ms = if prev_total == 0 {
        batch_min
    } else {
        record.latency_min_ms.min(batch_min)
    };
    record.latency_max_ms = record.latency_max_ms.max(batch_max);
    record.latency_avg_ms =
        (record.latency_avg_ms * prev_total as f64 + batch_sum) / record.requests_total as f64;

    record.latency_p50_ms = percentile(&latencies, 0.50);
    record.latency_p95_ms = percentile(&latencies, 0.95);
    record.latency_p99_ms = percentile(&latencies, 0.99);

    record.tokens_total += batch
        .iter()
        .filter(|m| m.success)
        .filter_map(|m| m.tokens_used)
        .map(u64::from)
        .sum::<u64>();

    record.uptime_percentage = (record.requests_success as f64
        / record.requests_total.max(1) as f64
        * 100.0)
        .min(100.0);
}

// Batch-scoped percentile: rank floor(N * p), 1-based, clamped into the
// batch. Ten latencies 100..=1000 give p50 = 500 and p95 = 900.
fn percentile(sorted: &[u64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((sorted.len() as f64 * p).floor() as usize).clamp(1, sorted.len());
    sorted[rank - 1] as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;

    fn collector() -> MetricsCollector {
        MetricsCollector::new(Arc::new(MemoryKvStore::new()))
    }

    #[tokio::test]
    async fn totals_always_balance() {
        let collector = collector();
        for i in 0..7u64 {
            if i % 2 == 0 {
                collector.record_success(
                    ProviderId::OpenAi,
                    Duration::from_millis(100 + i),
                    Some(10),
                );
            } else {
                collector.record_failure(
                    ProviderId::OpenAi,
                    Duration::from_millis(100 + i),
                    "GATEWAY_ERROR",
                    "boom",
                );
            }
        }

        let record = collector
            .get_provider_metrics(ProviderId::OpenAi)
            .await
            .unwrap();
        assert_eq!(record.requests_total, 7);
        assert_eq!(
            record.requests_success + record.requests_failure,
            record.requests_total
        );
        assert!((record.success_rate + record.error_rate - 1.0).abs() < 1e-9);
        assert!(record.latency_min_ms <= record.latency_avg_ms);
        assert!(record.latency_avg_ms <= record.latency_max_ms);
    }

    #[tokio::test]
    async fn percentiles_over_one_flush_batch() {
        let collector = collector();
        for latency in (1..=10).map(|i| i * 100) {
            collector.record_success(
                ProviderId::Anthropic,
                Duration::from_millis(latency),
                Some(5),
            );
        }

        let record = collector
            .get_provider_metrics(ProviderId::Anthropic)
            .await
            .unwrap();
        assert_eq!(record.latency_p50_ms, 500.0);
        assert_eq!(record.latency_p95_ms, 900.0);
        assert_eq!(record.latency_p99_ms, 900.0);
        assert_eq!(record.latency_avg_ms, 550.0);
        assert_eq!(record.latency_min_ms, 100.0);
        assert_eq!(record.latency_max_ms, 1000.0);
        assert_eq!(record.tokens_total, 50);
    }

    #[tokio::test]
    async fn running_mean_spans_flushes() {
        let collector = collector();
        collector.record_success(ProviderId::Gemini, Duration::from_millis(100), None);
        let first = collector
            .get_provider_metrics(ProviderId::Gemini)
            .await
            .unwrap();
        assert_eq!(first.latency_avg_ms, 100.0);

        collector.record_success(ProviderId::Gemini, Duration::from_millis(300), None);
        let second = collector
            .get_provider_metrics(ProviderId::Gemini)
            .await
            .unwrap();
        assert_eq!(second.requests_total, 2);
        assert_eq!(second.latency_avg_ms, 200.0);
        // min/max stay monotone across flushes
        assert_eq!(second.latency_min_ms, 100.0);
        assert_eq!(second.latency_max_ms, 300.0);
    }

    #[tokio::test]
    async fn never_seen_provider_reads_none() {
        let collector = collector();
        collector.record_success(ProviderId::OpenAi, Duration::from_millis(50), None);
        let _ = collector.get_provider_metrics(ProviderId::OpenAi).await;
        assert!(collector
            .get_provider_metrics(ProviderId::Gemini)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn repeated_reads_are_stable() {
        let collector = collector();
        collector.record_success(ProviderId::OpenAi, Duration::from_millis(120), Some(7));
        let first = collector
            .get_provider_metrics(ProviderId::OpenAi)
            .await
            .unwrap();
        let second = collector
            .get_provider_metrics(ProviderId::OpenAi)
            .await
            .unwrap();
        assert_eq!(first.requests_total, second.requests_total);
        assert_eq!(first.latency_avg_ms, second.latency_avg_ms);
        assert_eq!(first.tokens_total, second.tokens_total);
    }

    #[tokio::test]
    async fn circuit_events_update_state_and_failures() {
        let collector = collector();
        collector.record_success(ProviderId::OpenAi, Duration::from_millis(80), None);
        let _ = collector.get_provider_metrics(ProviderId::OpenAi).await;

        collector.record_circuit_breaker_state_change(CircuitBreakerEvent {
            timestamp: Utc::now(),
            provider: ProviderId::OpenAi,
            previous_state: CircuitState::Closed,
            new_state: CircuitState::Open,
            reason: TransitionReason::FailureThreshold,
            failure_count: Some(3),
            success_count: None,
        });

        let record = collector
            .get_provider_metrics(ProviderId::OpenAi)
            .await
            .unwrap();
        assert_eq!(record.circuit_state, CircuitState::Open);
        assert_eq!(record.circuit_failures, 3);
    }

    #[tokio::test]
    async fn stale_circuit_events_do_not_clobber() {
        let collector = collector();
        collector.record_success(ProviderId::OpenAi, Duration::from_millis(80), None);
        let _ = collector.get_provider_metrics(ProviderId::OpenAi).await;

        collector.record_circuit_breaker_state_change(CircuitBreakerEvent {
            timestamp: Utc::now() - chrono::Duration::hours(1),
            provider: ProviderId::OpenAi,
            previous_state: CircuitState::Closed,
            new_state: CircuitState::Open,
            reason: TransitionReason::FailureThreshold,
            failure_count: Some(3),
            success_count: None,
        });

        let record = collector
            .get_provider_metrics(ProviderId::OpenAi)
            .await
            .unwrap();
        assert_eq!(record.circuit_state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn reset_drops_everything() {
        let collector = collector();
        collector.record_success(ProviderId::OpenAi, Duration::from_millis(80), Some(3));
        collector.record_failover(ProviderId::OpenAi);
        let _ = collector.get_provider_metrics(ProviderId::OpenAi).await;

        collector.reset().await;
        assert!(collector
            .get_provider_metrics(ProviderId::OpenAi)
            .await
            .is_none());
        let summary = collector.get_aggregated_metrics().await;
        assert_eq!(summary.requests_total, 0);
        assert_eq!(summary.success_rate, 1.0);
    }

    #[tokio::test]
    async fn summary_spans_providers() {
        let collector = collector();
        collector.record_success(ProviderId::OpenAi, Duration::from_millis(100), Some(10));
        collector.record_failure(
            ProviderId::Anthropic,
            Duration::from_millis(300),
            "GATEWAY_ERROR",
            "503",
        );
        collector.record_failover(ProviderId::Anthropic);

        let summary = collector.get_aggregated_metrics().await;
        assert_eq!(summary.requests_total, 2);
        assert_eq!(summary.requests_success, 1);
        assert_eq!(summary.requests_failure, 1);
        assert_eq!(summary.failover_count, 1);
        assert_eq!(summary.latency_avg_ms, 200.0);
        assert_eq!(summary.providers.len(), 2);
    }
}
