//! # Analytics Module
//!
//! Derives operator-facing signals from the metrics collector: minute-bucket
//! time series, anomaly detection, provider comparison with reliability
//! scoring and trends, and the three-valued health classification.
//!
//! Read-only over collector state - no external I/O beyond collector reads.
//! Time series and the anomaly ring are process-local and confined to one
//! logical writer; callers must not invoke mutating methods in parallel for
//! the same instance.
//!
//! ## Resource ceilings
//!
//! The time series retains at most 1440 points (24 hours at one-minute
//! resolution); the anomaly ring retains the most recent 100. Oldest entries
//! drop first.

use crate::circuit_breaker::CircuitState;
use crate::error::GatewayError;
use crate::metrics::{MetricsCollector, MetricsSummary};
use crate::providers::ProviderId;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

const MAX_SERIES_POINTS: usize = 1440;
const MAX_ANOMALIES: usize = 100;
const MAX_QUERY_HOURS: u32 = 168;

// Latency contribution decays linearly toward zero at this many ms.
const RELIABILITY_LATENCY_CEILING_MS: f64 = 5000.0;

/// One bucketed observation of aggregate state at minute resolution.
///
/// Counters (`requests`, `failovers`, `circuit_events`) are deltas since the
/// previous sample; rates and latency are the live cumulative values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub requests: u64,
    pub success_rate: f64,
    pub latency_avg_ms: f64,
    pub failovers: u64,
    pub circuit_events: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub providers: Option<HashMap<ProviderId, ProviderPoint>>,
}

/// Per-provider slice of a time-series point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPoint {
    pub requests: u64,
    pub success_rate: f64,
    pub latency_avg_ms: f64,
}

/// Anomaly categories the detector recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    SuccessRateDrop,
    LatencySpike,
    FailoverIncrease,
    CircuitOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// One detected anomaly, kept in a bounded ring of the most recent 100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub timestamp: DateTime<Utc>,
    pub kind: AnomalyKind,
    pub severity: AnomalySeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
    pub expected_value: f64,
    pub actual_value: f64,
    pub description: String,
}

/// Per-provider comparison row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderComparison {
    pub provider: ProviderId,
    pub success_rate: f64,
    pub average_latency_ms: f64,
    /// Share of total traffic handled by this provider (0.0 to 1.0)
    pub request_share: f64,
    /// Synthetic 0-100 score combining success rate and latency
    pub reliability: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Degrading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub provider: ProviderId,
    pub status: HealthLevel,
    pub success_rate: f64,
    pub circuit_state: CircuitState,
}

/// Health payload for the observability surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall: HealthLevel,
    pub providers: Vec<ProviderHealth>,
    /// Always carries at least one hint
    pub recommendations: Vec<String>,
    pub message: String,
}

/// Query echoed back in an analytics report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsQuery {
    pub hours: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
}

/// Full analytics payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub query: AnalyticsQuery,
    pub summary: MetricsSummary,
    pub time_series: Vec<TimeSeriesPoint>,
    pub provider_stats: Vec<ProviderComparison>,
    pub anomalies: Vec<Anomaly>,
    /// Mean seconds between failures over the sampled window; 0 with no failures
    pub mtbf_seconds: f64,
}

struct SampleTotals {
    requests: u64,
    failovers: u64,
    circuit_events: u64,
}

struct AnalyticsState {
    series: BTreeMap<i64, TimeSeriesPoint>,
    anomalies: VecDeque<Anomaly>,
    last_totals: Option<SampleTotals>,
}

/// Analytics over a shared [`MetricsCollector`].
pub struct AnalyticsService {
    collector: Arc<MetricsCollector>,
    state: Mutex<AnalyticsState>,
}

impl AnalyticsService {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self {
            collector,
            state: Mutex::new(AnalyticsState {
                series: BTreeMap::new(),
                anomalies: VecDeque::new(),
                last_totals: None,
            }),
        }
    }

    /// Live aggregated metrics, unmodified.
    pub async fn get_summary(&self) -> MetricsSummary {
        self.collector.get_aggregated_metrics().await
    }

    /// Time series for the requested window, sampling the live summary first.
    pub async fn get_time_series(
        &self,
        hours: u32,
        provider: Option<ProviderId>,
    ) -> Result<Vec<TimeSeriesPoint>, GatewayError> {
        validate_hours(hours)?;
        let summary = self.collector.get_aggregated_metrics().await;
        self.sample(&summary);
        Ok(self.window(hours, provider))
    }

    /// Full analytics payload for the requested window.
    pub async fn get_analytics(
        &self,
        hours: u32,
        provider: Option<ProviderId>,
    ) -> Result<AnalyticsReport, GatewayError> {
        validate_hours(hours)?;
        let summary = self.collector.get_aggregated_metrics().await;
        self.sample(&summary);

        let time_series = self.window(hours, provider);
        let provider_stats = self.comparison_from(&summary);
        let anomalies = self.scan_for_anomalies(&summary);

        let mtbf_seconds = if summary.requests_failure == 0 {
            0.0
        } else {
            (time_series.len() as f64 * 60.0) / summary.requests_failure as f64
        };

        Ok(AnalyticsReport {
            query: AnalyticsQuery { hours, provider },
            summary,
            time_series,
            provider_stats,
            anomalies,
            mtbf_seconds,
        })
    }

    /// Per-provider comparison over the live summary.
    pub async fn get_provider_comparison(&self) -> Vec<ProviderComparison> {
        let summary = self.collector.get_aggregated_metrics().await;
        self.sample(&summary);
        self.comparison_from(&summary)
    }

    /// Run the anomaly rules against the current window and return anything
    /// found (also appended to the internal ring).
    pub async fn detect_anomalies(&self) -> Vec<Anomaly> {
        let summary = self.collector.get_aggregated_metrics().await;
        self.sample(&summary);
        self.scan_for_anomalies(&summary)
    }

    /// Health classification for the observability surface.
    pub async fn get_health_status(&self) -> HealthReport {
        let summary = self.collector.get_aggregated_metrics().await;

        let providers: Vec<ProviderHealth> = summary
            .providers
            .iter()
            .map(|record| ProviderHealth {
                provider: record.provider,
                status: classify_provider(record.success_rate, record.circuit_state),
                success_rate: record.success_rate,
                circuit_state: record.circuit_state,
            })
            .collect();

        let overall = providers
            .iter()
            .map(|p| p.status)
            .max_by_key(|status| match status {
                HealthLevel::Healthy => 0,
                HealthLevel::Degraded => 1,
                HealthLevel::Unhealthy => 2,
            })
            .unwrap_or(HealthLevel::Healthy);

        let mut recommendations = Vec::new();
        for p in &providers {
            match p.status {
                HealthLevel::Unhealthy if p.circuit_state == CircuitState::Open => {
                    recommendations.push(format!(
                        "Circuit for {} is open; traffic is failing over until it recovers",
                        p.provider
                    ));
                }
                HealthLevel::Unhealthy => {
                    recommendations.push(format!(
                        "Success rate for {} is {:.0}%; investigate the upstream",
                        p.provider,
                        p.success_rate * 100.0
                    ));
                }
                HealthLevel::Degraded => {
                    recommendations.push(format!(
                        "{} is degraded; watch its error rate and latency",
                        p.provider
                    ));
                }
                HealthLevel::Healthy => {}
            }
        }
        if recommendations.is_empty() {
            recommendations.push("All systems operating normally".to_string());
        }

        let message = match overall {
            HealthLevel::Healthy => "all providers healthy".to_string(),
            HealthLevel::Degraded => "one or more providers degraded".to_string(),
            HealthLevel::Unhealthy => "one or more providers unhealthy".to_string(),
        };

        HealthReport {
            overall,
            providers,
            recommendations,
            message,
        }
    }

    /// Append the current summary to the minute-bucketed series.
    fn sample(&self, summary: &MetricsSummary) {
        let mut state = self.state.lock().unwrap();

        let (requests_delta, failovers_delta, events_delta) = match &state.last_totals {
            Some(last) => (
                summary.requests_total.saturating_sub(last.requests),
                summary.failover_count.saturating_sub(last.failovers),
                summary.circuit_events.saturating_sub(last.circuit_events),
            ),
            None => (
                summary.requests_total,
                summary.failover_count,
                summary.circuit_events,
            ),
        };
        state.last_totals = Some(SampleTotals {
            requests: summary.requests_total,
            failovers: summary.failover_count,
            circuit_events: summary.circuit_events,
        });

        let providers = if summary.providers.is_empty() {
            None
        } else {
            Some(
                summary
                    .providers
                    .iter()
                    .map(|record| {
                        (
                            record.provider,
                            ProviderPoint {
                                requests: record.requests_total,
                                success_rate: record.success_rate,
                                latency_avg_ms: record.latency_avg_ms,
                            },
                        )
                    })
                    .collect(),
            )
        };

        let now = Utc::now();
        let bucket = now.timestamp() / 60 * 60;
        let point = TimeSeriesPoint {
            timestamp: Utc.timestamp_opt(bucket, 0).unwrap(),
            requests: requests_delta,
            success_rate: summary.success_rate,
            latency_avg_ms: summary.latency_avg_ms,
            failovers: failovers_delta,
            circuit_events: events_delta,
            providers,
        };

        // Later samples in the same minute fold their deltas into the bucket.
        state
            .series
            .entry(bucket)
            .and_modify(|existing| {
                existing.requests += point.requests;
                existing.failovers += point.failovers;
                existing.circuit_events += point.circuit_events;
                existing.success_rate = point.success_rate;
                existing.latency_avg_ms = point.latency_avg_ms;
                existing.providers = point.providers.clone();
            })
            .or_insert(point);

        while state.series.len() > MAX_SERIES_POINTS {
            let oldest = *state.series.keys().next().unwrap();
            state.series.remove(&oldest);
        }
    }

    fn window(&self, hours: u32, provider: Option<ProviderId>) -> Vec<TimeSeriesPoint> {
        let state = self.state.lock().unwrap();
        let cutoff = Utc::now() - ChronoDuration::hours(i64::from(hours));

        state
            .series
            .values()
            .filter(|point| point.timestamp >= cutoff)
            .filter(|point| match provider {
                Some(id) => point
                    .providers
                    .as_ref()
                    .is_some_and(|map| map.contains_key(&id)),
                None => true,
            })
            .cloned()
            .collect()
    }

    fn comparison_from(&self, summary: &MetricsSummary) -> Vec<ProviderComparison> {
        summary
            .providers
            .iter()
            .map(|record| {
                let request_share = if summary.requests_total > 0 {
                    record.requests_total as f64 / summary.requests_total as f64
                } else {
                    0.0
                };
                ProviderComparison {
                    provider: record.provider,
                    success_rate: record.success_rate,
                    average_latency_ms: record.latency_avg_ms,
                    request_share,
                    reliability: reliability_score(record.success_rate, record.latency_avg_ms),
                    trend: self.trend_for(record.provider),
                }
            })
            .collect()
    }

    /// Current-hour success rate against the 24-hour baseline.
    fn trend_for(&self, provider: ProviderId) -> Trend {
        let state = self.state.lock().unwrap();
        let now = Utc::now();
        let hour_ago = now - ChronoDuration::hours(1);

        let mut recent = Vec::new();
        let mut baseline = Vec::new();
        for point in state.series.values() {
            if let Some(rate) = point
                .providers
                .as_ref()
                .and_then(|map| map.get(&provider))
                .map(|p| p.success_rate)
            {
                baseline.push(rate);
                if point.timestamp >= hour_ago {
                    recent.push(rate);
                }
            }
        }

        classify_trend(mean(&recent), mean(&baseline))
    }

    fn scan_for_anomalies(&self, summary: &MetricsSummary) -> Vec<Anomaly> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let mut found = baseline_anomalies(&state.series, now);

        for record in &summary.providers {
            if record.circuit_state == CircuitState::Open {
                found.push(Anomaly {
                    timestamp: now,
                    kind: AnomalyKind::CircuitOpen,
                    severity: AnomalySeverity::Critical,
                    provider: Some(record.provider),
                    expected_value: 0.0,
                    actual_value: 1.0,
                    description: format!("circuit for {} is open", record.provider),
                });
            }
        }

        for anomaly in &found {
            state.anomalies.push_back(anomaly.clone());
            while state.anomalies.len() > MAX_ANOMALIES {
                state.anomalies.pop_front();
            }
        }

        found
    }

    /// Most recent anomalies, oldest first.
    pub fn recent_anomalies(&self) -> Vec<Anomaly> {
        self.state.lock().unwrap().anomalies.iter().cloned().collect()
    }

    #[cfg(test)]
    fn series_len(&self) -> usize {
        self.state.lock().unwrap().series.len()
    }

    #[cfg(test)]
    fn insert_point(&self, bucket: i64, point: TimeSeriesPoint) {
        let mut state = self.state.lock().unwrap();
        state.series.insert(bucket, point);
        while state.series.len() > MAX_SERIES_POINTS {
            let oldest = *state.series.keys().next().unwrap();
            state.series.remove(&oldest);
        }
    }
}

/// Compare the latest point against the mean of everything before it.
fn baseline_anomalies(
    series: &BTreeMap<i64, TimeSeriesPoint>,
    now: DateTime<Utc>,
) -> Vec<Anomaly> {
    let mut found = Vec::new();
    let points: Vec<&TimeSeriesPoint> = series.values().collect();
    let Some((current, history)) = points.split_last() else {
        return found;
    };
    if history.is_empty() {
        return found;
    }

    let base_rate = mean(&history.iter().map(|p| p.success_rate).collect::<Vec<_>>());
    let base_latency = mean(&history.iter().map(|p| p.latency_avg_ms).collect::<Vec<_>>());
    let base_failovers = mean(&history.iter().map(|p| p.failovers as f64).collect::<Vec<_>>());

    if base_rate > 0.0 && current.success_rate < 0.90 * base_rate {
        found.push(Anomaly {
            timestamp: now,
            kind: AnomalyKind::SuccessRateDrop,
            severity: if current.success_rate < 0.5 {
                AnomalySeverity::High
            } else {
                AnomalySeverity::Medium
            },
            provider: None,
            expected_value: base_rate,
            actual_value: current.success_rate,
            description: format!(
                "success rate {:.1}% fell below 90% of the {:.1}% baseline",
                current.success_rate * 100.0,
                base_rate * 100.0
            ),
        });
    }

    if base_latency > 0.0 && current.latency_avg_ms > 1.5 * base_latency {
        found.push(Anomaly {
            timestamp: now,
            kind: AnomalyKind::LatencySpike,
            severity: if current.latency_avg_ms > 3.0 * base_latency {
                AnomalySeverity::High
            } else {
                AnomalySeverity::Medium
            },
            provider: None,
            expected_value: base_latency,
            actual_value: current.latency_avg_ms,
            description: format!(
                "average latency {:.0}ms exceeds 1.5x the {:.0}ms baseline",
                current.latency_avg_ms, base_latency
            ),
        });
    }

    if base_failovers > 0.0 && current.failovers as f64 > 2.0 * base_failovers {
        found.push(Anomaly {
            timestamp: now,
            kind: AnomalyKind::FailoverIncrease,
            severity: AnomalySeverity::Medium,
            provider: None,
            expected_value: base_failovers,
            actual_value: current.failovers as f64,
            description: format!(
                "failovers {} exceed 2x the {:.1} baseline",
                current.failovers, base_failovers
            ),
        });
    }

    found
}

fn validate_hours(hours: u32) -> Result<(), GatewayError> {
    if hours == 0 || hours > MAX_QUERY_HOURS {
        return Err(GatewayError::InvalidConfig {
            message: format!("hours must be between 1 and {MAX_QUERY_HOURS}, got {hours}"),
        });
    }
    Ok(())
}

/// Synthetic 0-100 score: success rate weighted 80, latency weighted 20
/// with the latency contribution decaying linearly toward zero at 5 s.
pub fn reliability_score(success_rate: f64, avg_latency_ms: f64) -> f64 {
    let latency_factor = 1.0 - (avg_latency_ms / RELIABILITY_LATENCY_CEILING_MS).clamp(0.0, 1.0);
    (success_rate * 80.0 + latency_factor * 20.0).clamp(0.0, 100.0)
}

fn classify_trend(current: f64, baseline: f64) -> Trend {
    if baseline <= 0.0 {
        return Trend::Stable;
    }
    let change_percent = (current - baseline) / baseline * 100.0;
    if change_percent > 1.0 {
        Trend::Improving
    } else if change_percent < -1.0 {
        Trend::Degrading
    } else {
        Trend::Stable
    }
}

fn classify_provider(success_rate: f64, circuit_state: CircuitState) -> HealthLevel {
    if success_rate < 0.80 || circuit_state == CircuitState::Open {
        HealthLevel::Unhealthy
    } else if success_rate >= 0.95 && circuit_state == CircuitState::Closed {
        HealthLevel::Healthy
    } else {
        HealthLevel::Degraded
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;
    use std::time::Duration;

    fn service() -> (AnalyticsService, Arc<MetricsCollector>) {
        let collector = Arc::new(MetricsCollector::new(Arc::new(MemoryKvStore::new())));
        (AnalyticsService::new(collector.clone()), collector)
    }

    fn point(success_rate: f64, latency: f64, failovers: u64) -> TimeSeriesPoint {
        TimeSeriesPoint {
            timestamp: Utc::now(),
            requests: 10,
            success_rate,
            latency_avg_ms: latency,
            failovers,
            circuit_events: 0,
            providers: None,
        }
    }

    #[test]
    fn reliability_stays_bounded() {
        assert_eq!(reliability_score(1.0, 0.0), 100.0);
        assert_eq!(reliability_score(0.0, 10_000.0), 0.0);
        assert_eq!(reliability_score(1.0, 2500.0), 90.0);
        for &(rate, latency) in &[(0.5, 100.0), (1.0, 4999.0), (0.99, 50_000.0), (0.0, 0.0)] {
            let score = reliability_score(rate, latency);
            assert!((0.0..=100.0).contains(&score), "score {score} out of range");
        }
    }

    #[test]
    fn trend_thresholds_are_one_percent() {
        assert_eq!(classify_trend(0.97, 0.95), Trend::Improving);
        assert_eq!(classify_trend(0.93, 0.95), Trend::Degrading);
        assert_eq!(classify_trend(0.955, 0.95), Trend::Stable);
        assert_eq!(classify_trend(0.5, 0.0), Trend::Stable);
    }

    #[test]
    fn health_classification_edges() {
        assert_eq!(
            classify_provider(0.95, CircuitState::Closed),
            HealthLevel::Healthy
        );
        assert_eq!(
            classify_provider(0.95, CircuitState::HalfOpen),
            HealthLevel::Degraded
        );
        assert_eq!(
            classify_provider(0.90, CircuitState::Closed),
            HealthLevel::Degraded
        );
        assert_eq!(
            classify_provider(0.79, CircuitState::Closed),
            HealthLevel::Unhealthy
        );
        assert_eq!(
            classify_provider(1.0, CircuitState::Open),
            HealthLevel::Unhealthy
        );
    }

    #[tokio::test]
    async fn hours_range_is_enforced() {
        let (service, _) = service();
        assert!(service.get_analytics(0, None).await.is_err());
        assert!(service.get_analytics(169, None).await.is_err());
        assert!(service.get_analytics(1, None).await.is_ok());
        assert!(service.get_analytics(168, None).await.is_ok());
    }

    #[tokio::test]
    async fn series_ring_never_exceeds_capacity() {
        let (service, _) = service();
        for i in 0..(MAX_SERIES_POINTS as i64 + 100) {
            service.insert_point(i * 60, point(1.0, 100.0, 0));
        }
        assert_eq!(service.series_len(), MAX_SERIES_POINTS);
    }

    #[tokio::test]
    async fn anomaly_ring_never_exceeds_capacity() {
        let (service, collector) = service();
        // A permanently open circuit produces one critical anomaly per scan.
        collector.record_circuit_breaker_state_change(crate::metrics::CircuitBreakerEvent {
            timestamp: Utc::now(),
            provider: ProviderId::OpenAi,
            previous_state: CircuitState::Closed,
            new_state: CircuitState::Open,
            reason: crate::metrics::TransitionReason::FailureThreshold,
            failure_count: Some(3),
            success_count: None,
        });
        collector.record_failure(
            ProviderId::OpenAi,
            Duration::from_millis(10),
            "GATEWAY_ERROR",
            "500",
        );

        for _ in 0..(MAX_ANOMALIES + 20) {
            let _ = service.detect_anomalies().await;
        }
        assert!(service.recent_anomalies().len() <= MAX_ANOMALIES);
    }

    #[tokio::test]
    async fn open_circuit_is_a_critical_anomaly() {
        let (service, collector) = service();
        collector.record_circuit_breaker_state_change(crate::metrics::CircuitBreakerEvent {
            timestamp: Utc::now(),
            provider: ProviderId::Anthropic,
            previous_state: CircuitState::Closed,
            new_state: CircuitState::Open,
            reason: crate::metrics::TransitionReason::FailureThreshold,
            failure_count: Some(3),
            success_count: None,
        });
        collector.record_failure(
            ProviderId::Anthropic,
            Duration::from_millis(10),
            "GATEWAY_ERROR",
            "500",
        );

        let anomalies = service.detect_anomalies().await;
        assert!(anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::CircuitOpen
                && a.severity == AnomalySeverity::Critical
                && a.provider == Some(ProviderId::Anthropic)));
    }

    #[tokio::test]
    async fn mtbf_is_zero_without_failures() {
        let (service, collector) = service();
        collector.record_success(ProviderId::OpenAi, Duration::from_millis(100), Some(5));
        let report = service.get_analytics(24, None).await.unwrap();
        assert_eq!(report.mtbf_seconds, 0.0);
    }

    #[tokio::test]
    async fn health_report_always_carries_a_hint() {
        let (service, collector) = service();
        let clean = service.get_health_status().await;
        assert_eq!(clean.overall, HealthLevel::Healthy);
        assert_eq!(
            clean.recommendations,
            vec!["All systems operating normally".to_string()]
        );

        for _ in 0..4 {
            collector.record_failure(
                ProviderId::Gemini,
                Duration::from_millis(50),
                "GATEWAY_ERROR",
                "503",
            );
        }
        collector.record_success(ProviderId::Gemini, Duration::from_millis(50), None);

        let report = service.get_health_status().await;
        assert_eq!(report.overall, HealthLevel::Unhealthy);
        assert!(!report.recommendations.is_empty());
    }

    #[tokio::test]
    async fn comparison_reports_share_and_reliability() {
        let (service, collector) = service();
        for _ in 0..3 {
            collector.record_success(ProviderId::OpenAi, Duration::from_millis(100), Some(5));
        }
        collector.record_success(ProviderId::Anthropic, Duration::from_millis(200), Some(5));

        let comparison = service.get_provider_comparison().await;
        let openai = comparison
            .iter()
            .find(|c| c.provider == ProviderId::OpenAi)
            .unwrap();
        assert!((openai.request_share - 0.75).abs() < 1e-9);
        assert!(openai.reliability > 90.0);
    }
}
