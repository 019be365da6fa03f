//! # HTTP Request Handlers
//!
//! Handlers for the gateway's inbound surface:
//!
//! - `POST /v1/chat/completions` - the completion API, served through the
//!   fallback orchestrator
//! - `GET /metrics[?provider=]` - aggregated metrics, JSON
//! - `GET /metrics/prometheus` - Prometheus text rendering of the summary
//! - `GET /analytics?hours=1..168[&provider=]` - time series, comparison,
//!   anomalies
//! - `GET /health` - health classification; 503 when unhealthy
//! - `POST /admin/circuit-breakers/{provider}/reset` - manual breaker reset
//!
//! Errors carry their stable code in a JSON body so callers and operators
//! can tell a chain exhaustion (`ALL_PROVIDERS_FAILED`, 502) from a
//! configuration fault (500) or a caller cancellation (408).

use crate::server::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;
use steadfast_sdk::analytics::HealthLevel;
use steadfast_sdk::models::{ChatRequest, ChatResponse};
use steadfast_sdk::providers::ProviderId;
use steadfast_sdk::GatewayError;
use tokio_util::sync::CancellationToken;

/// Gateway error with its HTTP mapping.
pub struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GatewayError::AllProvidersFailed { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            GatewayError::InvalidConfig { .. }
            | GatewayError::MissingConfig { .. }
            | GatewayError::ProviderNotConfigured { .. }
            | GatewayError::UnsupportedProvider { .. }
            | GatewayError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        };
        let body = json!({
            "error": {
                "code": self.0.error_code(),
                "message": self.0.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": {"code": "NOT_FOUND", "message": message}})),
    )
        .into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": {"code": "BAD_REQUEST", "message": message}})),
    )
        .into_response()
}

pub async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let cancel = CancellationToken::new();
    let response = state.orchestrator.chat_completion(request, cancel).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct MetricsParams {
    provider: Option<String>,
}

pub async fn metrics(
    State(state): State<AppState>,
    Query(params): Query<MetricsParams>,
) -> Response {
    match params.provider {
        Some(name) => {
            let Ok(provider) = name.parse::<ProviderId>() else {
                return not_found(&format!("unknown provider: {name}"));
            };
            match state.collector.get_provider_metrics(provider).await {
                Some(record) => Json(record).into_response(),
                None => not_found(&format!("no metrics recorded for {provider}")),
            }
        }
        None => Json(state.collector.get_aggregated_metrics().await).into_response(),
    }
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    let summary = state.collector.get_aggregated_metrics().await;

    let mut out = String::new();
    out.push_str(&format!(
        "gateway_requests_total {}\n",
        summary.requests_total
    ));
    out.push_str(&format!(
        "gateway_requests_successful {}\n",
        summary.requests_success
    ));
    out.push_str(&format!(
        "gateway_requests_failed {}\n",
        summary.requests_failure
    ));
    out.push_str(&format!("gateway_success_rate {}\n", summary.success_rate));
    out.push_str(&format!(
        "gateway_average_latency_ms {}\n",
        summary.latency_avg_ms
    ));
    out.push_str(&format!(
        "gateway_failovers_total {}\n",
        summary.failover_count
    ));

    for record in &summary.providers {
        out.push_str(&format!(
            "gateway_provider_requests_total{{provider=\"{}\"}} {}\n",
            record.provider, record.requests_total
        ));
        out.push_str(&format!(
            "gateway_provider_success_rate{{provider=\"{}\"}} {}\n",
            record.provider, record.success_rate
        ));
        out.push_str(&format!(
            "gateway_provider_latency_ms{{provider=\"{}\"}} {}\n",
            record.provider, record.latency_avg_ms
        ));
    }

    (StatusCode::OK, out).into_response()
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsParams {
    hours: Option<u32>,
    provider: Option<String>,
}

pub async fn analytics(
    State(state): State<AppState>,
    Query(params): Query<AnalyticsParams>,
) -> Response {
    let hours = params.hours.unwrap_or(24);

    let provider = match params.provider {
        Some(name) => match name.parse::<ProviderId>() {
            Ok(provider) => Some(provider),
            Err(_) => return bad_request(&format!("unknown provider: {name}")),
        },
        None => None,
    };

    match state.analytics.get_analytics(hours, provider).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => bad_request(&e.to_string()),
    }
}

pub async fn health(State(state): State<AppState>) -> Response {
    let report = state.analytics.get_health_status().await;
    let status = match report.overall {
        HealthLevel::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthLevel::Healthy | HealthLevel::Degraded => StatusCode::OK,
    };
    (status, Json(report)).into_response()
}

pub async fn reset_circuit_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    let Ok(provider) = name.parse::<ProviderId>() else {
        return not_found(&format!("unknown provider: {name}"));
    };
    let Some(breaker) = state.orchestrator.breaker(provider) else {
        return not_found(&format!("{provider} is not part of the chain"));
    };

    breaker.reset().await;
    tracing::info!(provider = %provider, "circuit breaker reset via admin endpoint");
    Json(json!({"provider": provider, "status": "reset"})).into_response()
}
