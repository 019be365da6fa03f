//! # Error Handling Module
//!
//! Standardized error types for the Steadfast SDK. Every failure the gateway
//! can surface carries a stable string code used for metric labeling and for
//! the fallback chain's retry decision.
//!
//! ## Error Categories
//!
//! - **Retriable within the chain**: circuit rejections, upstream HTTP
//!   failures, malformed upstream bodies, transport errors. The orchestrator
//!   recovers these and advances to the next provider.
//! - **Fatal**: configuration mistakes (unsupported provider, missing
//!   account/gateway/token bindings). These indicate operator error and are
//!   surfaced immediately.
//! - **Terminal**: `AllProvidersFailed` once the chain is exhausted, and
//!   `Cancelled` when the caller abandons the request mid-chain.

use crate::providers::ProviderId;
use thiserror::Error;

/// Errors produced by the gateway core.
///
/// Callers of the orchestrator observe exactly one of: a canonical response,
/// `AllProvidersFailed`, `Cancelled`, or a fatal configuration error.
/// Everything else is consumed by the fallback chain.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Circuit breaker rejected the call without reaching the upstream
    #[error("circuit breaker open for provider {provider}")]
    CircuitOpen { provider: ProviderId },

    /// Upstream answered with a non-2xx status
    #[error("upstream {provider} returned {status}: {body}")]
    Upstream {
        provider: ProviderId,
        status: u16,
        body: String,
    },

    /// Upstream body could not be parsed, or normalized to zero choices
    #[error("invalid response from {provider}: {reason}")]
    InvalidResponse {
        provider: ProviderId,
        reason: String,
    },

    /// Transport-level failure talking to the upstream (connect, TLS, timeout)
    #[error("transport error calling {provider}: {source}")]
    Transport {
        provider: ProviderId,
        #[source]
        source: reqwest::Error,
    },

    /// A provider identifier the adapter layer does not know
    #[error("unsupported provider: {name}")]
    UnsupportedProvider { name: String },

    /// Configuration value present but invalid
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A chain entry references a provider with no configured adapter
    #[error("provider {provider} is in the chain but not configured")]
    ProviderNotConfigured { provider: ProviderId },

    /// Every provider in the chain failed or was skipped
    #[error("all providers failed (attempted: {})", format_attempted(.attempted))]
    AllProvidersFailed { attempted: Vec<ProviderId> },

    /// Required environment or config binding absent
    #[error("missing configuration: {name}")]
    MissingConfig { name: String },

    /// The caller cancelled the request
    #[error("request cancelled by caller")]
    Cancelled,

    /// Key-value backend failure on a read surface
    #[error("storage error: {message}")]
    Storage { message: String },
}

fn format_attempted(attempted: &[ProviderId]) -> String {
    attempted
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl GatewayError {
    /// Stable code for propagation and metric labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            GatewayError::Upstream { .. } => "GATEWAY_ERROR",
            GatewayError::InvalidResponse { .. } => "INVALID_RESPONSE",
            GatewayError::Transport { .. } => "GATEWAY_CLIENT_ERROR",
            GatewayError::UnsupportedProvider { .. } => "UNSUPPORTED_PROVIDER",
            GatewayError::InvalidConfig { .. } => "INVALID_CONFIG",
            GatewayError::ProviderNotConfigured { .. } => "PROVIDER_NOT_CONFIGURED",
            GatewayError::AllProvidersFailed { .. } => "ALL_PROVIDERS_FAILED",
            GatewayError::MissingConfig { .. } => "MISSING_CONFIG",
            GatewayError::Cancelled => "CANCELLED",
            GatewayError::Storage { .. } => "STORAGE_ERROR",
        }
    }

    /// Whether the fallback chain may advance past this error.
    ///
    /// Non-retriable errors indicate operator error, not transient failure,
    /// and are surfaced to the caller immediately.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            GatewayError::CircuitOpen { .. }
                | GatewayError::Upstream { .. }
                | GatewayError::InvalidResponse { .. }
                | GatewayError::Transport { .. }
        )
    }
}
