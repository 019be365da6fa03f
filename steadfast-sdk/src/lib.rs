//! # Steadfast SDK
//!
//! Core library for the Steadfast AI gateway: a resilient request-routing
//! layer that accepts chat-completion requests in one unified format and
//! dispatches them across an ordered chain of upstream AI providers.
//!
//! ## Features
//!
//! - **Unified Contract**: one canonical request/response schema regardless
//!   of which upstream served the call
//! - **Provider Adapters**: per-provider wire-format translation for
//!   OpenAI-shaped, Anthropic-shaped and Gemini-shaped upstreams
//! - **Circuit Breakers**: per-provider state machines with persistent
//!   state, guarding each upstream against cascading failure
//! - **Automatic Failover**: the fallback orchestrator walks the chain until
//!   one provider succeeds or all are exhausted
//! - **Metrics & Analytics**: every request outcome is recorded, aggregated
//!   with latency percentiles, and distilled into time series, anomalies
//!   and health classifications
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use steadfast_sdk::kv::MemoryKvStore;
//! use steadfast_sdk::metrics::MetricsCollector;
//! use steadfast_sdk::orchestrator::FallbackOrchestrator;
//! use steadfast_sdk::providers::{AdapterConfig, ProviderId};
//! use steadfast_sdk::{ChatRequest, Message};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), steadfast_sdk::GatewayError> {
//! let store = Arc::new(MemoryKvStore::new());
//! let collector = Arc::new(MetricsCollector::new(store.clone()));
//!
//! let config = AdapterConfig {
//!     host: "https://gateway.ai.cloudflare.com".to_string(),
//!     account_id: "my-account".to_string(),
//!     gateway_id: "my-gateway".to_string(),
//!     api_token: "secret".to_string(),
//!     default_model: "gpt-4o".to_string(),
//!     timeout: Duration::from_secs(30),
//!     extra_headers: HashMap::new(),
//! };
//!
//! let orchestrator = FallbackOrchestrator::builder()
//!     .chain(vec![ProviderId::OpenAi, ProviderId::Anthropic])
//!     .provider(ProviderId::OpenAi, config.clone())
//!     .provider(ProviderId::Anthropic, AdapterConfig {
//!         api_token: "other-secret".to_string(),
//!         default_model: "claude-3-5-sonnet-20241022".to_string(),
//!         ..config
//!     })
//!     .store(store)
//!     .collector(collector)
//!     .build()?;
//!
//! let request = ChatRequest {
//!     model: "gpt-4o".to_string(),
//!     messages: vec![Message::user("Hello!")],
//!     ..Default::default()
//! };
//! let response = orchestrator
//!     .chat_completion(request, CancellationToken::new())
//!     .await?;
//! println!("{}", response.choices[0].message.content);
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure Semantics
//!
//! Callers observe exactly one of: a canonical response,
//! `ALL_PROVIDERS_FAILED`, `CANCELLED`, or a fatal configuration error.
//! Circuit breaker state never leaks to callers except through the
//! observability surfaces.

pub mod analytics;
pub mod circuit_breaker;
pub mod error;
pub mod kv;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod providers;

pub use analytics::{AnalyticsReport, AnalyticsService, HealthLevel, HealthReport};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitRecord, CircuitState};
pub use error::GatewayError;
pub use kv::{KvError, KvStore, MemoryKvStore, PutOptions};
pub use metrics::{MetricsCollector, MetricsSummary, ProviderMetricsRecord};
pub use models::{ChatRequest, ChatResponse, Choice, FinishReason, Message, Role, Usage};
pub use orchestrator::FallbackOrchestrator;
pub use providers::{AdapterConfig, ProviderAdapter, ProviderId};

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors_set_roles() {
        let user_msg = Message::user("Hello, world!");
        assert_eq!(user_msg.role, Role::User);
        assert_eq!(user_msg.content, "Hello, world!");

        let assistant_msg = Message::assistant("Hi there!");
        assert_eq!(assistant_msg.role, Role::Assistant);

        let system_msg = Message::system("You are a helpful assistant.");
        assert_eq!(system_msg.role, Role::System);
    }

    #[test]
    fn chat_request_default_is_empty() {
        let request = ChatRequest::default();
        assert_eq!(request.model, "");
        assert_eq!(request.messages.len(), 0);
        assert_eq!(request.temperature, None);
        assert_eq!(request.max_tokens, None);
    }

    #[test]
    fn breaker_config_defaults_match_the_contract() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.success_threshold, 2);
        assert_eq!(config.open_timeout.as_secs(), 60);
        assert_eq!(config.half_open_max_calls, 1);
    }
}
