//! # Fallback Orchestration Module
//!
//! Drives the configured provider chain: each request walks the chain in
//! order, honoring circuit breakers, until one provider succeeds or the
//! chain is exhausted.
//!
//! ## Admission
//!
//! Providers whose breaker is OPEN are skipped - unless every breaker is
//! OPEN, in which case nothing is skipped so a provider-wide outage still
//! gets one recovery attempt per provider and breakers can move to
//! HALF_OPEN instead of fast-failing forever.
//!
//! ## Breaker configuration asymmetry
//!
//! The first provider in the chain uses the caller-supplied breaker
//! configuration; every fallback uses the defaults. An aggressive primary
//! configuration therefore cannot cascade fast-open into the backup chain.
//!
//! ## Outcome contract
//!
//! Callers observe exactly one of: a canonical response,
//! `ALL_PROVIDERS_FAILED` with the ordered list of attempted providers,
//! `CANCELLED` when the caller abandoned the request, or a fatal
//! configuration error. Per-provider errors are logged and recorded as
//! metrics, never aggregated into the surfaced error.

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState};
use crate::error::GatewayError;
use crate::kv::KvStore;
use crate::metrics::MetricsCollector;
use crate::models::{ChatRequest, ChatResponse};
use crate::providers::{AdapterConfig, ProviderAdapter, ProviderId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Orchestrator over an ordered provider chain.
pub struct FallbackOrchestrator {
    chain: Vec<ProviderId>,
    adapters: HashMap<ProviderId, ProviderAdapter>,
    breakers: HashMap<ProviderId, Arc<CircuitBreaker>>,
    model_overrides: HashMap<ProviderId, String>,
    collector: Arc<MetricsCollector>,
}

impl std::fmt::Debug for FallbackOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackOrchestrator")
            .field("chain", &self.chain)
            .field("model_overrides", &self.model_overrides)
            .finish_non_exhaustive()
    }
}

/// Builder for [`FallbackOrchestrator`].
pub struct FallbackOrchestratorBuilder {
    chain: Vec<ProviderId>,
    adapter_configs: HashMap<ProviderId, AdapterConfig>,
    model_overrides: HashMap<ProviderId, String>,
    primary_breaker_config: CircuitBreakerConfig,
    store: Option<Arc<dyn KvStore>>,
    collector: Option<Arc<MetricsCollector>>,
}

impl FallbackOrchestrator {
    pub fn builder() -> FallbackOrchestratorBuilder {
        FallbackOrchestratorBuilder {
            chain: Vec::new(),
            adapter_configs: HashMap::new(),
            model_overrides: HashMap::new(),
            primary_breaker_config: CircuitBreakerConfig::default(),
            store: None,
            collector: None,
        }
    }

    /// Walk the chain until one provider succeeds.
    pub async fn chat_completion(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, GatewayError> {
        let mut states = Vec::with_capacity(self.chain.len());
        for provider in &self.chain {
            states.push(self.breakers[provider].get_state().await.state);
        }
        let all_open = states.iter().all(|&s| s == CircuitState::Open);

        let mut attempted = Vec::new();
        for (i, &provider) in self.chain.iter().enumerate() {
            if states[i] == CircuitState::Open && !all_open {
                tracing::debug!(provider = %provider, "skipping provider with open circuit");
                continue;
            }

            attempted.push(provider);
            match self.try_provider(provider, &request, &cancel).await {
                Ok(response) => {
                    tracing::debug!(provider = %provider, "provider served the request");
                    return Ok(response);
                }
                Err(GatewayError::Cancelled) => {
                    // Caller is gone; the chain ceases here.
                    return Err(GatewayError::Cancelled);
                }
                Err(e) if e.is_retriable() => {
                    tracing::warn!(
                        provider = %provider,
                        code = e.error_code(),
                        error = %e,
                        "provider failed, advancing along the chain"
                    );
                    if i + 1 < self.chain.len() {
                        self.collector.record_failover(provider);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(GatewayError::AllProvidersFailed { attempted })
    }

    /// One attempt against one provider, through its breaker, with metrics
    /// emitted at entry and exit.
    async fn try_provider(
        &self,
        provider: ProviderId,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, GatewayError> {
        let adapter = self
            .adapters
            .get(&provider)
            .ok_or(GatewayError::ProviderNotConfigured { provider })?;
        let breaker = &self.breakers[&provider];

        let mut request = request.clone();
        if let Some(model) = self.model_overrides.get(&provider) {
            request.model = model.clone();
        }

        self.collector.record_request(provider);
        let start = Instant::now();
        let result = breaker
            .execute(|| adapter.chat_completion(&request, cancel))
            .await;
        let latency = start.elapsed();

        match &result {
            Ok(response) => {
                self.collector.record_success(
                    provider,
                    latency,
                    Some(response.usage.billable_tokens()),
                );
            }
            Err(e) => {
                self.collector
                    .record_failure(provider, latency, e.error_code(), &e.to_string());
            }
        }

        result
    }

    /// Breaker snapshots for every provider in the chain, in chain order.
    pub async fn provider_states(&self) -> Vec<CircuitBreakerSnapshot> {
        let mut snapshots = Vec::with_capacity(self.chain.len());
        for provider in &self.chain {
            snapshots.push(self.breakers[provider].get_metrics().await);
        }
        snapshots
    }

    /// The breaker for one provider, when it is part of the chain.
    pub fn breaker(&self, provider: ProviderId) -> Option<&Arc<CircuitBreaker>> {
        self.breakers.get(&provider)
    }

    pub fn chain(&self) -> &[ProviderId] {
        &self.chain
    }
}

impl FallbackOrchestratorBuilder {
    /// Ordered provider chain; the first entry is the primary.
    pub fn chain(mut self, chain: Vec<ProviderId>) -> Self {
        self.chain = chain;
        self
    }

    /// Configure the adapter for one provider.
    pub fn provider(mut self, provider: ProviderId, config: AdapterConfig) -> Self {
        self.adapter_configs.insert(provider, config);
        self
    }

    /// Replace the request's model with a provider-specific one.
    pub fn model_override(mut self, provider: ProviderId, model: impl Into<String>) -> Self {
        self.model_overrides.insert(provider, model.into());
        self
    }

    /// Breaker configuration for the primary provider. Fallback providers
    /// always use the defaults.
    pub fn primary_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.primary_breaker_config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn collector(mut self, collector: Arc<MetricsCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn build(self) -> Result<FallbackOrchestrator, GatewayError> {
        if self.chain.is_empty() {
            return Err(GatewayError::InvalidConfig {
                message: "provider chain is empty".to_string(),
            });
        }
        let store = self.store.ok_or_else(|| GatewayError::InvalidConfig {
            message: "orchestrator requires a key-value store".to_string(),
        })?;
        let collector = self.collector.ok_or_else(|| GatewayError::InvalidConfig {
            message: "orchestrator requires a metrics collector".to_string(),
        })?;

        let mut adapters = HashMap::new();
        let mut breakers = HashMap::new();
        for (i, &provider) in self.chain.iter().enumerate() {
            let config = self
                .adapter_configs
                .get(&provider)
                .ok_or(GatewayError::ProviderNotConfigured { provider })?;
            adapters.insert(provider, ProviderAdapter::new(provider, config)?);

            let breaker_config = if i == 0 {
                self.primary_breaker_config.clone()
            } else {
                CircuitBreakerConfig::default()
            };
            breakers.insert(
                provider,
                Arc::new(CircuitBreaker::new(
                    provider,
                    breaker_config,
                    store.clone(),
                    Some(collector.clone()),
                )),
            );
        }

        Ok(FallbackOrchestrator {
            chain: self.chain,
            adapters,
            breakers,
            model_overrides: self.model_overrides,
            collector,
        })
    }
}
