//! # HTTP Server Module
//!
//! Builds the axum application: storage backend selection, the shared
//! orchestrator/collector/analytics state, route registration and the
//! middleware stack (request timeout, tracing, optional CORS).

use crate::config::{Config, StorageBackend};
use crate::handlers;
use crate::kv_redis::RedisKvStore;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use steadfast_sdk::analytics::AnalyticsService;
use steadfast_sdk::kv::{KvStore, MemoryKvStore};
use steadfast_sdk::metrics::MetricsCollector;
use steadfast_sdk::orchestrator::FallbackOrchestrator;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<FallbackOrchestrator>,
    pub collector: Arc<MetricsCollector>,
    pub analytics: Arc<AnalyticsService>,
}

/// Build the application router from a validated configuration.
pub async fn create_server(config: Config) -> anyhow::Result<Router> {
    config.validate()?;

    let store: Arc<dyn KvStore> = match &config.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryKvStore::new()),
        StorageBackend::Redis { url } => {
            tracing::info!("using redis storage backend");
            Arc::new(RedisKvStore::connect(url).await?)
        }
    };

    let collector = Arc::new(MetricsCollector::new(store.clone()));
    let analytics = Arc::new(AnalyticsService::new(collector.clone()));

    let chain = config.chain()?;
    let mut builder = FallbackOrchestrator::builder()
        .chain(chain.clone())
        .store(store)
        .collector(collector.clone())
        .primary_breaker_config(config.breaker_config());
    for provider in chain {
        builder = builder
            .provider(provider, config.adapter_config(provider)?)
            .model_override(
                provider,
                config.providers[provider.as_str()].model.clone(),
            );
    }
    let orchestrator = Arc::new(builder.build()?);

    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator,
        collector,
        analytics,
    };

    let mut app = Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/metrics", get(handlers::metrics))
        .route("/metrics/prometheus", get(handlers::prometheus_metrics))
        .route("/analytics", get(handlers::analytics))
        .route("/health", get(handlers::health))
        .route(
            "/admin/circuit-breakers/{provider}/reset",
            post(handlers::reset_circuit_breaker),
        )
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.timeout_secs,
        )))
        .with_state(state);

    if config.server.cors.enabled {
        let cors = if config.server.cors.allowed_origins.is_empty() {
            CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
        } else {
            let origins: Vec<HeaderValue> = config
                .server
                .cors
                .allowed_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();
            CorsLayer::new().allow_origin(origins)
        };
        app = app.layer(cors);
    }

    Ok(app)
}
