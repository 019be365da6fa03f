//! # Gateway Configuration Module
//!
//! TOML-backed configuration for the Steadfast gateway: server binding,
//! upstream gateway identity (account and gateway ids), per-provider tokens
//! and models, the fallback chain order, circuit breaker thresholds, the
//! storage backend, and logging.
//!
//! ## Loading
//!
//! ```rust,no_run
//! use steadfast_gateway::config::Config;
//!
//! let config = Config::load("config.toml")?;
//! config.validate()?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Environment variables override file values:
//!
//! - `GATEWAY_HOST`, `GATEWAY_PORT` - server binding
//! - `GATEWAY_ACCOUNT_ID`, `GATEWAY_GATEWAY_ID` - upstream gateway identity
//! - `OPENAI_API_TOKEN`, `ANTHROPIC_API_TOKEN`, `GEMINI_API_TOKEN` - tokens
//! - `GATEWAY_REDIS_URL` - switches storage to the Redis backend
//! - `GATEWAY_LOG_LEVEL` - logging filter
//!
//! Validation distinguishes a value that is absent (`MISSING_CONFIG`) from
//! one that is present but unusable (`INVALID_CONFIG`); both are fatal at
//! bootstrap, never retried.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use steadfast_sdk::circuit_breaker::CircuitBreakerConfig;
use steadfast_sdk::providers::{AdapterConfig, ProviderId};
use steadfast_sdk::GatewayError;

const DEFAULT_GATEWAY_HOST: &str = "https://gateway.ai.cloudflare.com";

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,
    pub chain: ChainConfig,
    #[serde(default)]
    pub circuit_breaker: BreakerSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server binding and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Whole-request timeout in seconds
    #[serde(default = "default_server_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Identity of the upstream AI gateway the adapters call through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub gateway_id: String,
    /// Per-call upstream timeout in seconds
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,
}

/// One upstream provider's credentials and model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub api_token: String,
    /// Model used for this provider; also the per-provider override applied
    /// before the adapter call
    pub model: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Ordered fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub order: Vec<String>,
}

/// Circuit breaker thresholds, applied to the primary provider. Fallback
/// providers always run the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    #[serde(default = "default_open_timeout")]
    pub open_timeout_secs: u64,
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
}

/// Key-value storage backend selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum StorageBackend {
    /// In-process map; state does not survive restarts
    #[default]
    Memory,
    /// Shared Redis; state converges across processes
    Redis { url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_server_timeout() -> u64 {
    120
}
fn default_gateway_host() -> String {
    DEFAULT_GATEWAY_HOST.to_string()
}
fn default_upstream_timeout() -> u64 {
    60
}
fn default_true() -> bool {
    true
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_success_threshold() -> u32 {
    2
}
fn default_open_timeout() -> u64 {
    60
}
fn default_half_open_max_calls() -> u32 {
    1
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_server_timeout(),
            cors: CorsConfig::default(),
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            open_timeout_secs: default_open_timeout(),
            half_open_max_calls: default_half_open_max_calls(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("GATEWAY_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("GATEWAY_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(account_id) = std::env::var("GATEWAY_ACCOUNT_ID") {
            self.gateway.account_id = account_id;
        }
        if let Ok(gateway_id) = std::env::var("GATEWAY_GATEWAY_ID") {
            self.gateway.gateway_id = gateway_id;
        }
        for &provider in ProviderId::ALL {
            let var = format!("{}_API_TOKEN", provider.as_str().to_uppercase());
            if let Ok(token) = std::env::var(&var) {
                if let Some(settings) = self.providers.get_mut(provider.as_str()) {
                    settings.api_token = token;
                }
            }
        }
        if let Ok(url) = std::env::var("GATEWAY_REDIS_URL") {
            self.storage.backend = StorageBackend::Redis { url };
        }
        if let Ok(level) = std::env::var("GATEWAY_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Check the configuration is complete enough to boot. Errors here are
    /// operator mistakes and surface immediately.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.gateway.account_id.is_empty() {
            return Err(GatewayError::MissingConfig {
                name: "gateway.account_id".to_string(),
            });
        }
        if self.gateway.gateway_id.is_empty() {
            return Err(GatewayError::MissingConfig {
                name: "gateway.gateway_id".to_string(),
            });
        }
        if self.chain.order.is_empty() {
            return Err(GatewayError::InvalidConfig {
                message: "chain.order must name at least one provider".to_string(),
            });
        }

        for name in &self.chain.order {
            let provider: ProviderId = name.parse()?;
            let settings = self.providers.get(provider.as_str()).ok_or(
                GatewayError::ProviderNotConfigured { provider },
            )?;
            if !settings.enabled {
                return Err(GatewayError::InvalidConfig {
                    message: format!("provider {provider} is in the chain but disabled"),
                });
            }
            if settings.api_token.is_empty() {
                return Err(GatewayError::MissingConfig {
                    name: format!("providers.{provider}.api_token"),
                });
            }
            if settings.model.is_empty() {
                return Err(GatewayError::InvalidConfig {
                    message: format!("providers.{provider}.model must not be empty"),
                });
            }
        }

        if let StorageBackend::Redis { url } = &self.storage.backend {
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                return Err(GatewayError::InvalidConfig {
                    message: "storage redis url must start with redis:// or rediss://".to_string(),
                });
            }
        }

        Ok(())
    }

    /// The parsed fallback chain, in configured order.
    pub fn chain(&self) -> Result<Vec<ProviderId>, GatewayError> {
        self.chain.order.iter().map(|name| name.parse()).collect()
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker.failure_threshold,
            success_threshold: self.circuit_breaker.success_threshold,
            open_timeout: Duration::from_secs(self.circuit_breaker.open_timeout_secs),
            half_open_max_calls: self.circuit_breaker.half_open_max_calls,
        }
    }

    pub fn adapter_config(&self, provider: ProviderId) -> Result<AdapterConfig, GatewayError> {
        let settings =
            self.providers
                .get(provider.as_str())
                .ok_or(GatewayError::ProviderNotConfigured { provider })?;
        Ok(AdapterConfig {
            host: self.gateway.host.clone(),
            account_id: self.gateway.account_id.clone(),
            gateway_id: self.gateway.gateway_id.clone(),
            api_token: settings.api_token.clone(),
            default_model: settings.model.clone(),
            timeout: Duration::from_secs(self.gateway.upstream_timeout_secs),
            extra_headers: HashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        [server]
        host = "0.0.0.0"
        port = 8080

        [gateway]
        account_id = "acct"
        gateway_id = "gw"

        [providers.openai]
        api_token = "sk-openai"
        model = "gpt-4o"

        [providers.anthropic]
        api_token = "sk-anthropic"
        model = "claude-3-5-sonnet-20241022"

        [chain]
        order = ["openai", "anthropic"]
    "#;

    #[test]
    fn full_config_parses_and_validates() {
        let config = Config::from_toml(FULL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.gateway.host, DEFAULT_GATEWAY_HOST);
        assert_eq!(
            config.chain().unwrap(),
            vec![ProviderId::OpenAi, ProviderId::Anthropic]
        );
        assert_eq!(config.breaker_config().failure_threshold, 3);
    }

    #[test]
    fn missing_account_id_is_fatal() {
        let toml = r#"
            [gateway]
            gateway_id = "gw"
            [providers.openai]
            api_token = "sk"
            model = "gpt-4o"
            [chain]
            order = ["openai"]
        "#;
        let config = Config::from_toml(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "MISSING_CONFIG");
    }

    #[test]
    fn missing_token_for_chain_member_is_fatal() {
        let toml = r#"
            [gateway]
            account_id = "acct"
            gateway_id = "gw"
            [providers.openai]
            model = "gpt-4o"
            [chain]
            order = ["openai"]
        "#;
        let config = Config::from_toml(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "MISSING_CONFIG");
    }

    #[test]
    fn unknown_chain_entry_is_unsupported() {
        let toml = r#"
            [gateway]
            account_id = "acct"
            gateway_id = "gw"
            [chain]
            order = ["mystery"]
        "#;
        let config = Config::from_toml(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_PROVIDER");
    }

    #[test]
    fn chain_entry_without_provider_block_is_fatal() {
        let toml = r#"
            [gateway]
            account_id = "acct"
            gateway_id = "gw"
            [chain]
            order = ["gemini"]
        "#;
        let config = Config::from_toml(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "PROVIDER_NOT_CONFIGURED");
    }

    #[test]
    fn adapter_config_carries_gateway_identity() {
        let config = Config::from_toml(FULL).unwrap();
        let adapter = config.adapter_config(ProviderId::OpenAi).unwrap();
        assert_eq!(adapter.account_id, "acct");
        assert_eq!(adapter.gateway_id, "gw");
        assert_eq!(adapter.default_model, "gpt-4o");
    }

    #[test]
    fn bad_redis_url_is_rejected() {
        let toml = r#"
            [gateway]
            account_id = "acct"
            gateway_id = "gw"
            [providers.openai]
            api_token = "sk"
            model = "gpt-4o"
            [chain]
            order = ["openai"]
            [storage.backend]
            kind = "redis"
            url = "http://not-redis"
        "#;
        let config = Config::from_toml(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }
}
