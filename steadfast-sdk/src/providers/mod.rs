//! # Provider Adapter Layer
//!
//! Translates the canonical chat-completion contract into each upstream's
//! native wire format, performs exactly one HTTP call, and normalizes the
//! response back into canonical form.
//!
//! ## Upstream shapes
//!
//! The adapter is polymorphic over a closed set of upstream shapes - one
//! module per provider, dispatched by [`ProviderId`]:
//!
//! - **openai** - already canonical: the response carries `choices[]` and is
//!   accepted verbatim (validated for at least one choice).
//! - **anthropic** - `content[].text` blocks joined into a single choice,
//!   versioned via the `anthropic-version` header, `max_tokens` injected
//!   when absent.
//! - **gemini** - `candidates[].content.parts[].text` joined per candidate,
//!   model name interpolated into the request path.
//!
//! No retries and no fallback live here; that is the orchestrator's job.

use crate::error::GatewayError;
use crate::models::{ChatRequest, ChatResponse};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub mod anthropic;
pub mod gemini;
pub mod http;
pub mod openai;

use http::{AuthStrategy, HttpGatewayClient};

/// Closed set of upstream provider identities.
///
/// Code that needs "every provider" iterates [`ProviderId::ALL`] rather than
/// assuming how many there are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderId {
    pub const ALL: &'static [ProviderId] = &[
        ProviderId::OpenAi,
        ProviderId::Anthropic,
        ProviderId::Gemini,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(ProviderId::OpenAi),
            "anthropic" => Ok(ProviderId::Anthropic),
            "gemini" => Ok(ProviderId::Gemini),
            other => Err(GatewayError::UnsupportedProvider {
                name: other.to_string(),
            }),
        }
    }
}

/// Immutable configuration for one provider adapter.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Gateway host, e.g. `https://gateway.ai.cloudflare.com`
    pub host: String,
    pub account_id: String,
    pub gateway_id: String,
    /// Upstream API token
    pub api_token: String,
    /// Model used when the request leaves the model hint empty
    pub default_model: String,
    /// Per-call HTTP timeout
    pub timeout: Duration,
    /// Extra headers merged into every request
    pub extra_headers: HashMap<String, String>,
}

impl AdapterConfig {
    /// Base URL shared by every provider path: `<host>/v1/<account>/<gateway>`.
    fn base_url(&self) -> String {
        format!(
            "{}/v1/{}/{}",
            self.host.trim_end_matches('/'),
            self.account_id,
            self.gateway_id
        )
    }
}

/// Adapter for a single upstream provider.
///
/// Owns the HTTP client for that provider's endpoint and dispatches request
/// and response translation to the provider's module.
pub struct ProviderAdapter {
    provider: ProviderId,
    http: HttpGatewayClient,
    default_model: String,
}

impl ProviderAdapter {
    pub fn new(provider: ProviderId, config: &AdapterConfig) -> Result<Self, GatewayError> {
        let mut headers = config.extra_headers.clone();
        let auth = match provider {
            ProviderId::OpenAi | ProviderId::Gemini => AuthStrategy::Bearer {
                token: config.api_token.clone(),
            },
            ProviderId::Anthropic => {
                let (name, value) = anthropic::VERSION_HEADER;
                headers.insert(name.to_string(), value.to_string());
                AuthStrategy::Header {
                    name: "x-api-key".to_string(),
                    value: config.api_token.clone(),
                }
            }
        };

        let http = HttpGatewayClient::new(config.timeout, config.base_url(), &headers, auth)?;

        Ok(Self {
            provider,
            http,
            default_model: config.default_model.clone(),
        })
    }

    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    fn resolve_model<'a>(&'a self, request: &'a ChatRequest) -> &'a str {
        if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        }
    }

    /// One upstream call: translate, POST, normalize. No retry, no fallback.
    pub async fn chat_completion(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, GatewayError> {
        let model = self.resolve_model(request);

        match self.provider {
            ProviderId::OpenAi => {
                let body = openai::build_request(request, model);
                let response: openai::OpenAiResponse = self
                    .http
                    .post_json(self.provider, openai::CHAT_PATH, &body, cancel)
                    .await?;
                openai::parse_response(response, model)
            }
            ProviderId::Anthropic => {
                let body = anthropic::build_request(request, model);
                let response: anthropic::AnthropicResponse = self
                    .http
                    .post_json(self.provider, anthropic::CHAT_PATH, &body, cancel)
                    .await?;
                anthropic::parse_response(response, model)
            }
            ProviderId::Gemini => {
                let body = gemini::build_request(request);
                let path = gemini::chat_path(model);
                let response: gemini::GeminiResponse = self
                    .http
                    .post_json(self.provider, &path, &body, cancel)
                    .await?;
                gemini::parse_response(response, model)
            }
        }
    }
}
