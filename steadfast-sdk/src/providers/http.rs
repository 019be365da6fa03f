use crate::error::GatewayError;
use crate::providers::ProviderId;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a provider authenticates outbound calls.
#[derive(Clone, Debug)]
pub enum AuthStrategy {
    Bearer { token: String },
    Header { name: String, value: String },
}

/// Outbound HTTP client for one provider endpoint.
///
/// Holds the resolved gateway base URL and the provider's default headers.
/// One call per invocation; retries and fallback live above this layer.
#[derive(Clone)]
pub struct HttpGatewayClient {
    http: Client,
    base_url: String,
    default_headers: HeaderMap,
}

impl HttpGatewayClient {
    pub fn new(
        timeout: Duration,
        base_url: String,
        headers: &HashMap<String, String>,
        auth: AuthStrategy,
    ) -> Result<Self, GatewayError> {
        let http = Client::builder().timeout(timeout).build().map_err(|e| {
            GatewayError::InvalidConfig {
                message: format!("failed to create HTTP client: {e}"),
            }
        })?;

        let mut default_headers = HeaderMap::new();
        match auth {
            AuthStrategy::Bearer { token } => {
                let value = format!("Bearer {token}")
                    .parse()
                    .map_err(|_| GatewayError::InvalidConfig {
                        message: "API token is not a valid header value".to_string(),
                    })?;
                default_headers.insert("Authorization", value);
            }
            AuthStrategy::Header { name, value } => {
                let name = name.parse::<reqwest::header::HeaderName>().map_err(|_| {
                    GatewayError::InvalidConfig {
                        message: format!("invalid auth header name: {name}"),
                    }
                })?;
                let value = value.parse().map_err(|_| GatewayError::InvalidConfig {
                    message: "auth header value is not valid".to_string(),
                })?;
                default_headers.insert(name, value);
            }
        }

        for (k, v) in headers {
            if let (Ok(name), Ok(value)) = (k.parse::<reqwest::header::HeaderName>(), v.parse()) {
                default_headers.insert(name, value);
            }
        }

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_headers,
        })
    }

    fn build_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// POST a JSON body and decode a JSON response.
    ///
    /// The call races against `cancel`: a cancelled caller aborts the
    /// in-flight request and surfaces `CANCELLED`. Non-2xx statuses carry
    /// the upstream body back for diagnosis; body decode failures are
    /// classified as invalid responses rather than transport errors.
    pub async fn post_json<TReq, TResp>(
        &self,
        provider: ProviderId,
        path: &str,
        body: &TReq,
        cancel: &CancellationToken,
    ) -> Result<TResp, GatewayError>
    where
        TReq: Serialize,
        TResp: DeserializeOwned,
    {
        let url = self.build_url(path);
        let send = self
            .http
            .request(Method::POST, url)
            .headers(self.default_headers.clone())
            .json(body)
            .send();

        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
            resp = send => resp.map_err(|source| GatewayError::Transport { provider, source })?,
        };

        let status = resp.status();
        let text = tokio::select! {
            _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
            text = resp.text() => text.map_err(|source| GatewayError::Transport { provider, source })?,
        };

        if !status.is_success() {
            return Err(GatewayError::Upstream {
                provider,
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str::<TResp>(&text).map_err(|e| GatewayError::InvalidResponse {
            provider,
            reason: format!("body did not parse: {e}"),
        })
    }
}
