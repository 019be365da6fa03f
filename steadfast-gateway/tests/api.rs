//! API surface tests: routing, status mapping, and the observability
//! endpoints, driven against mock upstreams.

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use steadfast_gateway::config::Config;
use steadfast_gateway::server::create_server;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(upstream_host: &str) -> Config {
    let toml = format!(
        r#"
        [gateway]
        host = "{upstream_host}"
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

        [circuit_breaker]
        failure_threshold = 3
        "#
    );
    Config::from_toml(&toml).unwrap()
}

async fn test_server(upstream: &MockServer) -> TestServer {
    let app = create_server(test_config(&upstream.uri())).await.unwrap();
    TestServer::new(app).unwrap()
}

fn openai_success() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-42",
        "object": "chat.completion",
        "created": 1700000000,
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "pong"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
    }))
}

fn chat_body() -> Value {
    json!({
        "model": "gpt-4o",
        "messages": [{"role": "user", "content": "ping"}]
    })
}

#[tokio::test]
async fn chat_completion_round_trips() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/acct/gw/openai/chat/completions"))
        .respond_with(openai_success())
        .mount(&upstream)
        .await;

    let server = test_server(&upstream).await;
    let response = server.post("/v1/chat/completions").json(&chat_body()).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["choices"][0]["message"]["content"], "pong");
    assert_eq!(body["usage"]["total_tokens"], 5);
}

#[tokio::test]
async fn exhausted_chain_maps_to_bad_gateway() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&upstream)
        .await;

    let server = test_server(&upstream).await;
    let response = server.post("/v1/chat/completions").json(&chat_body()).await;

    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "ALL_PROVIDERS_FAILED");
}

#[tokio::test]
async fn metrics_endpoint_serves_summary_and_per_provider() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/acct/gw/openai/chat/completions"))
        .respond_with(openai_success())
        .mount(&upstream)
        .await;

    let server = test_server(&upstream).await;
    let _ = server.post("/v1/chat/completions").json(&chat_body()).await;

    let response = server.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let summary: Value = response.json();
    assert_eq!(summary["requests_total"], 1);
    assert_eq!(summary["requests_success"], 1);

    let response = server
        .get("/metrics")
        .add_query_param("provider", "openai")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let record: Value = response.json();
    assert_eq!(record["provider"], "openai");
    assert_eq!(record["requests_total"], 1);
    assert_eq!(record["circuit_state"], "CLOSED");
}

#[tokio::test]
async fn unknown_provider_is_a_404() {
    let upstream = MockServer::start().await;
    let server = test_server(&upstream).await;

    let response = server
        .get("/metrics")
        .add_query_param("provider", "mystery")
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    // A known provider with no recorded traffic is also a 404.
    let response = server
        .get("/metrics")
        .add_query_param("provider", "anthropic")
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn analytics_rejects_out_of_range_hours() {
    let upstream = MockServer::start().await;
    let server = test_server(&upstream).await;

    for hours in ["0", "169", "100000"] {
        let response = server.get("/analytics").add_query_param("hours", hours).await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "hours={hours}");
    }

    let response = server.get("/analytics").add_query_param("hours", "24").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let report: Value = response.json();
    assert_eq!(report["query"]["hours"], 24);
    assert!(report["time_series"].is_array());
    assert!(report["provider_stats"].is_array());
}

#[tokio::test]
async fn health_reflects_provider_state() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&upstream)
        .await;

    let server = test_server(&upstream).await;

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let report: Value = response.json();
    assert_eq!(report["overall"], "healthy");
    assert_eq!(report["recommendations"][0], "All systems operating normally");

    // Drive both providers to zero success rate.
    for _ in 0..3 {
        let _ = server.post("/v1/chat/completions").json(&chat_body()).await;
    }

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    let report: Value = response.json();
    assert_eq!(report["overall"], "unhealthy");
    assert!(!report["recommendations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn prometheus_rendering_contains_provider_lines() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/acct/gw/openai/chat/completions"))
        .respond_with(openai_success())
        .mount(&upstream)
        .await;

    let server = test_server(&upstream).await;
    let _ = server.post("/v1/chat/completions").json(&chat_body()).await;

    let response = server.get("/metrics/prometheus").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let text = response.text();
    assert!(text.contains("gateway_requests_total 1"));
    assert!(text.contains("gateway_provider_requests_total{provider=\"openai\"} 1"));
}

#[tokio::test]
async fn admin_reset_requires_a_chain_member() {
    let upstream = MockServer::start().await;
    let server = test_server(&upstream).await;

    let response = server.post("/admin/circuit-breakers/mystery/reset").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    // Configured but not part of the chain.
    let response = server.post("/admin/circuit-breakers/gemini/reset").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = server.post("/admin/circuit-breakers/openai/reset").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "reset");
}
