use crate::error::GatewayError;
use crate::models::{ChatRequest, ChatResponse, Choice, FinishReason, Message, Role, Usage};
use crate::providers::ProviderId;
use serde::{Deserialize, Serialize};

pub(crate) const CHAT_PATH: &str = "/anthropic/v1/messages";
pub(crate) const VERSION_HEADER: (&str, &str) = ("anthropic-version", "2023-06-01");

// The messages API mandates max_tokens; injected when the caller omits it.
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Serialize)]
pub(crate) struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnthropicResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    content: Vec<AnthropicContent>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

pub(crate) fn build_request(request: &ChatRequest, model: &str) -> AnthropicRequest {
    // System messages collapse into the top-level system prompt; the
    // conversation keeps only user/assistant turns.
    let mut system = String::new();
    let mut messages = Vec::new();

    for msg in &request.messages {
        match msg.role {
            Role::System => {
                if !msg.content.is_empty() {
                    if !system.is_empty() {
                        system.push('\n');
                    }
                    system.push_str(&msg.content);
                }
            }
            Role::User => messages.push(AnthropicMessage {
                role: "user".to_string(),
                content: msg.content.clone(),
            }),
            Role::Assistant => messages.push(AnthropicMessage {
                role: "assistant".to_string(),
                content: msg.content.clone(),
            }),
        }
    }

    AnthropicRequest {
        model: model.to_string(),
        max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        messages,
        system: (!system.is_empty()).then_some(system),
        temperature: request.temperature,
        top_p: request.top_p,
        stop_sequences: request.stop.clone(),
    }
}

pub(crate) fn parse_response(
    response: AnthropicResponse,
    model: &str,
) -> Result<ChatResponse, GatewayError> {
    if response.content.is_empty() {
        return Err(GatewayError::InvalidResponse {
            provider: ProviderId::Anthropic,
            reason: "response carried no content blocks".to_string(),
        });
    }

    let content = response
        .content
        .into_iter()
        .map(|c| c.text)
        .collect::<Vec<_>>()
        .join("");

    let usage = response
        .usage
        .map(|u| Usage::from_parts(u.input_tokens, u.output_tokens))
        .unwrap_or_default();

    Ok(ChatResponse {
        id: response
            .id
            .unwrap_or_else(|| format!("chatcmpl-{}", uuid::Uuid::new_v4())),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: response.model.unwrap_or_else(|| model.to_string()),
        choices: vec![Choice {
            index: 0,
            message: Message {
                role: Role::Assistant,
                content,
            },
            finish_reason: response
                .stop_reason
                .as_deref()
                .map(FinishReason::parse)
                .unwrap_or(FinishReason::Unknown),
        }],
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_blocks_join_into_one_choice() {
        let raw = serde_json::json!({
            "id": "msg_1",
            "model": "claude-3-5-sonnet-20241022",
            "content": [
                {"type": "text", "text": "Hello"},
                {"type": "text", "text": ", world"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 4}
        });
        let parsed: AnthropicResponse = serde_json::from_value(raw).unwrap();
        let response = parse_response(parsed, "claude-3-5-sonnet-20241022").unwrap();
        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.choices[0].message.content, "Hello, world");
        assert_eq!(response.choices[0].finish_reason, FinishReason::Stop);
        assert_eq!(response.usage.total_tokens, 16);
    }

    #[test]
    fn max_tokens_default_is_injected() {
        let request = ChatRequest {
            model: String::new(),
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let body = serde_json::to_value(build_request(&request, "claude-3-5-haiku-20241022")).unwrap();
        assert_eq!(body["max_tokens"], 1024);

        let with_cap = ChatRequest {
            max_tokens: Some(64),
            ..request
        };
        let body = serde_json::to_value(build_request(&with_cap, "claude-3-5-haiku-20241022")).unwrap();
        assert_eq!(body["max_tokens"], 64);
    }

    #[test]
    fn system_messages_collapse_into_system_field() {
        let request = ChatRequest {
            model: String::new(),
            messages: vec![
                Message::system("be brief"),
                Message::system("be kind"),
                Message::user("hi"),
            ],
            ..Default::default()
        };
        let body = serde_json::to_value(build_request(&request, "claude")).unwrap();
        assert_eq!(body["system"], "be brief\nbe kind");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn empty_content_is_rejected() {
        let raw = serde_json::json!({"id": "msg_2", "content": []});
        let parsed: AnthropicResponse = serde_json::from_value(raw).unwrap();
        let err = parse_response(parsed, "claude").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_RESPONSE");
    }
}
