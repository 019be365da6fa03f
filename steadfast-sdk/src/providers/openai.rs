use crate::error::GatewayError;
use crate::models::{ChatRequest, ChatResponse, Choice, FinishReason, Message, Role, Usage};
use crate::providers::ProviderId;
use serde::{Deserialize, Serialize};

pub(crate) const CHAT_PATH: &str = "/openai/chat/completions";

#[derive(Debug, Serialize)]
pub(crate) struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    index: u32,
    message: OpenAiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

pub(crate) fn build_request(request: &ChatRequest, model: &str) -> OpenAiRequest {
    OpenAiRequest {
        model: model.to_string(),
        messages: request
            .messages
            .iter()
            .map(|m| OpenAiMessage {
                role: role_name(m.role).to_string(),
                content: m.content.clone(),
            })
            .collect(),
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        top_p: request.top_p,
        frequency_penalty: request.frequency_penalty,
        presence_penalty: request.presence_penalty,
        stop: request.stop.clone(),
    }
}

// Already-canonical upstream: the body carries choices[] as-is; we only
// validate non-emptiness and fold the stop reason.
pub(crate) fn parse_response(
    response: OpenAiResponse,
    model: &str,
) -> Result<ChatResponse, GatewayError> {
    if response.choices.is_empty() {
        return Err(GatewayError::InvalidResponse {
            provider: ProviderId::OpenAi,
            reason: "response carried no choices".to_string(),
        });
    }

    let choices = response
        .choices
        .into_iter()
        .map(|c| Choice {
            index: c.index,
            message: Message {
                role: Role::Assistant,
                content: c.message.content,
            },
            finish_reason: c
                .finish_reason
                .as_deref()
                .map(FinishReason::parse)
                .unwrap_or(FinishReason::Unknown),
        })
        .collect();

    let usage = match response.usage {
        Some(u) if u.total_tokens > 0 || u.prompt_tokens + u.completion_tokens == 0 => Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        },
        Some(u) => Usage::from_parts(u.prompt_tokens, u.completion_tokens),
        None => Usage::default(),
    };

    Ok(ChatResponse {
        id: response
            .id
            .unwrap_or_else(|| format!("chatcmpl-{}", uuid::Uuid::new_v4())),
        object: "chat.completion".to_string(),
        created: response
            .created
            .unwrap_or_else(|| chrono::Utc::now().timestamp()),
        model: response.model.unwrap_or_else(|| model.to_string()),
        choices,
        usage,
    })
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_body_passes_through() {
        let raw = serde_json::json!({
            "id": "chatcmpl-1",
            "created": 1700000000,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hello"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12}
        });
        let parsed: OpenAiResponse = serde_json::from_value(raw).unwrap();
        let response = parse_response(parsed, "gpt-4o").unwrap();
        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.choices[0].finish_reason, FinishReason::Stop);
        assert_eq!(response.usage.total_tokens, 12);
    }

    #[test]
    fn empty_choices_are_rejected() {
        let raw = serde_json::json!({"id": "x", "choices": []});
        let parsed: OpenAiResponse = serde_json::from_value(raw).unwrap();
        let err = parse_response(parsed, "gpt-4o").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_RESPONSE");
    }

    #[test]
    fn request_preserves_sampling_knobs() {
        let request = ChatRequest {
            model: "ignored".to_string(),
            messages: vec![Message::system("be brief"), Message::user("hi")],
            temperature: Some(0.3),
            max_tokens: Some(64),
            ..Default::default()
        };
        let body = serde_json::to_value(build_request(&request, "gpt-4o")).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["temperature"], 0.3);
        assert_eq!(body["max_tokens"], 64);
    }
}
