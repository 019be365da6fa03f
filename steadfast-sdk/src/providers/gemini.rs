use crate::error::GatewayError;
use crate::models::{ChatRequest, ChatResponse, Choice, FinishReason, Message, Role, Usage};
use crate::providers::ProviderId;
use serde::{Deserialize, Serialize};

// Model name is interpolated into the path for this upstream.
pub(crate) fn chat_path(model: &str) -> String {
    format!("/google-ai-studio/v1/models/{model}:generateContent")
}

#[derive(Debug, Serialize)]
pub(crate) struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(rename = "stopSequences", skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<GeminiUsage>,
    #[serde(rename = "modelVersion", default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
    #[serde(default)]
    index: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: u32,
}

pub(crate) fn build_request(request: &ChatRequest) -> GeminiRequest {
    let mut system = String::new();
    let mut contents = Vec::new();

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
            Role::User => contents.push(GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: msg.content.clone(),
                }],
            }),
            Role::Assistant => contents.push(GeminiContent {
                role: Some("model".to_string()),
                parts: vec![GeminiPart {
                    text: msg.content.clone(),
                }],
            }),
        }
    }

    let generation_config = if request.temperature.is_some()
        || request.max_tokens.is_some()
        || request.top_p.is_some()
        || request.stop.is_some()
    {
        Some(GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
            top_p: request.top_p,
            stop_sequences: request.stop.clone(),
        })
    } else {
        None
    };

    GeminiRequest {
        contents,
        system_instruction: (!system.is_empty()).then(|| GeminiContent {
            role: None,
            parts: vec![GeminiPart { text: system }],
        }),
        generation_config,
    }
}

pub(crate) fn parse_response(
    response: GeminiResponse,
    model: &str,
) -> Result<ChatResponse, GatewayError> {
    if response.candidates.is_empty() {
        return Err(GatewayError::InvalidResponse {
            provider: ProviderId::Gemini,
            reason: "response carried no candidates".to_string(),
        });
    }

    let choices: Vec<Choice> = response
        .candidates
        .into_iter()
        .enumerate()
        .map(|(i, candidate)| {
            let content = candidate
                .content
                .map(|c| {
                    c.parts
                        .into_iter()
                        .map(|p| p.text)
                        .collect::<Vec<_>>()
                        .join("")
                })
                .unwrap_or_default();
            Choice {
                index: candidate.index.unwrap_or(i as u32),
                message: Message {
                    role: Role::Assistant,
                    content,
                },
                finish_reason: candidate
                    .finish_reason
                    .as_deref()
                    .map(FinishReason::parse)
                    .unwrap_or(FinishReason::Unknown),
            }
        })
        .collect();

    let usage = match response.usage_metadata {
        Some(u) if u.prompt_token_count + u.candidates_token_count > 0 => {
            Usage::from_parts(u.prompt_token_count, u.candidates_token_count)
        }
        Some(u) => Usage {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: u.total_token_count,
        },
        None => Usage::default(),
    };

    Ok(ChatResponse {
        id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: response.model_version.unwrap_or_else(|| model.to_string()),
        choices,
        usage,
    })
}
