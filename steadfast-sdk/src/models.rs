//! # Canonical Chat Types
//!
//! The uniform chat-completion schema the gateway exposes to callers,
//! independent of any upstream's native format. Provider adapters translate
//! between these types and each upstream's wire shape.
//!
//! ## Contract
//!
//! Requests carry an ordered message sequence plus sampling knobs; responses
//! carry one or more choices and token usage. Every successful response has
//! at least one choice - adapters that normalize an upstream body to zero
//! choices fail with `INVALID_RESPONSE` instead of returning it.

use serde::{Deserialize, Serialize};

/// Chat completion request in canonical form.
///
/// Optional fields are skipped during serialization so each adapter can
/// forward the request without leaking nulls into upstream payloads.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatRequest {
    /// Model hint; adapters may override it per provider
    pub model: String,
    /// Ordered conversation messages
    pub messages: Vec<Message>,
    /// Controls randomness (0.0 to 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling cutoff (0.0 to 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Reduces repetition of identical tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    /// Reduces repetition of covered topics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    /// Sequences that stop generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

/// One conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Chat completion response in canonical form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Completion identifier; synthesized when the upstream omits one
    pub id: String,
    /// Always "chat.completion"
    pub object: String,
    /// Unix timestamp (seconds) of creation
    pub created: i64,
    /// Model that served the completion
    pub model: String,
    /// Generated choices; never empty on a successful response
    pub choices: Vec<Choice>,
    /// Token accounting reported by the upstream
    pub usage: Usage,
}

/// One generated completion choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: FinishReason,
}

/// Why the upstream stopped generating.
///
/// Upstream stop-reason strings are folded into this closed set; anything
/// unrecognized maps to `Unknown` rather than failing the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Unknown,
}

impl FinishReason {
    /// Case-folding map from upstream stop-reason strings.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "stop" | "end_turn" | "stop_sequence" => FinishReason::Stop,
            "length" | "max_tokens" => FinishReason::Length,
            "content_filter" | "safety" => FinishReason::ContentFilter,
            "tool_calls" | "tool_use" => FinishReason::ToolCalls,
            _ => FinishReason::Unknown,
        }
    }
}

/// Token usage statistics.
///
/// When the upstream reports prompt and completion counts separately,
/// `total_tokens = prompt + completion`; a total-only upstream leaves the
/// components at zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn from_parts(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Billable token count: the larger of the reported total and the sum
    /// of the parts, tolerating upstreams that fill only one of the two.
    pub fn billable_tokens(&self) -> u32 {
        self.total_tokens
            .max(self.prompt_tokens + self.completion_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_folds_case_and_aliases() {
        assert_eq!(FinishReason::parse("STOP"), FinishReason::Stop);
        assert_eq!(FinishReason::parse("end_turn"), FinishReason::Stop);
        assert_eq!(FinishReason::parse("MAX_TOKENS"), FinishReason::Length);
        assert_eq!(FinishReason::parse("SAFETY"), FinishReason::ContentFilter);
        assert_eq!(FinishReason::parse("tool_use"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::parse("banana"), FinishReason::Unknown);
    }

    #[test]
    fn usage_total_prefers_the_larger_reading() {
        let parts = Usage::from_parts(10, 20);
        assert_eq!(parts.total_tokens, 30);
        assert_eq!(parts.billable_tokens(), 30);

        let total_only = Usage {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 42,
        };
        assert_eq!(total_only.billable_tokens(), 42);
    }

    #[test]
    fn optional_request_fields_are_omitted() {
        let request = ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("stop").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
