//! Request and response models.
//!
//! Caller-facing payloads follow the OpenAI Chat Completions shapes so any
//! OpenAI-compatible frontend can talk to the server.

use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Role of the message sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// A file the user attached to a chat request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadedFile {
    pub filename: String,
    pub content: String,
}

/// A fully prepared request for the model runtime.
///
/// The conversation can never be empty.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: NonEmpty<ChatMessage>,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: NonEmpty<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A locally available model, in OpenAI list format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>, created: i64) -> Self {
        Self {
            id: id.into(),
            object: "model".to_string(),
            created,
            owned_by: "ollama".to_string(),
        }
    }
}

/// Reason for finishing the response generation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Choice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: FinishReason,
}

/// Which context went into a prompt, reported back for debugging.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextInfo {
    pub included_files: Vec<String>,
    pub context_length: usize,
    pub message_count: usize,
}

/// Non-streaming chat completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_info: Option<ContextInfo>,
}

impl ChatCompletion {
    /// Text of the first choice.
    pub fn content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<FinishReason>,
}

/// One streamed chat completion chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    /// Set on the closing chunk when the model produced no text at all.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub empty_response: bool,
}

impl ChatCompletionChunk {
    /// Chunk carrying one piece of text.
    pub fn delta(id: &str, model: &str, created: i64, content: String) -> Self {
        Self::with_choice(
            id,
            model,
            created,
            ChunkDelta {
                content: Some(content),
            },
            None,
        )
    }

    /// Closing chunk with an empty delta.
    pub fn stop(id: &str, model: &str, created: i64) -> Self {
        Self::with_choice(id, model, created, ChunkDelta::default(), Some(FinishReason::Stop))
    }

    /// Closing chunk for a reply without any text.
    pub fn empty(id: &str, model: &str, created: i64) -> Self {
        Self {
            empty_response: true,
            ..Self::stop(id, model, created)
        }
    }

    fn with_choice(
        id: &str,
        model: &str,
        created: i64,
        delta: ChunkDelta,
        finish_reason: Option<FinishReason>,
    ) -> Self {
        Self {
            id: id.to_string(),
            object: "chat.completion.chunk".to_string(),
            created,
            model: model.to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            empty_response: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunk_wire_format() {
        let chunk = ChatCompletionChunk::delta("chatcmpl-1", "llama3.2", 7, "Hi".into());
        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion.chunk",
                "created": 7,
                "model": "llama3.2",
                "choices": [{"index": 0, "delta": {"content": "Hi"}, "finish_reason": null}]
            })
        );

        let stop = serde_json::to_value(ChatCompletionChunk::stop("c", "m", 0)).unwrap();
        assert_eq!(stop["choices"][0]["delta"], json!({}));
        assert_eq!(stop["choices"][0]["finish_reason"], "stop");
        assert!(stop.get("empty_response").is_none());

        let empty = serde_json::to_value(ChatCompletionChunk::empty("c", "m", 0)).unwrap();
        assert_eq!(empty["choices"][0]["finish_reason"], "stop");
        assert_eq!(empty["empty_response"], true);
    }

    #[test]
    fn test_usage_totals() {
        let usage = Usage::new(20, 10);
        assert_eq!(usage.total_tokens, 30);
    }

    #[test]
    fn test_role_is_lowercase_on_the_wire() {
        let msg: ChatMessage = serde_json::from_value(json!({"role": "user", "content": "x"})).unwrap();
        assert_eq!(msg, ChatMessage::user("x"));
        assert_eq!(serde_json::to_value(Role::System).unwrap(), "system");
    }
}
