use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

/// Chat Completions role enumeration.
///
/// Only `system`, `user` and `assistant` reach the backend. Anything else
/// (including `tool`, `function`, `null`, a number or a missing role) becomes
/// `Other` and is dropped when the conversation is flattened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    #[default]
    #[serde(other)]
    Other,
}

impl Role {
    /// Exact, case-sensitive role name lookup.
    pub fn from_name(name: &str) -> Self {
        match name {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::Other,
        }
    }
}

fn lenient_role<'de, D>(deserializer: D) -> Result<Role, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().map(Role::from_name).unwrap_or_default())
}

/// Minimal Chat message model compatible with the Chat Completions API.
///
/// `content` may be a string or an array of content parts; we accept
/// `serde_json::Value` so both shapes (and `null`) parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, deserialize_with = "lenient_role")]
    pub role: Role,
    #[serde(default)]
    pub content: Value,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Value::String(content.into()),
        }
    }

    /// Read a message out of an arbitrary JSON element. Elements that are not
    /// objects, or carry no usable role, come out as `Role::Other`.
    pub fn from_value(value: &Value) -> Self {
        Self {
            role: value
                .get("role")
                .and_then(Value::as_str)
                .map(Role::from_name)
                .unwrap_or_default(),
            content: value.get("content").cloned().unwrap_or(Value::Null),
        }
    }
}

/// `messages` is taken element by element so one unusable entry does not
/// reject the whole request. A value that is not an array reads as absent.
fn lenient_messages<'de, D>(deserializer: D) -> Result<Option<Vec<ChatMessage>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => Some(items.iter().map(ChatMessage::from_value).collect()),
        _ => None,
    })
}

/// Chat Completions request, restricted to the fields the relay honours.
///
/// Everything is optional at the serde layer so that missing fields surface
/// as uniform `invalid_request_error` bodies instead of extractor rejections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_messages",
        skip_serializing_if = "Option::is_none"
    )]
    pub messages: Option<Vec<ChatMessage>>,
    /// Interpreted with JavaScript truthiness, see [`ChatCompletionRequest::wants_stream`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<Value>,
}

impl ChatCompletionRequest {
    /// Whether the caller asked for an event-stream response.
    pub fn wants_stream(&self) -> bool {
        match &self.stream {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(_)) | Some(Value::Object(_)) => true,
        }
    }
}

// ============================================================================
// Chat Completions Response Models
// ============================================================================

/// Message in a Chat Completions response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponseMessage {
    pub role: String, // "assistant"
    pub content: String,
}

/// Choice in a Chat Completions response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatResponseMessage,
    pub finish_reason: Option<String>,
}

/// Complete Chat Completions API response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String, // "chat.completion"
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
}

// ============================================================================
// Chat Completions Streaming Response Models
// ============================================================================

/// Delta in a streaming chunk. The terminal chunk carries an empty delta (`{}`).
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatDelta {
    #[serde(default)]
    pub content: Option<String>,
}

/// Choice in a streaming chunk. `finish_reason` is serialized as `null` until the end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamChoice {
    pub index: u32,
    pub delta: ChatDelta,
    pub finish_reason: Option<String>,
}

/// Streaming chunk response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String, // "chat.completion.chunk"
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatStreamChoice>,
}

// ============================================================================
// Model listing and error bodies
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCard {
    pub id: String,
    pub object: String, // "model"
    pub owned_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String, // "list"
    pub data: Vec<ModelCard>,
}

/// Uniform error envelope: `{"error":{"message","type","code","param":null}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub code: u16,
    pub param: Option<String>,
}
