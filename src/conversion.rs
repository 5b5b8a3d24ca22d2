use crate::models::chat::{ChatMessage, Role};
use crate::models::duck::{DuckChatRequest, DuckMessage};
use serde_json::Value;

/// Role label used in the flattened prompt, or `None` when the role is not relayed.
///
/// The backend has no system role, so system turns are presented as user turns.
fn effective_role(role: &Role) -> Option<&'static str> {
    match role {
        Role::System | Role::User => Some("user"),
        Role::Assistant => Some("assistant"),
        Role::Other => None,
    }
}

/// Extract the text of a message's content.
///
/// Strings pass through; content-part arrays contribute the `text` field of
/// every part that has one, concatenated without separators. Any other shape
/// yields an empty string.
pub fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect(),
        _ => String::new(),
    }
}

/// Flatten a multi-turn conversation into the single text blob the backend expects.
///
/// Each surviving message becomes a `"<role>: <content>"` line, in input order,
/// joined by `\n`. Messages with an unrecognized role or blank content are dropped;
/// when nothing survives the result is an empty string.
pub fn flatten_messages(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter_map(|m| {
            let role = effective_role(&m.role)?;
            let text = content_text(&m.content);
            if text.trim().is_empty() {
                return None;
            }
            Some(format!("{role}: {text}"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the backend chat body: exactly one user turn carrying the flattened prompt.
pub fn to_duck_request(backend_model: &str, prompt: String) -> DuckChatRequest {
    DuckChatRequest {
        model: backend_model.to_string(),
        messages: vec![DuckMessage {
            role: "user".to_string(),
            content: prompt,
        }],
    }
}
