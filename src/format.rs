//! OpenAI-shaped output: aggregate completions, streaming chunks and event-stream framing.
//!
//! Every formatted object gets its own random id; ids are not correlated across
//! the chunks of one response.

use rand::Rng;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::RelayError;
use crate::models::chat::{
    ChatChoice, ChatCompletionChunk, ChatCompletionResponse, ChatDelta, ChatResponseMessage,
    ChatStreamChoice,
};

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LEN: usize = 9;

/// `chatcmpl-` followed by nine random base-36 characters.
pub fn completion_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("chatcmpl-{suffix}")
}

/// Current Unix timestamp (seconds).
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Wrap buffered text in a `chat.completion` object.
pub fn format_aggregate(text: String, model: &str) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: completion_id(),
        object: "chat.completion".to_string(),
        created: unix_now(),
        model: model.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatResponseMessage {
                role: "assistant".to_string(),
                content: text,
            },
            finish_reason: Some("stop".to_string()),
        }],
    }
}

/// Build a `chat.completion.chunk`. Terminal chunks carry an empty delta and `finish_reason: "stop"`.
pub fn chunk(text: &str, is_terminal: bool, model: &str) -> ChatCompletionChunk {
    let (delta, finish_reason) = if is_terminal {
        (ChatDelta::default(), Some("stop".to_string()))
    } else {
        (
            ChatDelta {
                content: Some(text.to_string()),
            },
            None,
        )
    };
    ChatCompletionChunk {
        id: completion_id(),
        object: "chat.completion.chunk".to_string(),
        created: unix_now(),
        model: model.to_string(),
        choices: vec![ChatStreamChoice {
            index: 0,
            delta,
            finish_reason,
        }],
    }
}

/// [`chunk`] framed for event-stream transport.
pub fn format_chunk(text: &str, is_terminal: bool, model: &str) -> String {
    sse_frame(&chunk(text, is_terminal, model))
}

/// Error body framed for event-stream transport, used when a failure happens mid-stream.
pub fn format_error_frame(err: &RelayError) -> String {
    sse_frame(&err.to_body())
}

/// `data: <json>\n\n`
pub fn sse_frame<T: Serialize>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(json) => format!("data: {json}\n\n"),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize event-stream frame");
            String::new()
        }
    }
}
