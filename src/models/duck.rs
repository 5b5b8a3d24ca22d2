use serde::{Deserialize, Serialize};

/// Single conversation turn as the DuckDuckGo chat endpoint accepts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuckMessage {
    /// Always "user": the backend only ever receives one flattened turn.
    pub role: String,
    pub content: String,
}

/// Body of `POST /duckchat/v1/chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuckChatRequest {
    /// Backend model identifier (already resolved through the allow-list).
    pub model: String,
    pub messages: Vec<DuckMessage>,
}
