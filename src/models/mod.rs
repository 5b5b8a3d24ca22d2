//! Wire models for both sides of the relay.
//!
//! - `chat`: the OpenAI Chat Completions subset accepted from callers and the
//!   completion, chunk, model-list and error shapes returned to them.
//! - `duck`: the request body sent to the DuckDuckGo chat endpoint.
//!
//! Backend stream frames are parsed loosely in `crate::relay` rather than
//! through typed models, since the backend format is undocumented.

pub mod chat;
pub mod duck;

pub use chat::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ErrorResponse,
    ModelList, Role,
};
pub use duck::{DuckChatRequest, DuckMessage};
