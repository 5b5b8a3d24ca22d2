#![forbid(unsafe_code)]
#![doc = r#"
DDG2API

Expose DuckDuckGo AI Chat behind an OpenAI Chat Completions compatible API.

Crate highlights
- Library: message flattening (`flatten_messages`), the backend client (`upstream::DuckChat`)
  and the stream relay engine (`relay`) are usable on their own.
- HTTP server (in `server`): `GET /v1/models` and `POST /v1/chat/completions`, optionally
  under a path prefix and behind an API-key gate.

Modules
- `models`: Wire types for the OpenAI side and the backend request body.
- `conversion`: Conversation flattening into the backend's single-turn format.
- `upstream`: Session-token acquisition and chat request construction.
- `relay`: Event-stream framing, frame parsing and the buffered/live drivers.
- `format`: OpenAI completion and chunk formatting.
- `server`: Axum router/handlers (the binary uses this).
- `auth`, `config`, `error`, `util`: API-key gate, startup configuration, error taxonomy, shared helpers.

Note: the backend is undocumented; its header gate and stream format are reproduced as observed.
"#]

pub mod auth;
pub mod config;
pub mod conversion;
pub mod error;
pub mod format;
pub mod models;
pub mod relay;
pub mod server;
pub mod upstream;
pub mod util;

pub use crate::config::{ModelCatalog, RelayConfig};
pub use crate::conversion::flatten_messages;
pub use crate::error::RelayError;

// Re-export model namespaces for convenience (downstream users can do `use ddg2api::chat`).
pub use crate::models::{chat, duck};
