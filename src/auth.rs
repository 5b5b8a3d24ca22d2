//! Inbound API-key gate.
//!
//! When the configured key set is empty every request passes. Otherwise the
//! request must carry `Authorization: Bearer <key>` with a configured key.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::AUTHORIZATION;

use crate::error::RelayError;
use crate::util::AppState;

/// Outcome of checking an `Authorization` header against the key set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Key set is empty; nothing to check.
    Disabled,
    Valid,
    Missing,
    Invalid,
}

impl Verification {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verification::Disabled | Verification::Valid)
    }

    fn reason(&self) -> &'static str {
        match self {
            Verification::Missing => "Missing Authorization header",
            _ => "Invalid API key",
        }
    }
}

/// Check a raw `Authorization` header value.
pub fn verify_bearer(keys: &HashSet<String>, header: Option<&str>) -> Verification {
    if keys.is_empty() {
        return Verification::Disabled;
    }
    let Some(header) = header else {
        return Verification::Missing;
    };

    let mut parts = header.split(' ');
    match (parts.next(), parts.next()) {
        (Some("Bearer"), Some(key)) if !key.is_empty() && keys.contains(key) => {
            Verification::Valid
        }
        _ => Verification::Invalid,
    }
}

/// axum middleware guarding the `/v1` routes.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let verification = verify_bearer(&state.config.api_keys, header);
    if verification.is_allowed() {
        return next.run(req).await;
    }
    RelayError::Unauthorized(verification.reason().to_string()).into_response()
}
