use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use thiserror::Error;

use crate::models::chat::{ErrorDetail, ErrorResponse};

/// Every way a relay request can fail.
///
/// All variants render to the same `{"error":{...}}` body so callers need a
/// single error-handling path regardless of where the failure originated.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Malformed or incomplete request body.
    #[error("{0}")]
    InvalidRequest(String),
    /// Missing model, or one outside the allow-list.
    #[error("Please select the correct model: {}", .allowed.join(", "))]
    UnknownModel {
        model: Option<String>,
        allowed: Vec<String>,
    },
    /// API-key gate rejection.
    #[error("{0}")]
    Unauthorized(String),
    /// The status check used to obtain a session token did not succeed.
    #[error("DuckDuckGo status API failed with {}", .0.as_u16())]
    BackendUnavailable(StatusCode),
    /// The status check succeeded but carried no usable `x-vqd-4` header.
    #[error("DuckDuckGo status API did not return a session token")]
    TokenMissing,
    /// The chat call returned a non-success status without a recognizable error frame.
    #[error("DuckDuckGo chat API failed with {}", .0.as_u16())]
    ChatRejected(StatusCode),
    /// The backend reported an error frame (`"action":"error"`).
    #[error("DuckDuckGo Error: {kind}")]
    Backend { status: StatusCode, kind: String },
    /// The backend could not be reached or the exchange broke down.
    #[error("DuckDuckGo Error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidRequest(_) | RelayError::UnknownModel { .. } => {
                StatusCode::BAD_REQUEST
            }
            RelayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RelayError::ChatRejected(status) | RelayError::Backend { status, .. } => *status,
            RelayError::BackendUnavailable(_)
            | RelayError::TokenMissing
            | RelayError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// OpenAI-style error `type` string.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::InvalidRequest(_) | RelayError::UnknownModel { .. } => {
                "invalid_request_error"
            }
            RelayError::Unauthorized(_) => "auth_error",
            RelayError::Backend { .. } => "duck_error",
            RelayError::BackendUnavailable(_)
            | RelayError::TokenMissing
            | RelayError::ChatRejected(_)
            | RelayError::Transport(_) => "api_error",
        }
    }

    pub fn to_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                kind: self.kind().to_string(),
                code: self.status().as_u16(),
                param: None,
            },
        }
    }

    /// Build a backend error from the raw `status` and `type` fields of an error frame.
    /// Anything that is not a 4xx/5xx status falls back to 500.
    pub fn from_frame(status: Option<u64>, kind: Option<&str>) -> Self {
        let status = status
            .and_then(|s| u16::try_from(s).ok())
            .and_then(|s| StatusCode::from_u16(s).ok())
            .filter(|s| s.is_client_error() || s.is_server_error())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        RelayError::Backend {
            status,
            kind: kind.unwrap_or("unknown").to_string(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let RelayError::UnknownModel {
            model: Some(requested),
            ..
        } = &self
        {
            tracing::debug!(requested = %requested, "model not in allow-list");
        }
        if status.is_server_error() || matches!(self, RelayError::Backend { .. }) {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(self.to_body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_lists_allowed_models() {
        let err = RelayError::UnknownModel {
            model: Some("gpt-5".into()),
            allowed: vec!["a".into(), "b".into()],
        };
        let body = err.to_body();
        assert_eq!(body.error.code, 400);
        assert_eq!(body.error.kind, "invalid_request_error");
        assert_eq!(body.error.message, "Please select the correct model: a, b");
        assert_eq!(body.error.param, None);
    }

    #[test]
    fn backend_frame_status_passes_through() {
        let err = RelayError::from_frame(Some(429), Some("ERR_CONVERSATION_LIMIT"));
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.kind(), "duck_error");
        assert_eq!(err.to_string(), "DuckDuckGo Error: ERR_CONVERSATION_LIMIT");
    }

    #[test]
    fn backend_frame_without_usable_status_is_500() {
        assert_eq!(
            RelayError::from_frame(None, None).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RelayError::from_frame(Some(70_000), Some("x")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RelayError::from_frame(Some(42), Some("x")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RelayError::from_frame(Some(200), Some("x")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn status_failure_maps_to_api_error_500() {
        let err = RelayError::BackendUnavailable(StatusCode::FORBIDDEN);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind(), "api_error");
        assert_eq!(err.to_string(), "DuckDuckGo status API failed with 403");
    }
}
