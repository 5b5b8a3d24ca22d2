//! DuckDuckGo AI Chat client: session-token acquisition and chat request construction.
//!
//! The backend sits behind an anti-automation gate that inspects request headers.
//! [`BROWSER_HEADERS`] is the header set it is known to accept and must be sent
//! exactly as written.

use http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use http::StatusCode;

use crate::config::ModelCatalog;
use crate::conversion::to_duck_request;
use crate::error::RelayError;
use crate::relay::status_code;

pub const STATUS_PATH: &str = "/duckchat/v1/status";
pub const CHAT_PATH: &str = "/duckchat/v1/chat";

/// Header carrying the session token, on both the status response and the chat request.
pub const VQD_HEADER: &str = "x-vqd-4";

/// Fixed browser-like header set sent on every backend call.
pub const BROWSER_HEADERS: [(&str, &str); 15] = [
    (
        "user-agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:129.0) Gecko/20100101 Firefox/129.0",
    ),
    ("accept", "*/*"),
    ("accept-language", "en-US,en;q=0.5"),
    ("accept-encoding", "gzip, deflate, br, zstd"),
    ("referer", "https://duckduckgo.com/"),
    ("cache-control", "no-store"),
    ("x-vqd-accept", "1"),
    ("connection", "keep-alive"),
    ("cookie", "dcm=3"),
    ("sec-fetch-dest", "empty"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-site", "same-origin"),
    ("priority", "u=4"),
    ("pragma", "no-cache"),
    ("te", "trailers"),
];

pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(BROWSER_HEADERS.len() + 3);
    for (name, value) in BROWSER_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    headers
}

/// Opaque per-call authorization token obtained from the status endpoint.
///
/// Valid for a single chat call; never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken(HeaderValue);

impl SessionToken {
    pub fn as_header(&self) -> &HeaderValue {
        &self.0
    }

    /// Take the token from a status response's headers.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(VQD_HEADER)
            .filter(|v| !v.as_bytes().iter().all(u8::is_ascii_whitespace))
            .cloned()
            .map(Self)
    }
}

/// Client for the DuckDuckGo chat backend. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DuckChat {
    http: reqwest::Client,
    base_url: String,
    models: ModelCatalog,
}

impl DuckChat {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, models: ModelCatalog) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            models,
        }
    }

    pub fn models(&self) -> &ModelCatalog {
        &self.models
    }

    pub fn status_url(&self) -> String {
        format!("{}{STATUS_PATH}", self.base_url)
    }

    pub fn chat_url(&self) -> String {
        format!("{}{CHAT_PATH}", self.base_url)
    }

    /// Fetch a fresh session token. One attempt, no retries.
    pub async fn acquire_token(&self) -> Result<SessionToken, RelayError> {
        let resp = self
            .http
            .get(self.status_url())
            .headers(browser_headers())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RelayError::BackendUnavailable(status));
        }
        SessionToken::from_headers(resp.headers()).ok_or(RelayError::TokenMissing)
    }

    /// Compose the chat POST for `model` (a public id) carrying the flattened `prompt`.
    pub fn build_request(
        &self,
        model: &str,
        prompt: String,
        token: &SessionToken,
    ) -> Result<reqwest::RequestBuilder, RelayError> {
        let backend_model = self
            .models
            .resolve(model)
            .ok_or_else(|| RelayError::UnknownModel {
                model: Some(model.to_string()),
                allowed: self.models.ids(),
            })?;

        let mut headers = browser_headers();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(
            HeaderName::from_static(VQD_HEADER),
            token.as_header().clone(),
        );

        Ok(self
            .http
            .post(self.chat_url())
            .headers(headers)
            .json(&to_duck_request(backend_model, prompt)))
    }

    /// Acquire a token, send the chat request and return the streaming response.
    ///
    /// Non-success replies are turned into errors here, before any bytes reach the caller.
    pub async fn open_chat(
        &self,
        model: &str,
        prompt: String,
    ) -> Result<reqwest::Response, RelayError> {
        let token = self.acquire_token().await?;
        tracing::debug!("session token acquired");

        let resp = self.build_request(model, prompt, &token)?.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.bytes().await.unwrap_or_default();
        Err(rejected_chat_error(status, &body))
    }
}

/// Interpret a non-success chat reply. The backend usually explains itself with an
/// `{"action":"error",...}` object, either bare or framed as a `data:` line.
fn rejected_chat_error(status: StatusCode, body: &[u8]) -> RelayError {
    let text = String::from_utf8_lossy(body);
    text.lines()
        .map(str::trim)
        .map(|l| l.strip_prefix("data: ").unwrap_or(l))
        .filter_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
        .find(|v| v.get("action").and_then(|a| a.as_str()) == Some("error"))
        .map(|v| {
            RelayError::from_frame(
                v.get("status")
                    .and_then(status_code)
                    .or(Some(u64::from(status.as_u16()))),
                v.get("type").and_then(|t| t.as_str()),
            )
        })
        .unwrap_or(RelayError::ChatRejected(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> DuckChat {
        DuckChat::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/",
            ModelCatalog::default(),
        )
    }

    #[test]
    fn browser_headers_are_verbatim() {
        let headers = browser_headers();
        assert_eq!(headers.len(), 15);
        assert_eq!(
            headers["user-agent"],
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:129.0) Gecko/20100101 Firefox/129.0"
        );
        assert_eq!(headers["accept-encoding"], "gzip, deflate, br, zstd");
        assert_eq!(headers["referer"], "https://duckduckgo.com/");
        assert_eq!(headers["cookie"], "dcm=3");
        assert_eq!(headers["x-vqd-accept"], "1");
    }

    #[test]
    fn endpoints_hang_off_base_url() {
        let duck = client();
        assert_eq!(duck.status_url(), "http://127.0.0.1:9/duckchat/v1/status");
        assert_eq!(duck.chat_url(), "http://127.0.0.1:9/duckchat/v1/chat");
    }

    #[test]
    fn token_requires_non_blank_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(SessionToken::from_headers(&headers), None);
        headers.insert(VQD_HEADER, HeaderValue::from_static("  "));
        assert_eq!(SessionToken::from_headers(&headers), None);
        headers.insert(VQD_HEADER, HeaderValue::from_static("4-abc"));
        assert_eq!(
            SessionToken::from_headers(&headers).unwrap().as_header(),
            "4-abc"
        );
    }

    #[test]
    fn build_request_sets_headers_and_single_turn_body() {
        let duck = client();
        let token = SessionToken(HeaderValue::from_static("4-token"));
        let req = duck
            .build_request("gpt-4o-mini", "user: hi".into(), &token)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(req.method(), &http::Method::POST);
        assert_eq!(req.url().path(), CHAT_PATH);
        let h = req.headers();
        assert_eq!(h["accept"], "text/event-stream");
        assert_eq!(h["content-type"], "application/json");
        assert_eq!(h[VQD_HEADER], "4-token");
        assert_eq!(h["cookie"], "dcm=3");

        let body: serde_json::Value =
            serde_json::from_slice(req.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "user: hi"}]
            })
        );
    }

    #[test]
    fn build_request_rejects_unknown_model() {
        let duck = client();
        let token = SessionToken(HeaderValue::from_static("t"));
        let err = duck
            .build_request("gpt-5", String::new(), &token)
            .unwrap_err();
        assert!(matches!(err, RelayError::UnknownModel { .. }));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rejected_chat_reads_error_object() {
        let err = rejected_chat_error(
            StatusCode::TOO_MANY_REQUESTS,
            br#"{"action":"error","status":429,"type":"ERR_CONVERSATION_LIMIT"}"#,
        );
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.to_string(), "DuckDuckGo Error: ERR_CONVERSATION_LIMIT");

        let framed = rejected_chat_error(
            StatusCode::BAD_REQUEST,
            b"data: {\"action\":\"error\",\"type\":\"ERR_INVALID_VQD\"}\n\n",
        );
        assert_eq!(framed.status(), StatusCode::BAD_REQUEST);

        let string_status = rejected_chat_error(
            StatusCode::BAD_REQUEST,
            br#"{"action":"error","status":"418","type":"ERR_TEAPOT"}"#,
        );
        assert_eq!(string_status.status(), StatusCode::IM_A_TEAPOT);

        let opaque = rejected_chat_error(StatusCode::BAD_GATEWAY, b"<html>oops</html>");
        assert!(matches!(opaque, RelayError::ChatRejected(StatusCode::BAD_GATEWAY)));
    }
}
