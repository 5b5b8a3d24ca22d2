#![allow(dead_code)]

//! Shared harness for relay integration tests.
//!
//! `BackendStub` stands in for the DuckDuckGo backend on an ephemeral port: it
//! serves `/duckchat/v1/status` and `/duckchat/v1/chat` with scripted replies and
//! records every call. `TestServer` runs the real relay router pointed at the stub.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use ddg2api::config::{HttpSettings, RelayConfig};
use ddg2api::server::build_router;
use ddg2api::util::AppState;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const STUB_TOKEN: &str = "4-123456789012345678901234567890";

/// Scripted backend behaviour.
#[derive(Clone)]
pub struct StubScript {
    pub status_code: StatusCode,
    pub token: Option<String>,
    pub chat_status: StatusCode,
    /// Written to the chat response body one element per network chunk.
    pub chat_chunks: Vec<String>,
}

impl StubScript {
    /// Successful token exchange followed by the given event-stream chunks.
    pub fn stream(chunks: &[&str]) -> Self {
        Self {
            status_code: StatusCode::OK,
            token: Some(STUB_TOKEN.to_string()),
            chat_status: StatusCode::OK,
            chat_chunks: chunks.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Default)]
struct Recorded {
    chat_headers: Vec<HeaderMap>,
    chat_bodies: Vec<serde_json::Value>,
}

struct StubState {
    script: StubScript,
    status_calls: AtomicUsize,
    chat_calls: AtomicUsize,
    recorded: Mutex<Recorded>,
}

pub struct BackendStub {
    base_url: String,
    state: Arc<StubState>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl BackendStub {
    pub async fn start(script: StubScript) -> Self {
        let state = Arc::new(StubState {
            script,
            status_calls: AtomicUsize::new(0),
            chat_calls: AtomicUsize::new(0),
            recorded: Mutex::new(Recorded::default()),
        });

        let router = Router::new()
            .route("/duckchat/v1/status", get(status_handler))
            .route("/duckchat/v1/chat", post(chat_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind backend stub");
        let addr = listener.local_addr().expect("backend stub local addr");
        let (tx, rx) = oneshot::channel::<()>();

        let server = axum::serve(listener, router.into_make_service());
        tokio::spawn(async move {
            tokio::select! {
                res = server => {
                    if let Err(err) = res {
                        eprintln!("Backend stub server error: {err:?}");
                    }
                }
                _ = rx => {}
            }
        });

        BackendStub {
            base_url: format!("http://{}", addr),
            state,
            shutdown: Mutex::new(Some(tx)),
        }
    }

    pub fn url(&self) -> String {
        self.base_url.clone()
    }

    pub fn status_calls(&self) -> usize {
        self.state.status_calls.load(Ordering::SeqCst)
    }

    pub fn chat_calls(&self) -> usize {
        self.state.chat_calls.load(Ordering::SeqCst)
    }

    pub fn chat_headers(&self) -> Vec<HeaderMap> {
        self.state.recorded.lock().expect("lock").chat_headers.clone()
    }

    pub fn chat_bodies(&self) -> Vec<serde_json::Value> {
        self.state.recorded.lock().expect("lock").chat_bodies.clone()
    }
}

impl Drop for BackendStub {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.shutdown.lock() {
            if let Some(tx) = guard.take() {
                let _ = tx.send(());
            }
        }
    }
}

async fn status_handler(State(state): State<Arc<StubState>>) -> Response {
    state.status_calls.fetch_add(1, Ordering::SeqCst);
    let mut resp = (state.script.status_code, "").into_response();
    if let Some(token) = &state.script.token {
        resp.headers_mut()
            .insert("x-vqd-4", token.parse().expect("token header"));
    }
    resp
}

async fn chat_handler(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.chat_calls.fetch_add(1, Ordering::SeqCst);
    {
        let mut recorded = state.recorded.lock().expect("lock");
        recorded.chat_headers.push(headers);
        recorded
            .chat_bodies
            .push(serde_json::from_str(&body).unwrap_or(serde_json::Value::Null));
    }

    let chunks: Vec<Result<String, Infallible>> =
        state.script.chat_chunks.iter().cloned().map(Ok).collect();
    Response::builder()
        .status(state.script.chat_status)
        .header("content-type", "text/event-stream")
        .body(Body::from_stream(futures_util::stream::iter(chunks)))
        .expect("stub response")
}

/// The relay router bound to an ephemeral port.
pub struct TestServer {
    pub base_url: String,
    pub addr: SocketAddr,
    join: JoinHandle<()>,
    client: reqwest::Client,
}

impl TestServer {
    fn make_client() -> reqwest::Client {
        reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed building reqwest client")
    }

    pub async fn get(&self, path: &str, auth_bearer: Option<&str>) -> reqwest::Response {
        let mut rb = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(b) = auth_bearer {
            rb = rb.bearer_auth(b);
        }
        rb.send().await.expect("request")
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
        auth_bearer: Option<&str>,
    ) -> reqwest::Response {
        let mut rb = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body);
        if let Some(b) = auth_bearer {
            rb = rb.bearer_auth(b);
        }
        rb.send().await.expect("request")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.join.abort();
    }
}

/// Relay configuration pointing at `backend_url`, with the given API keys.
pub fn relay_config(backend_url: &str, api_keys: &[&str]) -> RelayConfig {
    RelayConfig {
        api_keys: api_keys.iter().map(|k| k.to_string()).collect(),
        backend_base_url: backend_url.to_string(),
        http: HttpSettings {
            no_proxy: true,
            ..HttpSettings::default()
        },
        ..RelayConfig::default()
    }
}

pub async fn spawn_relay(config: RelayConfig) -> TestServer {
    let state = Arc::new(AppState::new(config).expect("app state"));
    let app = build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let base_url = format!("http://{}", addr);
    let server = axum::serve(listener, app.into_make_service());

    let join = tokio::spawn(async move {
        if let Err(e) = server.await {
            eprintln!("Test server error: {e:?}");
        }
    });

    TestServer {
        base_url,
        addr,
        join,
        client: TestServer::make_client(),
    }
}

/// Spawn a backend stub and a relay wired to it, without API keys.
pub async fn spawn_pair(script: StubScript) -> (BackendStub, TestServer) {
    let stub = BackendStub::start(script).await;
    let relay = spawn_relay(relay_config(&stub.url(), &[])).await;
    (stub, relay)
}

pub fn chat_request(stream: bool) -> serde_json::Value {
    serde_json::json!({
        "model": "gpt-4o-mini",
        "messages": [
            {"role": "system", "content": "Be brief."},
            {"role": "user", "content": "Hello"}
        ],
        "stream": stream
    })
}

/// Split an event-stream body into its JSON payloads.
pub fn sse_payloads(body: &str) -> Vec<serde_json::Value> {
    body.split("\n\n")
        .filter(|f| !f.trim().is_empty())
        .map(|f| {
            let json = f.strip_prefix("data: ").expect("data: prefix");
            serde_json::from_str(json).expect("frame json")
        })
        .collect()
}
