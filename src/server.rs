use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::require_api_key;
use crate::conversion::flatten_messages;
use crate::error::RelayError;
use crate::format::format_aggregate;
use crate::models::chat::{ChatCompletionRequest, ModelCard, ModelList};
use crate::relay::{collect_text, forward_chunks};
use crate::util::{cors_layer_from_env, AppState};

/// Frames buffered between the relay task and the response body.
const LIVE_CHANNEL_CAPACITY: usize = 32;

/// Build the Axum router: `/v1/models` and `/v1/chat/completions` under the
/// configured prefix (behind the API-key gate), plus an open `/status` probe.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let prefix = state.config.path_prefix.clone();
    let api = if prefix.is_empty() {
        api
    } else {
        Router::new().nest(&prefix, api)
    };

    Router::new()
        .route("/status", get(status))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer_from_env())
}

/// Service status endpoint exposing version and route information.
async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let prefix = &state.config.path_prefix;
    let routes = vec![
        "/status".to_string(),
        format!("{prefix}/v1/models"),
        format!("{prefix}/v1/chat/completions"),
    ];
    Json(serde_json::json!({
        "name": "ddg2api",
        "version": env!("CARGO_PKG_VERSION"),
        "auth_enabled": state.config.auth_enabled(),
        "routes": routes
    }))
}

async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelList> {
    Json(ModelList {
        object: "list".to_string(),
        data: state
            .config
            .models
            .entries()
            .iter()
            .map(|e| ModelCard {
                id: e.id.clone(),
                object: "model".to_string(),
                owned_by: "duckduckgo".to_string(),
            })
            .collect(),
    })
}

/// Relay a Chat Completions request to the backend.
/// - Non-streaming: drain the backend stream and answer with one completion object
/// - Streaming: re-emit each backend message as a completion chunk
#[tracing::instrument(
    skip_all,
    fields(
        request_id = %Uuid::new_v4(),
        model = tracing::field::Empty,
        stream = tracing::field::Empty
    )
)]
async fn chat_completions(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response, RelayError> {
    let Json(req) = payload.map_err(|e| RelayError::InvalidRequest(e.body_text()))?;

    let messages = req
        .messages
        .as_deref()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| {
            RelayError::InvalidRequest(
                "Messages is required and must be a non-empty array".to_string(),
            )
        })?;

    let model = match req.model.as_deref() {
        Some(m) if state.config.models.resolve(m).is_some() => m,
        other => {
            return Err(RelayError::UnknownModel {
                model: other.map(str::to_string),
                allowed: state.config.models.ids(),
            })
        }
    };

    let wants_stream = req.wants_stream();
    let span = tracing::Span::current();
    span.record("model", model);
    span.record("stream", wants_stream);

    let prompt = flatten_messages(messages);
    tracing::debug!(
        messages = messages.len(),
        prompt_chars = prompt.chars().count(),
        "forwarding conversation"
    );

    let resp = state.backend.open_chat(model, prompt).await?;
    let body = Box::pin(resp.bytes_stream());

    if !wants_stream {
        let text = collect_text(body).await?;
        return Ok(Json(format_aggregate(text, model)).into_response());
    }

    let (tx, rx) = mpsc::channel::<String>(LIVE_CHANNEL_CAPACITY);
    tokio::spawn(forward_chunks(body, model.to_string(), tx));

    let frames = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (Ok::<_, Infallible>(frame), rx))
    });

    Ok((
        [
            (CONTENT_TYPE, "text/event-stream"),
            (CACHE_CONTROL, "no-cache"),
            (CONNECTION, "keep-alive"),
        ],
        Body::from_stream(frames),
    )
        .into_response())
}
