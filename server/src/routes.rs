use std::convert::Infallible;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use chatrelay_core::{AggregateResponse, CompletionRequest, Relay, StreamEvent};
use futures::{Stream, StreamExt as _};

use crate::error::ApiError;

/// Header carrying the caller's application id.
pub const APP_ID_HEADER: &str = "x-app-id";

#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(completions))
        .route("/v1/chat/completions/json", post(completions_json))
        .route("/health", get(health))
        .with_state(state)
}

fn app_id(headers: &HeaderMap) -> String {
    headers
        .get(APP_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Streaming protocol. Validation failures are plain JSON errors; once the
/// stream is open, failures arrive as a terminal `error` event.
async fn completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CompletionRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(request) = payload?;
    let events = state.relay.stream(&app_id(&headers), &request).await?;
    tracing::debug!(run_id = %events.run_id(), "SSE stream opened");
    let stream = events
        .into_stream()
        .map(|event| Ok::<_, Infallible>(to_sse_event(&event)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Buffered protocol.
async fn completions_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CompletionRequest>, JsonRejection>,
) -> Result<Json<AggregateResponse>, ApiError> {
    let Json(request) = payload?;
    let response = state.relay.complete(&app_id(&headers), &request).await?;
    Ok(Json(response))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn to_sse_event(event: &StreamEvent) -> Event {
    match Event::default().event(event.event_name()).json_data(event) {
        Ok(sse) => sse,
        Err(err) => {
            tracing::error!(error = %err, "failed to encode stream event");
            Event::default()
                .event("error")
                .data(r#"{"error":"failed to encode stream event"}"#)
        }
    }
}
