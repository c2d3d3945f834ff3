//! Multi-agent chat endpoints.
//!
//! Both endpoints take the same multipart form:
//! - `text`: the new message (optional)
//! - `image`: a photo file (optional)
//! - `history`: JSON list of `{"role", "content"}` turns (optional)

use std::convert::Infallible;

use axum::extract::{Multipart, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::{routing::post, Json, Router};
use futures::stream::{self, BoxStream, StreamExt};
use haven_chat::{
    rejection_frames, Attachment, ChatError, ChatReply, Frame, History, RequestContext, TurnRequest,
};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/chat/multiagent/stream", post(stream_chat))
        .route("/api/chat/multiagent", post(chat))
}

/// Stream the answer as server-sent events.
///
/// Rejected input still gets an event stream (an error frame then `end`), with
/// status 400.
pub async fn stream_chat(State(state): State<AppState>, multipart: Multipart) -> Response {
    let context = RequestContext::anonymous();
    let request = match read_turn(multipart).await {
        Ok(request) => request,
        Err(message) => return rejection(StatusCode::BAD_REQUEST, message),
    };

    info!(request_id = %context.request_id, "Streaming chat request");
    match state.chat.start_turn(request, context).await {
        Ok(turn) => event_stream(StatusCode::OK, turn.into_frames()),
        Err(ChatError::Input(message)) => rejection(StatusCode::BAD_REQUEST, message),
        Err(e) => {
            warn!(error = %e, "Failed to start turn");
            rejection(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Answer with a single JSON body.
pub async fn chat(State(state): State<AppState>, multipart: Multipart) -> Result<Json<ChatReply>, AppError> {
    let context = RequestContext::anonymous();
    let request = read_turn(multipart).await.map_err(AppError::BadRequest)?;

    info!(request_id = %context.request_id, "Chat request");
    let reply = state.chat.respond(request, context).await?;
    Ok(Json(reply))
}

async fn read_turn(mut multipart: Multipart) -> Result<TurnRequest, String> {
    let mut request = TurnRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Invalid form data: {}", e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "text" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| format!("Invalid text field: {}", e))?;
                request.text = Some(text);
            }
            "image" => {
                let media_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_MEDIA_TYPE)
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| format!("Invalid image upload: {}", e))?;
                if !bytes.is_empty() {
                    request.image = Some(Attachment::new(bytes.to_vec(), media_type));
                }
            }
            "history" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| format!("Invalid history field: {}", e))?;
                request.history = History::from_json(&raw).unwrap_or_else(|e| {
                    warn!(error = %e, "Ignoring malformed history");
                    History::default()
                });
            }
            other => debug!(field = other, "Ignoring unknown form field"),
        }
    }

    Ok(request)
}

fn rejection(status: StatusCode, message: impl Into<String>) -> Response {
    event_stream(status, stream::iter(rejection_frames(message)).boxed())
}

fn event_stream(status: StatusCode, frames: BoxStream<'static, Frame>) -> Response {
    let events = frames.map(|frame| Ok::<_, Infallible>(to_event(&frame)));
    (
        status,
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(events),
    )
        .into_response()
}

fn to_event(frame: &Frame) -> Event {
    let mut event = Event::default();
    if let Some(name) = frame.event_name() {
        event = event.event(name);
    }
    event.data(frame.payload().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_is_event_stream() {
        let response = rejection(StatusCode::BAD_REQUEST, "Please provide text or an image.");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
        assert_eq!(response.headers().get("x-accel-buffering").unwrap(), "no");
    }
}
