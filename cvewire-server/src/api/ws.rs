//! `GET /ws`: upgrade an authenticated request into a hub session.

use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use cvewire_core::session::{CloseReason, Frame, Session, SessionConfig};
use futures_util::{SinkExt, StreamExt, future};

use crate::api::extractors::AuthenticatedIdentity;
use crate::state::AppState;

/// Transport cap on a single inbound frame. The session enforces the
/// configured (smaller) limit itself so it can answer with an error
/// envelope before closing.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Upgrades the HTTP connection to a WebSocket and hands it to a
/// [`Session`]. Requests without a valid identity token are answered
/// with `401` and never upgraded.
pub async fn hub_ws(
    state: State<AppState>,
    AuthenticatedIdentity(identity): AuthenticatedIdentity,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let app_state = state.0.clone();
    ws.max_message_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| async move {
            let config = SessionConfig::from(app_state.config.hub.current().as_ref());
            let session = Session::new(identity, app_state.hub.clone(), config);
            run_session(socket, session).await;
        })
}

async fn run_session(socket: WebSocket, session: Session) {
    let id = session.id();
    let (sink, stream) = socket.split();
    let sink = sink.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(to_message(frame))));
    let stream = stream.map(|message| message.map(from_message));

    match session.run(sink, stream).await {
        Ok(cause) => tracing::debug!(connection_id = %id, cause = ?cause, "WebSocket closed"),
        Err(e) => tracing::debug!(connection_id = %id, error = %e, "WebSocket refused"),
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data),
        Frame::Ping(data) => Message::Ping(data),
        Frame::Pong(data) => Message::Pong(data),
        Frame::Close(reason) => Message::Close(reason.map(|r| CloseFrame {
            code: r.code,
            reason: r.reason.into(),
        })),
    }
}

fn from_message(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Binary(data) => Frame::Binary(data),
        Message::Ping(data) => Frame::Ping(data),
        Message::Pong(data) => Frame::Pong(data),
        Message::Close(frame) => Frame::Close(frame.map(|f| CloseReason {
            code: f.code,
            reason: f.reason.as_str().to_owned(),
        })),
    }
}
