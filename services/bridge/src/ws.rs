//! WebSocket entry point for telephony media streams.
//!
//! Each upgraded connection gets its own AI session and its own
//! [`BridgeSession`]; the socket halves are adapted to the bridge's
//! [`MediaSource`]/[`MediaSink`] traits here and nowhere else.

use crate::bridge::{BridgeSession, MediaSink, MediaSource};
use crate::state::AppState;
use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual media stream connection.
///
/// Connects the AI session first; if that fails the socket is dropped and
/// the platform sees an immediate close. Otherwise the bridge runs until
/// either side ends the call.
#[instrument(name = "media_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("New media stream connection. Connecting AI session...");
    let (client, events) = match callbridge_realtime::connect(
        &state.config.realtime_url,
        &state.config.openai_api_key,
    )
    .await
    {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = ?e, "Failed to connect the AI session; dropping media stream.");
            return;
        }
    };

    let session = BridgeSession::new(
        state.config.clone(),
        Arc::new(client),
        events,
        state.tools.clone(),
    );
    let session_id = session.id();
    tracing::Span::current().record("session_id", session_id.to_string());

    state
        .sessions
        .lock()
        .await
        .insert(session_id, session.handle());

    let (sink, source) = socket.split();
    let result = session
        .run(AxumMediaSource { stream: source }, AxumMediaSink { sink })
        .await;
    match result {
        Ok(reason) => info!(?reason, "Media session finished."),
        Err(e) => error!(error = ?e, "Media session terminated with error."),
    }

    state.sessions.lock().await.remove(&session_id);
}

/// Read half of the upgraded socket. Only text frames carry media protocol
/// messages; binary and ping/pong frames are skipped.
struct AxumMediaSource {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl MediaSource for AxumMediaSource {
    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            return match self.stream.next().await? {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(Message::Close(_)) => None,
                Ok(_) => continue,
                Err(e) => Some(Err(e.into())),
            };
        }
    }
}

/// Write half of the upgraded socket.
struct AxumMediaSink {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl MediaSink for AxumMediaSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sink.send(Message::Text(text.into())).await?;
        Ok(())
    }
}
