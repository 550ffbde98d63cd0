//! WebSocket client for the realtime voice API.

use crate::types::{ClientEvent, ConversationItem, ServerEvent, SessionConfig};
use crate::RealtimeSession;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// Buffered depth of the server-event channel handed to the consumer.
const EVENT_CHANNEL_SIZE: usize = 256;

/// Handle to an established realtime session.
///
/// Cheap to share behind an `Arc`; all writes are serialized through one
/// internal sink. The matching event stream is returned by [`connect`].
pub struct RealtimeClient {
    sink: Mutex<WsSink>,
}

/// Connects and authenticates, returning the client handle plus the stream
/// of server events. The reader task ends (closing the channel) when the
/// server closes the connection or the receiver is dropped.
pub async fn connect(
    url: &str,
    api_key: &SecretString,
) -> Result<(RealtimeClient, mpsc::Receiver<ServerEvent>)> {
    let mut request = url
        .into_client_request()
        .context("Invalid realtime endpoint URL")?;
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", api_key.expose_secret()).parse()?,
    );
    request
        .headers_mut()
        .insert("OpenAI-Beta", "realtime=v1".parse()?);

    let (ws_stream, _) = connect_async(request)
        .await
        .context("Failed to connect to realtime WebSocket")?;
    info!("Connected to realtime voice API.");

    let (sink, mut stream) = ws_stream.split();
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);

    tokio::spawn(async move {
        while let Some(msg_result) = stream.next().await {
            let msg = match msg_result {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(error = %e, "Realtime socket read failed.");
                    break;
                }
            };
            match msg {
                WsMessage::Text(text) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => {
                        if event_tx.send(event).await.is_err() {
                            debug!("Event receiver dropped; stopping reader.");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Dropping undecodable server event."),
                },
                WsMessage::Close(_) => {
                    info!("Realtime server closed the connection.");
                    break;
                }
                _ => {}
            }
        }
    });

    Ok((RealtimeClient { sink: Mutex::new(sink) }, event_rx))
}

impl RealtimeClient {
    async fn send(&self, event: &ClientEvent) -> Result<()> {
        let text = serde_json::to_string(event)?;
        let mut sink = self.sink.lock().await;
        sink.send(WsMessage::Text(text.into())).await?;
        Ok(())
    }
}

#[async_trait]
impl RealtimeSession for RealtimeClient {
    async fn send_input_audio(&self, audio: &[u8]) -> Result<()> {
        self.send(&ClientEvent::audio_append(audio)).await
    }

    async fn add_item(&self, item: ConversationItem) -> Result<()> {
        self.send(&ClientEvent::ConversationItemCreate { item }).await
    }

    async fn start_response(&self) -> Result<()> {
        self.send(&ClientEvent::ResponseCreate {}).await
    }

    async fn configure(&self, config: SessionConfig) -> Result<()> {
        self.send(&ClientEvent::SessionUpdate { session: config }).await
    }

    async fn close(&self) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(WsMessage::Close(None)).await.ok();
        sink.close().await.ok();
        Ok(())
    }
}
