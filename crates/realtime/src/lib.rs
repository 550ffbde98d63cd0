//! Client for the OpenAI-style realtime voice API.
//!
//! The protocol is a WebSocket carrying JSON events tagged by `type`. This
//! crate exposes the typed event vocabulary (`types`), a tungstenite-backed
//! client (`client`), and the narrow [`RealtimeSession`] trait that audio
//! bridges program against so the session can be mocked in tests.

pub mod client;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;

pub use client::{RealtimeClient, connect};
pub use types::{ClientEvent, ConversationItem, ServerEvent, SessionConfig, TurnDetection};

/// The operations a live bridge performs against an established session.
///
/// The event stream is delivered separately (an `mpsc::Receiver<ServerEvent>`
/// from [`connect`]) so exactly one task can own the receive side.
#[async_trait]
pub trait RealtimeSession: Send + Sync {
    /// Appends raw PCM16 audio to the session's input buffer.
    async fn send_input_audio(&self, audio: &[u8]) -> Result<()>;

    /// Adds a conversation item, e.g. a function-call output or seed context.
    async fn add_item(&self, item: ConversationItem) -> Result<()>;

    /// Asks the model to start generating a response turn.
    async fn start_response(&self) -> Result<()>;

    /// Applies session-wide configuration (voice, formats, turn detection).
    async fn configure(&self, config: SessionConfig) -> Result<()>;

    /// Closes the underlying connection.
    async fn close(&self) -> Result<()>;
}
