//! Per-call audio bridge.
//!
//! One [`session::BridgeSession`] owns a call's bridge: three concurrent
//! tasks under a single cancellation scope.
//!
//! - `inbound`: telephony socket -> codec -> resampler -> AI input stream.
//! - `outbound`: ordered queue -> codec -> telephony socket.
//! - `events`: AI event stream -> barge-in control + audio deltas.
//!
//! The socket is read only by the inbound task and written only by the
//! outbound task; the AI input stream is written only by the inbound task
//! and its event stream read only by the events task. The tasks share
//! nothing else.

pub mod events;
pub mod inbound;
pub mod outbound;
pub mod session;

use anyhow::Result;
use async_trait::async_trait;

pub use outbound::OutboundSender;
pub use session::{BridgeSession, SessionHandle, SessionState};

/// Why a bridge task stopped. Any reason is fatal to the session (never to
/// the process); the supervisor turns the first one into teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The telephony peer closed its media stream.
    SocketClosed,
    /// The telephony socket failed unrecoverably.
    SocketError,
    /// The AI event stream ended without an error event.
    AiEnded,
    /// The AI session reported a fatal error.
    AiError,
    /// The shared cancellation scope fired (hang-up or teardown).
    Cancelled,
}

/// Write half of the telephony media socket. Implemented for the real
/// WebSocket sink and by test doubles.
#[async_trait]
pub trait MediaSink: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;
}

/// Read half of the telephony media socket. `None` means the peer closed.
#[async_trait]
pub trait MediaSource: Send {
    async fn recv(&mut self) -> Option<Result<String>>;
}
