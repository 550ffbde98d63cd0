//! Inbound forwarder: telephony socket -> resampler -> AI input stream.

use super::{CloseReason, MediaSource};
use crate::codec::{FrameCodec, StreamEvent};
use crate::resample::ResamplePipeline;
use callbridge_realtime::RealtimeSession;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Forwarder task body: one per session. Receives text frames from the
/// telephony socket, decodes them, resamples non-silent call audio, and
/// writes each produced chunk to the AI session's input stream in receipt
/// order. Non-audio events are logged and ignored here; call-control logic
/// lives outside the bridge.
pub async fn run(
    mut source: impl MediaSource,
    ai: Arc<dyn RealtimeSession>,
    mut pipeline: ResamplePipeline,
    codec: FrameCodec,
    forward_silence: bool,
    cancel: CancellationToken,
) -> CloseReason {
    let mut seq: u64 = 0;
    loop {
        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Inbound forwarder cancelled.");
                return CloseReason::Cancelled;
            }
            msg = source.recv() => match msg {
                Some(Ok(text)) => text,
                Some(Err(e)) => {
                    warn!(error = %e, "Unrecoverable media socket read error.");
                    return CloseReason::SocketError;
                }
                None => {
                    info!("Telephony peer closed the media stream.");
                    return CloseReason::SocketClosed;
                }
            },
        };

        match codec.decode(&text, seq) {
            StreamEvent::Audio(frame) => {
                seq += 1;
                if frame.silent && !forward_silence {
                    debug!(seq = frame.seq, "Dropping silent audio frame.");
                    continue;
                }
                for chunk in pipeline.push(&frame.payload) {
                    if let Err(e) = ai.send_input_audio(&chunk).await {
                        warn!(error = %e, "Failed to write audio to the AI session.");
                        return CloseReason::AiError;
                    }
                }
            }
            StreamEvent::AudioMetadata { encoding, sample_rate, channels } => {
                info!(?encoding, ?sample_rate, ?channels, "Media stream metadata received.");
            }
            StreamEvent::Dtmf { tone } => {
                info!(tone, "DTMF tone received; not handled by the audio bridge.");
            }
            StreamEvent::Unrecognized => {
                warn!("Dropping unrecognized media frame.");
            }
        }
    }
}
