//! AI event loop and barge-in controller.
//!
//! One task per session iterates the AI session's event stream and performs
//! a pure dispatch per event. The barge-in guarantee lives here: when the
//! caller starts speaking, a `StopAudio` control frame is enqueued before
//! any audio produced afterwards, so the telephony side discards queued
//! playback and at most one utterance is ever audible.

use super::{CloseReason, OutboundSender};
use crate::resample::ResamplePipeline;
use crate::tools::ToolHandler;
use callbridge_realtime::{ConversationItem, RealtimeSession, ServerEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Event loop task body.
pub async fn run(
    mut events: mpsc::Receiver<ServerEvent>,
    session: Arc<dyn RealtimeSession>,
    outbound: OutboundSender,
    mut pipeline: ResamplePipeline,
    tools: Arc<dyn ToolHandler>,
    cancel: CancellationToken,
) -> CloseReason {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("AI event loop cancelled.");
                return CloseReason::Cancelled;
            }
            event = events.recv() => match event {
                Some(event) => event,
                None => {
                    info!("AI event stream ended.");
                    return CloseReason::AiEnded;
                }
            },
        };

        match event {
            ServerEvent::SpeechStarted { audio_start_ms } => {
                info!(audio_start_ms, "Caller speech detected; stopping AI playback.");
                // The truncated utterance's buffered tail must not leak
                // into the next turn.
                pipeline.reset();
                outbound.stop_audio();
            }
            ServerEvent::SpeechStopped { audio_end_ms } => {
                debug!(audio_end_ms, "Caller speech ended.");
            }
            ServerEvent::AudioDelta { delta, .. } => {
                let Some(pcm) = ServerEvent::decode_audio_delta(&delta) else {
                    warn!("Dropping audio delta with undecodable payload.");
                    continue;
                };
                let target_rate = pipeline.format().target_rate;
                for chunk in pipeline.push(&pcm) {
                    outbound.audio_chunk(chunk, target_rate);
                }
            }
            ServerEvent::OutputItemDone { item } if item.is_function_call() => {
                if let Err(e) = handle_function_call(&item, session.as_ref(), tools.as_ref()).await {
                    warn!(error = %e, "Tool call failed; continuing without a result.");
                }
            }
            ServerEvent::ResponseDone { response } => {
                debug!(status = ?response.status, "Model turn finished.");
                // Emit the utterance's buffered tail, then let generation
                // resume if the turn produced tool calls.
                let target_rate = pipeline.format().target_rate;
                for chunk in pipeline.flush() {
                    outbound.audio_chunk(chunk, target_rate);
                }
                if response.output.iter().any(|item| item.is_function_call()) {
                    if let Err(e) = session.start_response().await {
                        warn!(error = %e, "Failed to resume generation after tool calls.");
                    }
                }
            }
            ServerEvent::AudioTranscriptDelta { delta } => {
                trace!(delta, "Output transcript delta.");
            }
            ServerEvent::InputTranscriptionCompleted { transcript } => {
                info!(transcript, "Caller audio transcript.");
            }
            ServerEvent::Error { error: api_error } => {
                error!(message = %api_error.message, code = ?api_error.code, "AI session error.");
                return CloseReason::AiError;
            }
            ServerEvent::SessionCreated {}
            | ServerEvent::SessionUpdated {}
            | ServerEvent::OutputItemDone { .. }
            | ServerEvent::Unknown => {
                trace!("AI event with no bridge-side effect.");
            }
        }
    }
}

async fn handle_function_call(
    item: &ConversationItem,
    session: &dyn RealtimeSession,
    tools: &dyn ToolHandler,
) -> anyhow::Result<()> {
    let name = item.name.as_deref().unwrap_or_default();
    let arguments = item.arguments.as_deref().unwrap_or("{}");
    let call_id = item
        .call_id
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("function call item without call_id"))?;

    info!(tool = name, "Invoking tool handler.");
    let output = tools.handle(name, arguments)?;
    session
        .add_item(ConversationItem::function_call_output(call_id, output))
        .await
}
