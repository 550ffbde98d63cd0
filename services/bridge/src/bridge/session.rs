//! Session supervisor: owns one call's bridge lifetime.

use super::{events, inbound, outbound, CloseReason, MediaSink, MediaSource};
use crate::codec::FrameCodec;
use crate::config::Config;
use crate::frames::ResampleFormat;
use crate::resample::ResamplePipeline;
use crate::tools::ToolHandler;
use anyhow::{Context, Result};
use callbridge_realtime::types::InputAudioTranscription;
use callbridge_realtime::{RealtimeSession, ServerEvent, SessionConfig, TurnDetection};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// Lifecycle of one bridged call. `Closed` is terminal; a new call gets a
/// new supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Active,
    Closing,
    Closed,
}

/// Cloneable handle handed to the call-control collaborator. `stop()` is
/// the hang-up entry point; calling it more than once is a no-op.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Requests teardown of the session. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Resolves once the supervisor reaches `Closed`.
    pub async fn closed(&mut self) {
        while self.state() != SessionState::Closed {
            if self.state.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Supervisor for one call's bridge: a single cancellation scope, the AI
/// session handle, and the three bridge tasks.
pub struct BridgeSession {
    id: Uuid,
    config: Arc<Config>,
    ai: Arc<dyn RealtimeSession>,
    ai_events: mpsc::Receiver<ServerEvent>,
    tools: Arc<dyn ToolHandler>,
    cancel: CancellationToken,
    state_tx: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,
}

impl BridgeSession {
    pub fn new(
        config: Arc<Config>,
        ai: Arc<dyn RealtimeSession>,
        ai_events: mpsc::Receiver<ServerEvent>,
        tools: Arc<dyn ToolHandler>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::Initializing);
        BridgeSession {
            id: Uuid::new_v4(),
            config,
            ai,
            ai_events,
            tools,
            cancel: CancellationToken::new(),
            state_tx,
            state_rx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id,
            cancel: self.cancel.clone(),
            state: self.state_rx.clone(),
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }

    /// Runs the bridge to completion: configures the AI session, runs the
    /// three tasks under the shared cancellation scope, and tears everything
    /// down once any of them reports a terminal condition.
    pub async fn run(
        mut self,
        source: impl MediaSource + 'static,
        sink: impl MediaSink + 'static,
    ) -> Result<CloseReason> {
        let audio = &self.config.audio;
        let session_config = SessionConfig {
            modalities: Some(vec!["text".to_string(), "audio".to_string()]),
            instructions: Some(self.config.system_prompt.clone()),
            voice: Some(self.config.voice.clone()),
            input_audio_format: Some("pcm16".to_string()),
            output_audio_format: Some("pcm16".to_string()),
            input_audio_transcription: Some(InputAudioTranscription {
                model: "whisper-1".to_string(),
            }),
            turn_detection: Some(TurnDetection::ServerVad {
                threshold: Some(0.5),
                prefix_padding_ms: Some(200),
                silence_duration_ms: Some(500),
                create_response: Some(true),
                interrupt_response: Some(true),
            }),
            tools: None,
            temperature: None,
        };
        self.ai
            .configure(session_config)
            .await
            .context("Failed to configure the AI session")?;

        let inbound_pipeline =
            ResamplePipeline::new(ResampleFormat::new(audio.telephony_rate, audio.ai_rate, audio.chunk_bytes))
                .context("Failed to build the inbound resampling pipeline")?;
        let outbound_pipeline =
            ResamplePipeline::new(ResampleFormat::new(audio.ai_rate, audio.telephony_rate, audio.chunk_bytes))
                .context("Failed to build the outbound resampling pipeline")?;
        let codec = FrameCodec::new(audio.telephony_rate);

        let (outbound_tx, outbound_rx) = outbound::queue();
        let (done_tx, mut done_rx) = mpsc::channel::<CloseReason>(3);

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(3);
        handles.push(spawn_task(
            "inbound",
            done_tx.clone(),
            inbound::run(
                source,
                self.ai.clone(),
                inbound_pipeline,
                codec,
                audio.forward_silence,
                self.cancel.clone(),
            ),
        ));
        handles.push(spawn_task(
            "outbound",
            done_tx.clone(),
            outbound::run(outbound_rx, sink, codec, self.cancel.clone()),
        ));
        let ai_events = std::mem::replace(&mut self.ai_events, mpsc::channel(1).1);
        handles.push(spawn_task(
            "events",
            done_tx.clone(),
            events::run(
                ai_events,
                self.ai.clone(),
                outbound_tx,
                outbound_pipeline,
                self.tools.clone(),
                self.cancel.clone(),
            ),
        ));
        drop(done_tx);

        self.set_state(SessionState::Active);
        info!(session_id = %self.id, "Bridge session active.");

        // The first task to stop decides the session's fate; the rest are
        // cancelled and joined.
        let reason = done_rx.recv().await.unwrap_or(CloseReason::Cancelled);
        self.set_state(SessionState::Closing);
        info!(session_id = %self.id, ?reason, "Bridge session closing.");
        self.cancel.cancel();

        let grace = Duration::from_millis(self.config.close_grace_ms);
        for handle in handles {
            let abort = handle.abort_handle();
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!(session_id = %self.id, "Bridge task missed the close grace period; aborting it.");
                abort.abort();
            }
        }

        if let Err(e) = self.ai.close().await {
            warn!(error = %e, "Failed to close the AI session cleanly.");
        }
        self.set_state(SessionState::Closed);
        info!(session_id = %self.id, "Bridge session closed.");
        Ok(reason)
    }
}

fn spawn_task(
    name: &'static str,
    done: mpsc::Sender<CloseReason>,
    task: impl std::future::Future<Output = CloseReason> + Send + 'static,
) -> JoinHandle<()> {
    let span = tracing::info_span!("bridge_task", task = name);
    tokio::spawn(
        async move {
            let reason = task.await;
            // A full buffer means another task already reported; that
            // report wins.
            let _ = done.try_send(reason);
        }
        .instrument(span),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio;
    use crate::config::{AudioConfig, Config};
    use crate::tools::NoopToolHandler;
    use anyhow::Result;
    use async_trait::async_trait;
    use callbridge_realtime::ConversationItem;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tracing::Level;

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            openai_api_key: "test".to_string().into(),
            realtime_url: "wss://example.test/realtime".to_string(),
            voice: "alloy".to_string(),
            system_prompt: "test prompt".to_string(),
            audio: AudioConfig {
                telephony_rate: 16000,
                ai_rate: 24000,
                chunk_bytes: 640,
                forward_silence: false,
            },
            close_grace_ms: 1000,
            log_level: Level::INFO,
        })
    }

    #[derive(Default)]
    struct CountingAi {
        configured: AtomicU32,
        closed: AtomicU32,
        audio_writes: AtomicU32,
    }

    #[async_trait]
    impl RealtimeSession for CountingAi {
        async fn send_input_audio(&self, _audio: &[u8]) -> Result<()> {
            self.audio_writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn add_item(&self, _item: ConversationItem) -> Result<()> {
            Ok(())
        }
        async fn start_response(&self) -> Result<()> {
            Ok(())
        }
        async fn configure(&self, _config: SessionConfig) -> Result<()> {
            self.configured.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Media source that yields scripted frames, then waits forever (like a
    /// live socket with no traffic) until cancelled.
    struct ScriptedThenIdleSource {
        frames: VecDeque<String>,
    }

    #[async_trait]
    impl MediaSource for ScriptedThenIdleSource {
        async fn recv(&mut self) -> Option<Result<String>> {
            match self.frames.pop_front() {
                Some(frame) => Some(Ok(frame)),
                None => std::future::pending().await,
            }
        }
    }

    /// Media source whose peer closes after the scripted frames.
    struct ClosingSource {
        frames: VecDeque<String>,
    }

    #[async_trait]
    impl MediaSource for ClosingSource {
        async fn recv(&mut self) -> Option<Result<String>> {
            self.frames.pop_front().map(Ok)
        }
    }

    struct CollectingSink {
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl MediaSink for CollectingSink {
        async fn send_text(&mut self, text: String) -> Result<()> {
            self.sent.lock().unwrap().push(text);
            Ok(())
        }
    }

    fn audio_frame_json(bytes: usize) -> String {
        format!(
            r#"{{"kind":"AudioData","audioData":{{"data":"{}","silent":false}}}}"#,
            audio::encode_base64(&vec![0u8; bytes])
        )
    }

    fn new_session(
        ai: Arc<CountingAi>,
    ) -> (BridgeSession, mpsc::Sender<ServerEvent>) {
        let (event_tx, event_rx) = mpsc::channel(64);
        let session = BridgeSession::new(
            test_config(),
            ai,
            event_rx,
            Arc::new(NoopToolHandler),
        );
        (session, event_tx)
    }

    #[tokio::test]
    async fn socket_close_tears_down_the_whole_session() {
        let ai = Arc::new(CountingAi::default());
        let (session, _event_tx) = new_session(ai.clone());
        let handle = session.handle();

        let source = ClosingSource {
            frames: vec![audio_frame_json(3200)].into(),
        };
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = CollectingSink { sent: sent.clone() };

        let reason = session.run(source, sink).await.unwrap();
        assert_eq!(reason, CloseReason::SocketClosed);
        assert!(handle.is_closed());
        assert_eq!(ai.configured.load(Ordering::SeqCst), 1);
        assert_eq!(ai.closed.load(Ordering::SeqCst), 1);
        assert!(ai.audio_writes.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn stop_cancels_all_tasks_and_closes_once() {
        let ai = Arc::new(CountingAi::default());
        let (session, _event_tx) = new_session(ai.clone());
        let handle = session.handle();

        let source = ScriptedThenIdleSource { frames: VecDeque::new() };
        let sink = CollectingSink { sent: Arc::new(Mutex::new(Vec::new())) };

        let stopper = handle.clone();
        let run_task = tokio::spawn(session.run(source, sink));
        tokio::time::sleep(Duration::from_millis(50)).await;
        stopper.stop();
        // Double stop must be a harmless no-op.
        stopper.stop();

        let reason = run_task.await.unwrap().unwrap();
        assert_eq!(reason, CloseReason::Cancelled);
        assert!(handle.is_closed());
        // Exactly one teardown of the AI session despite two stop calls.
        assert_eq!(ai.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ai_error_event_is_fatal_to_the_session() {
        let ai = Arc::new(CountingAi::default());
        let (session, event_tx) = new_session(ai.clone());

        event_tx
            .send(ServerEvent::Error {
                error: callbridge_realtime::types::ApiError {
                    error_type: None,
                    code: None,
                    message: "session lost".to_string(),
                },
            })
            .await
            .unwrap();

        let source = ScriptedThenIdleSource { frames: VecDeque::new() };
        let sink = CollectingSink { sent: Arc::new(Mutex::new(Vec::new())) };

        let reason = session.run(source, sink).await.unwrap();
        assert_eq!(reason, CloseReason::AiError);
        assert_eq!(ai.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn end_to_end_audio_reaches_the_wire_in_order() {
        let ai = Arc::new(CountingAi::default());
        let (session, event_tx) = new_session(ai.clone());
        let handle = session.handle();

        // Model audio arrives, then the caller barges in, then the stream
        // ends via hang-up.
        let delta = audio::encode_base64(&vec![0u8; 4800]);
        for _ in 0..3 {
            event_tx
                .send(ServerEvent::AudioDelta { item_id: None, delta: delta.clone() })
                .await
                .unwrap();
        }
        event_tx
            .send(ServerEvent::SpeechStarted { audio_start_ms: 900 })
            .await
            .unwrap();

        let source = ScriptedThenIdleSource { frames: VecDeque::new() };
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = CollectingSink { sent: sent.clone() };

        let stopper = handle.clone();
        let run_task = tokio::spawn(session.run(source, sink));
        // Let the dispatcher drain before hanging up.
        tokio::time::sleep(Duration::from_millis(200)).await;
        stopper.stop();
        run_task.await.unwrap().unwrap();

        let sent = sent.lock().unwrap();
        let stop_index = sent
            .iter()
            .position(|text| text.contains("StopAudio"))
            .expect("StopAudio must reach the wire");
        assert!(stop_index > 0, "queued audio precedes the stop frame");
        for text in &sent[..stop_index] {
            assert!(text.contains("AudioData"));
        }
    }
}
