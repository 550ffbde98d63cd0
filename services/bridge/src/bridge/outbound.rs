//! Outbound dispatcher: the single writer to the telephony socket.
//!
//! Producers (the AI event loop, the barge-in path) enqueue without
//! blocking; exactly one dispatcher task dequeues in FIFO order, encodes,
//! and writes. This decoupling keeps a slow socket write from ever stalling
//! the AI event pump, and it is what makes the barge-in ordering guarantee
//! possible: a `StopAudio` enqueued before later audio reaches the wire
//! before that audio, unconditionally.

use super::{CloseReason, MediaSink};
use crate::codec::FrameCodec;
use crate::frames::{AudioFrame, ControlFrame, OutboundItem};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Consecutive write failures after which the socket is assumed dead.
const MAX_CONSECUTIVE_SEND_FAILURES: u32 = 5;

/// Cloneable producer handle for the dispatcher queue.
#[derive(Clone)]
pub struct OutboundSender {
    tx: mpsc::UnboundedSender<OutboundItem>,
    seq: Arc<AtomicU64>,
}

impl OutboundSender {
    pub fn enqueue(&self, item: OutboundItem) {
        if self.tx.send(item).is_err() {
            debug!("Outbound queue closed; dropping item.");
        }
    }

    /// Enqueues a resampled audio chunk, stamping the next sequence number.
    pub fn audio_chunk(&self, payload: Bytes, sample_rate: u32) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.enqueue(OutboundItem::Audio(AudioFrame::from_pcm(payload, sample_rate, seq)));
    }

    /// Enqueues the barge-in stop signal.
    pub fn stop_audio(&self) {
        self.enqueue(OutboundItem::Control(ControlFrame::StopAudio));
    }

    pub fn mark(&self, name: impl Into<String>) {
        self.enqueue(OutboundItem::Control(ControlFrame::Mark(name.into())));
    }
}

/// Creates the dispatcher queue. Unbounded and single-consumer, matching
/// the platform samples this bridges to; see DESIGN.md for the backpressure
/// trade-off.
pub fn queue() -> (OutboundSender, mpsc::UnboundedReceiver<OutboundItem>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        OutboundSender {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

/// Dispatcher task body. Returns when cancelled, when every producer is
/// gone, or when the socket stops accepting writes. Unsent items left in
/// the queue at that point are discarded.
pub async fn run(
    mut rx: mpsc::UnboundedReceiver<OutboundItem>,
    mut sink: impl MediaSink,
    codec: FrameCodec,
    cancel: CancellationToken,
) -> CloseReason {
    let mut consecutive_failures: u32 = 0;
    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Outbound dispatcher cancelled; discarding queued items.");
                return CloseReason::Cancelled;
            }
            item = rx.recv() => match item {
                Some(item) => item,
                None => {
                    debug!("All outbound producers dropped; dispatcher exiting.");
                    return CloseReason::AiEnded;
                }
            },
        };

        let text = match codec.encode(&item) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to encode outbound item; dropping it.");
                continue;
            }
        };
        match sink.send_text(text).await {
            Ok(()) => consecutive_failures = 0,
            Err(e) => {
                consecutive_failures += 1;
                warn!(error = %e, consecutive_failures, "Socket write failed; continuing to drain.");
                if consecutive_failures >= MAX_CONSECUTIVE_SEND_FAILURES {
                    warn!("Socket no longer accepting writes; dispatcher exiting.");
                    return CloseReason::SocketError;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Sink that records every text frame, optionally failing some sends.
    struct RecordingSink {
        sent: Arc<Mutex<Vec<String>>>,
        fail_first: u32,
        failures: u32,
    }

    impl RecordingSink {
        fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            (
                RecordingSink { sent: sent.clone(), fail_first: 0, failures: 0 },
                sent,
            )
        }
    }

    #[async_trait]
    impl MediaSink for RecordingSink {
        async fn send_text(&mut self, text: String) -> Result<()> {
            if self.failures < self.fail_first {
                self.failures += 1;
                return Err(anyhow!("transient send failure"));
            }
            self.sent.lock().unwrap().push(text);
            Ok(())
        }
    }

    fn codec() -> FrameCodec {
        FrameCodec::new(16000)
    }

    #[tokio::test]
    async fn delivers_items_in_enqueue_order() {
        let (sender, rx) = queue();
        let (sink, sent) = RecordingSink::new();
        let cancel = CancellationToken::new();

        for i in 0..10u8 {
            sender.audio_chunk(Bytes::from(vec![i, 0]), 16000);
        }
        sender.stop_audio();
        sender.mark("end");
        drop(sender);

        let reason = run(rx, sink, codec(), cancel).await;
        assert_eq!(reason, CloseReason::AiEnded);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 12);
        for (i, text) in sent[..10].iter().enumerate() {
            let expected = codec()
                .encode(&OutboundItem::Audio(AudioFrame::from_pcm(
                    Bytes::from(vec![i as u8, 0]),
                    16000,
                    i as u64,
                )))
                .unwrap();
            assert_eq!(text, &expected);
        }
        assert!(sent[10].contains("StopAudio"));
        assert!(sent[11].contains("\"name\":\"end\""));
    }

    #[tokio::test]
    async fn transient_write_failure_does_not_stop_draining() {
        let (sender, rx) = queue();
        let (mut sink, sent) = RecordingSink::new();
        sink.fail_first = 2;
        let cancel = CancellationToken::new();

        for i in 0..5u8 {
            sender.audio_chunk(Bytes::from(vec![i, 0]), 16000);
        }
        drop(sender);

        let reason = run(rx, sink, codec(), cancel).await;
        assert_eq!(reason, CloseReason::AiEnded);
        // The two failed items are lost; the remaining three arrive in order.
        assert_eq!(sent.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn sustained_write_failure_exits_with_socket_error() {
        let (sender, rx) = queue();
        let (mut sink, sent) = RecordingSink::new();
        sink.fail_first = u32::MAX;
        let cancel = CancellationToken::new();

        for i in 0..10u8 {
            sender.audio_chunk(Bytes::from(vec![i, 0]), 16000);
        }
        drop(sender);

        let reason = run(rx, sink, codec(), cancel).await;
        assert_eq!(reason, CloseReason::SocketError);
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_discards_unsent_items() {
        let (sender, rx) = queue();
        let (sink, sent) = RecordingSink::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        sender.audio_chunk(Bytes::from(vec![0, 0]), 16000);
        let reason = run(rx, sink, codec(), cancel).await;
        assert_eq!(reason, CloseReason::Cancelled);
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn enqueue_after_dispatcher_gone_is_harmless() {
        let (sender, rx) = queue();
        drop(rx);
        sender.stop_audio();
    }
}
