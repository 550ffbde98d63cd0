//! Codec for the telephony media-streaming wire protocol.
//!
//! The platform exchanges newline-free JSON text frames discriminated by a
//! `kind` field. Decoding never fails: malformed or unrecognized payloads
//! become [`StreamEvent::Unrecognized`] so a bad frame can be dropped with a
//! warning instead of aborting the stream. The codec holds only immutable
//! format configuration and is safe to share across sessions.

use crate::audio;
use crate::frames::{AudioFrame, ControlFrame, OutboundItem};
use anyhow::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A decoded inbound message from the telephony socket.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Stream format announcement, sent once when media starts.
    AudioMetadata {
        encoding: Option<String>,
        sample_rate: Option<u32>,
        channels: Option<u16>,
    },
    /// A unit of call audio.
    Audio(AudioFrame),
    /// A DTMF tone pressed by a participant.
    Dtmf { tone: String },
    /// Anything the codec does not understand. Dropped by the caller.
    Unrecognized,
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    kind: String,
    #[serde(rename = "audioData")]
    audio_data: Option<InboundAudioData>,
    #[serde(rename = "audioMetadata")]
    audio_metadata: Option<InboundAudioMetadata>,
    #[serde(rename = "dtmfData")]
    dtmf_data: Option<InboundDtmfData>,
}

#[derive(Debug, Deserialize)]
struct InboundAudioData {
    data: String,
    timestamp: Option<String>,
    #[serde(rename = "participantRawID", alias = "participantRawId")]
    participant_raw_id: Option<String>,
    #[serde(default, alias = "isSilent")]
    silent: bool,
}

#[derive(Debug, Deserialize)]
struct InboundAudioMetadata {
    encoding: Option<String>,
    #[serde(rename = "sampleRate")]
    sample_rate: Option<u32>,
    channels: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct InboundDtmfData {
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind")]
enum OutboundMessage<'a> {
    AudioData {
        #[serde(rename = "audioData")]
        audio_data: OutboundAudioData,
    },
    StopAudio {
        #[serde(rename = "stopAudio")]
        stop_audio: Empty,
    },
    Mark {
        mark: MarkPayload<'a>,
    },
}

#[derive(Debug, Serialize)]
struct OutboundAudioData {
    data: String,
}

#[derive(Debug, Serialize)]
struct Empty {}

#[derive(Debug, Serialize)]
struct MarkPayload<'a> {
    name: &'a str,
}

/// Stateless encoder/decoder for the telephony streaming protocol.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    /// Sample rate stamped onto decoded audio frames.
    pub inbound_rate: u32,
}

impl FrameCodec {
    pub fn new(inbound_rate: u32) -> Self {
        FrameCodec { inbound_rate }
    }

    /// Decodes one text frame. `seq` is the caller's monotonic counter,
    /// stamped onto audio frames so ordering stays observable downstream.
    pub fn decode(&self, raw: &str, seq: u64) -> StreamEvent {
        let msg: InboundMessage = match serde_json::from_str(raw) {
            Ok(msg) => msg,
            Err(_) => return StreamEvent::Unrecognized,
        };
        match (msg.kind.as_str(), msg.audio_data, msg.audio_metadata, msg.dtmf_data) {
            ("AudioData", Some(audio_data), _, _) => {
                let Some(payload) = audio::decode_base64(&audio_data.data) else {
                    return StreamEvent::Unrecognized;
                };
                StreamEvent::Audio(AudioFrame {
                    payload: Bytes::from(payload),
                    sample_rate: self.inbound_rate,
                    bit_depth: 16,
                    channels: 1,
                    seq,
                    timestamp: audio_data.timestamp,
                    participant: audio_data.participant_raw_id,
                    silent: audio_data.silent,
                })
            }
            ("AudioMetadata", _, Some(meta), _) => StreamEvent::AudioMetadata {
                encoding: meta.encoding,
                sample_rate: meta.sample_rate,
                channels: meta.channels,
            },
            ("DtmfData", _, _, Some(dtmf)) => StreamEvent::Dtmf { tone: dtmf.data },
            _ => StreamEvent::Unrecognized,
        }
    }

    /// Serializes an outbound item into the platform's JSON framing.
    pub fn encode(&self, item: &OutboundItem) -> Result<String> {
        let msg = match item {
            OutboundItem::Audio(frame) => OutboundMessage::AudioData {
                audio_data: OutboundAudioData {
                    data: audio::encode_base64(&frame.payload),
                },
            },
            OutboundItem::Control(ControlFrame::StopAudio) => OutboundMessage::StopAudio {
                stop_audio: Empty {},
            },
            OutboundItem::Control(ControlFrame::Mark(name)) => {
                OutboundMessage::Mark { mark: MarkPayload { name } }
            }
        };
        Ok(serde_json::to_string(&msg)?)
    }
}
