//! JSON wire envelope, tagged by `type`.
//!
//! Outbound:
//!
//! ```json
//! {"type":"setup","system_instruction":"…","tools":["make_call"],"input_sample_rate":16000,"output_sample_rate":24000}
//! {"type":"audio","mime_type":"audio/pcm;rate=16000","data":"<base64 PCM16 LE>"}
//! {"type":"tool_response","responses":[{"id":"c1","name":"make_call","result":"Calling Mom."}]}
//! ```
//!
//! Inbound types are `input_transcript`, `output_transcript`, `audio`,
//! `grounding`, `interrupted`, `turn_complete`, `tool_call` and `error`.
//! Unknown types decode to `None` and are skipped. A `tool_call` that cannot
//! be decoded is a [`TransportError::Protocol`] error, since the remote waits
//! for a reply that would never come.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::{InboundEvent, OutboundMessage, TransportError};
use crate::audio::encode_pcm16;
use crate::config::{SessionConfig, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use crate::tools::{ToolCall, ToolResult};
use crate::transcript::Citation;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireOut<'a> {
    Setup {
        system_instruction: &'a str,
        tools: &'a [String],
        input_sample_rate: u32,
        output_sample_rate: u32,
    },
    Audio {
        mime_type: String,
        data: String,
    },
    ToolResponse {
        responses: &'a [ToolResult],
    },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireIn {
    InputTranscript {
        text: String,
    },
    OutputTranscript {
        text: String,
    },
    Audio {
        data: String,
        #[serde(default = "default_output_rate")]
        sample_rate: u32,
    },
    Grounding {
        #[serde(default)]
        refs: Vec<Citation>,
    },
    Interrupted,
    TurnComplete,
    ToolCall {
        calls: Vec<ToolCall>,
    },
    Error {
        #[serde(default)]
        detail: String,
    },
    #[serde(other)]
    Unknown,
}

/// Just the `type` tag, to classify a message that failed to decode.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

fn default_output_rate() -> u32 {
    OUTPUT_SAMPLE_RATE
}

fn to_json(msg: &WireOut<'_>) -> Result<String, TransportError> {
    serde_json::to_string(msg).map_err(|e| TransportError::Codec(e.to_string()))
}

/// The first message on every connection.
pub fn encode_setup(config: &SessionConfig) -> Result<String, TransportError> {
    to_json(&WireOut::Setup {
        system_instruction: &config.system_instruction,
        tools: &config.enabled_tools,
        input_sample_rate: INPUT_SAMPLE_RATE,
        output_sample_rate: OUTPUT_SAMPLE_RATE,
    })
}

pub fn encode_outbound(message: &OutboundMessage) -> Result<String, TransportError> {
    match message {
        OutboundMessage::Audio(chunk) => to_json(&WireOut::Audio {
            mime_type: format!("audio/pcm;rate={}", chunk.sample_rate),
            data: B64.encode(encode_pcm16(&chunk.samples)),
        }),
        OutboundMessage::ToolResults(responses) => to_json(&WireOut::ToolResponse { responses }),
    }
}

/// Decode one inbound text message. `Ok(None)` for types this client does
/// not handle.
///
/// # Errors
///
/// [`TransportError::Protocol`] for an undecodable `tool_call`;
/// [`TransportError::Codec`] for invalid JSON, any other known type with
/// missing fields, or audio that is not valid base64.
pub fn decode_inbound(text: &str) -> Result<Option<InboundEvent>, TransportError> {
    let wire: WireIn = serde_json::from_str(text).map_err(|e| {
        match serde_json::from_str::<Envelope>(text) {
            Ok(envelope) if envelope.kind == "tool_call" => {
                TransportError::Protocol(format!("undecodable tool call: {e}"))
            }
            _ => TransportError::Codec(e.to_string()),
        }
    })?;

    let event = match wire {
        WireIn::InputTranscript { text } => InboundEvent::PartialInputTranscript(text),
        WireIn::OutputTranscript { text } => InboundEvent::PartialOutputTranscript(text),
        WireIn::Audio { data, sample_rate } => InboundEvent::AudioFrame {
            data: B64
                .decode(data.as_bytes())
                .map_err(|e| TransportError::Codec(format!("audio payload: {e}")))?,
            sample_rate,
        },
        WireIn::Grounding { refs } => InboundEvent::GroundingRefs(refs),
        WireIn::Interrupted => InboundEvent::Interrupted,
        WireIn::TurnComplete => InboundEvent::TurnComplete,
        WireIn::ToolCall { calls } => InboundEvent::ToolCallRequest(calls),
        WireIn::Error { detail } => InboundEvent::ConnectionError(detail),
        WireIn::Unknown => return Ok(None),
    };
    Ok(Some(event))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
