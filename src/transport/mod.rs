//! Session Transport: one persistent duplex channel per session.
//!
//! ```text
//!                      ┌──────────────────── Connection ───────────────────┐
//! controller ──send──▶ │ TransportSender  ── Audio / ToolResults ──▶ remote │
//! controller ◀─recv─── │ events (mpsc)    ◀── InboundEvent ───────── remote │
//!                      └───────────────────────────────────────────────────┘
//! ```
//!
//! A [`Connector`] opens the channel and sends the setup message. Inbound
//! traffic is decoded into [`InboundEvent`]s on a reader task and delivered in
//! receive order over a bounded channel. After an unexpected remote close the
//! reader delivers exactly one [`InboundEvent::ConnectionClosed`] (or
//! [`InboundEvent::ConnectionError`]) and stops. After
//! [`TransportSender::close`] returns nothing more is delivered.

pub mod codec;
#[cfg(test)]
pub mod memory;
pub mod websocket;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::audio::AudioChunk;
use crate::config::SessionConfig;
use crate::tools::{ToolCall, ToolResult};
use crate::transcript::Citation;

pub use websocket::WebSocketConnector;

/// Inbound events buffered between the reader task and the controller.
pub const EVENT_CHANNEL_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("connection timed out")]
    Timeout,

    #[error("send failed: {0}")]
    Send(String),

    #[error("connection is closed")]
    Closed,

    #[error("malformed message: {0}")]
    Codec(String),

    /// A message the session cannot skip could not be decoded.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

// ---------------------------------------------------------------------------
// Events and messages
// ---------------------------------------------------------------------------

/// Everything the remote side can tell the session.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    PartialInputTranscript(String),
    PartialOutputTranscript(String),
    /// Little-endian PCM16 mono at `sample_rate`.
    AudioFrame { data: Vec<u8>, sample_rate: u32 },
    GroundingRefs(Vec<Citation>),
    Interrupted,
    TurnComplete,
    ToolCallRequest(Vec<ToolCall>),
    ConnectionClosed,
    ConnectionError(String),
}

impl InboundEvent {
    /// `true` for the events after which nothing else is delivered.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InboundEvent::ConnectionClosed | InboundEvent::ConnectionError(_)
        )
    }
}

/// Everything the session sends.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Audio(AudioChunk),
    ToolResults(Vec<ToolResult>),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// An open session channel.
pub struct Connection {
    pub sender: Box<dyn TransportSender>,
    pub events: mpsc::Receiver<InboundEvent>,
}

/// Outbound half of a [`Connection`].
#[async_trait]
pub trait TransportSender: Send {
    async fn send(&mut self, message: OutboundMessage) -> Result<(), TransportError>;

    /// Terminate the channel. Idempotent; no inbound event is delivered
    /// after this returns.
    async fn close(&mut self);
}

/// Opens session channels.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and perform setup with `config`.
    ///
    /// # Errors
    ///
    /// Any [`TransportError`] raised before the channel is usable; nothing is
    /// left open in that case.
    async fn connect(&self, config: &SessionConfig) -> Result<Connection, TransportError>;
}
