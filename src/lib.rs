//! Real-time duplex voice session engine.
//!
//! Streams microphone audio to a remote conversational model over a
//! persistent channel, plays back the synthesized reply gaplessly, executes
//! the tools the model calls and hands finalised turns to a transcript sink.
//!
//! ```text
//!  audio ──▶ session ──▶ transport ⇄ remote model
//!              │  ▲
//!     tools ◀──┘  └── media, security, transcript
//! ```

pub mod audio;
pub mod config;
pub mod media;
pub mod security;
pub mod session;
pub mod tools;
pub mod transcript;
pub mod transport;
