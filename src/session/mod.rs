//! Session module — the duplex voice session controller.
//!
//! Provides [`VoiceSession`] (lifecycle and event loop), the visible
//! [`SessionState`] machine and the [`SessionSnapshot`] observers read
//! through [`SharedState`] or receive as [`SessionUpdate`]s.

pub mod controller;
pub mod state;

pub use controller::{SessionError, SessionParts, VoiceSession};
pub use state::{new_shared_state, SessionSnapshot, SessionState, SessionUpdate, SharedState};
