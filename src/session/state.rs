//! Session state machine and the snapshot observers read.
//!
//! [`SessionState`] is the single visible state. [`SessionSnapshot`] is
//! everything a presentation layer needs (state, live transcripts, the last
//! citations, the security warning and the error slot), held behind
//! [`SharedState`] (`Arc<Mutex<SessionSnapshot>>`). Observers that prefer
//! push notifications receive [`SessionUpdate`]s instead.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::transcript::{Citation, Role};

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Visible states of a voice session.
///
/// ```text
/// Idle ──start──▶ Processing ──devices + transport ready──▶ Listening
///                     └──acquisition failed──▶ Idle
/// Listening ──AudioFrame──▶ Speaking ──playback drained──▶ Listening
/// Speaking / Listening ──Interrupted──▶ Listening
/// any active ──media tool──▶ Generating ──done──▶ (previous state)
/// Idle ──generate_media──▶ Generating ──done──▶ Idle
/// any ──stop / remote close / transport error──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Listening,
    /// Acquiring devices and opening the session channel.
    Processing,
    Speaking,
    /// A media generation request is in flight.
    Generating,
}

impl SessionState {
    /// Short label for a status line.
    ///
    /// ```
    /// use voice_session::session::SessionState;
    ///
    /// assert_eq!(SessionState::Processing.label(), "Thinking");
    /// ```
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Listening => "Listening",
            SessionState::Processing => "Thinking",
            SessionState::Speaking => "Speaking",
            SessionState::Generating => "Generating",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot / SharedState
// ---------------------------------------------------------------------------

/// What an observer can see of the session at any instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,

    /// Input transcript accumulated since the last turn boundary.
    pub live_input: String,

    /// Output transcript accumulated since the last turn boundary.
    pub live_output: String,

    /// The single user-visible error slot. Cleared when a session starts.
    pub error_message: Option<String>,

    /// Set when an input turn was withheld by the sanitiser.
    pub security_warning: Option<String>,

    /// Citations attached to the most recent model turn.
    pub last_citations: Vec<Citation>,
}

/// Thread-safe handle to the session snapshot.
pub type SharedState = Arc<Mutex<SessionSnapshot>>;

/// Construct a fresh [`SharedState`] in `Idle`.
pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(SessionSnapshot::default()))
}

/// Change notifications, in the order the changes happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    StateChanged(SessionState),
    /// The accumulated live transcript for `role` changed.
    Transcript { role: Role, text: String },
    SecurityWarning(String),
    Error(String),
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Writes the snapshot and emits the matching update. Shared by the
/// controller and its session task.
#[derive(Clone)]
pub(crate) struct Reporter {
    shared: SharedState,
    updates: Option<mpsc::UnboundedSender<SessionUpdate>>,
}

impl Reporter {
    pub(crate) fn new(shared: SharedState) -> Self {
        Self {
            shared,
            updates: None,
        }
    }

    pub(crate) fn set_updates(&mut self, tx: mpsc::UnboundedSender<SessionUpdate>) {
        self.updates = Some(tx);
    }

    pub(crate) fn shared(&self) -> &SharedState {
        &self.shared
    }

    fn lock(&self) -> MutexGuard<'_, SessionSnapshot> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, update: SessionUpdate) {
        if let Some(tx) = &self.updates {
            let _ = tx.send(update);
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.lock().state
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        let previous = std::mem::replace(&mut self.lock().state, state);
        if previous != state {
            log::debug!("session: {} → {}", previous.label(), state.label());
            self.emit(SessionUpdate::StateChanged(state));
        }
    }

    pub(crate) fn live_transcript(&self, role: Role, text: &str) {
        {
            let mut snap = self.lock();
            let slot = match role {
                Role::User => &mut snap.live_input,
                Role::Model => &mut snap.live_output,
            };
            slot.clear();
            slot.push_str(text);
        }
        self.emit(SessionUpdate::Transcript {
            role,
            text: text.to_string(),
        });
    }

    pub(crate) fn clear_live(&self) {
        let mut snap = self.lock();
        snap.live_input.clear();
        snap.live_output.clear();
    }

    pub(crate) fn citations(&self, citations: &[Citation]) {
        self.lock().last_citations = citations.to_vec();
    }

    pub(crate) fn security_warning(&self, message: &str) {
        self.lock().security_warning = Some(message.to_string());
        self.emit(SessionUpdate::SecurityWarning(message.to_string()));
    }

    pub(crate) fn error(&self, message: String) {
        self.lock().error_message = Some(message.clone());
        self.emit(SessionUpdate::Error(message));
    }

    /// Clear everything left over from a previous session.
    pub(crate) fn reset(&self) {
        let mut snap = self.lock();
        snap.live_input.clear();
        snap.live_output.clear();
        snap.error_message = None;
        snap.security_warning = None;
        snap.last_citations.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter() -> (Reporter, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut reporter = Reporter::new(new_shared_state());
        reporter.set_updates(tx);
        (reporter, rx)
    }

    #[test]
    fn default_is_idle() {
        assert_eq!(SessionSnapshot::default().state, SessionState::Idle);
        assert!(!SessionState::Idle.is_active());
        assert!(SessionState::Generating.is_active());
    }

    #[test]
    fn state_change_is_emitted_once() {
        let (reporter, mut rx) = reporter();
        reporter.set_state(SessionState::Listening);
        reporter.set_state(SessionState::Listening);

        assert_eq!(
            rx.try_recv().unwrap(),
            SessionUpdate::StateChanged(SessionState::Listening)
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(reporter.state(), SessionState::Listening);
    }

    #[test]
    fn live_transcripts_land_in_their_slot() {
        let (reporter, _rx) = reporter();
        reporter.live_transcript(Role::User, "hello");
        reporter.live_transcript(Role::Model, "hi there");

        let snap = reporter.shared().lock().unwrap().clone();
        assert_eq!(snap.live_input, "hello");
        assert_eq!(snap.live_output, "hi there");

        reporter.clear_live();
        assert!(reporter.shared().lock().unwrap().live_input.is_empty());
    }

    #[test]
    fn reset_clears_error_and_warning() {
        let (reporter, mut rx) = reporter();
        reporter.error("boom".into());
        reporter.security_warning("careful");
        assert_eq!(rx.try_recv().unwrap(), SessionUpdate::Error("boom".into()));

        reporter.reset();
        let snap = reporter.shared().lock().unwrap().clone();
        assert!(snap.error_message.is_none());
        assert!(snap.security_warning.is_none());
    }

    #[test]
    fn updates_are_optional() {
        let reporter = Reporter::new(new_shared_state());
        reporter.set_state(SessionState::Speaking);
        reporter.error("no observer".into());
        assert_eq!(reporter.state(), SessionState::Speaking);
    }
}
