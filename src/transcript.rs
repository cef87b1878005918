//! Finalised conversation turns and the sink they are handed to.
//!
//! The session never stores the conversation itself. At every turn boundary
//! it builds [`ConversationTurn`]s and passes them to a [`TranscriptSink`],
//! which must return immediately.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A grounding reference attached to a model turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A finalised user or model utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    /// Set when the input matched the instruction-override denylist; `text`
    /// is empty in that case.
    #[serde(default)]
    pub security_flag: bool,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            citations: Vec::new(),
            security_flag: false,
        }
    }

    pub fn model(text: impl Into<String>, citations: Vec<Citation>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
            citations,
            security_flag: false,
        }
    }

    /// A user turn whose content was withheld.
    pub fn flagged_user() -> Self {
        Self {
            security_flag: true,
            ..Self::user(String::new())
        }
    }
}

// ---------------------------------------------------------------------------
// TranscriptSink
// ---------------------------------------------------------------------------

/// Receives finalised turns. Fire-and-forget: implementations must not
/// block the caller.
pub trait TranscriptSink: Send + Sync {
    fn append(&self, turn: ConversationTurn);
}

/// Forwards turns over an unbounded channel; sends never block.
#[derive(Debug, Clone)]
pub struct ChannelTranscriptSink {
    tx: mpsc::UnboundedSender<ConversationTurn>,
}

impl ChannelTranscriptSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConversationTurn>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TranscriptSink for ChannelTranscriptSink {
    fn append(&self, turn: ConversationTurn) {
        if self.tx.send(turn).is_err() {
            log::debug!("transcript: receiver dropped, turn discarded");
        }
    }
}

/// Writes each turn to the log at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTranscriptSink;

impl TranscriptSink for LogTranscriptSink {
    fn append(&self, turn: ConversationTurn) {
        let who = match turn.role {
            Role::User => "user",
            Role::Model => "model",
        };
        if turn.security_flag {
            log::info!("[{who}] <withheld: flagged input>");
        } else {
            log::info!("[{who}] {}", turn.text);
        }
        for c in &turn.citations {
            log::info!("    source: {}", c.title.as_deref().unwrap_or(&c.uri));
        }
    }
}

/// Collects turns in memory.
#[derive(Debug, Default)]
pub struct MemoryTranscriptSink {
    turns: Mutex<Vec<ConversationTurn>>,
}

impl MemoryTranscriptSink {
    /// Snapshot of every turn appended so far.
    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.turns.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl TranscriptSink for MemoryTranscriptSink {
    fn append(&self, turn: ConversationTurn) {
        self.turns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(turn);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flagged_user_turn_has_no_text() {
        let turn = ConversationTurn::flagged_user();
        assert_eq!(turn.role, Role::User);
        assert!(turn.text.is_empty());
        assert!(turn.security_flag);
    }

    #[test]
    fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelTranscriptSink::new();
        sink.append(ConversationTurn::user("hi"));
        sink.append(ConversationTurn::model("hello", Vec::new()));

        assert_eq!(rx.try_recv().unwrap().text, "hi");
        assert_eq!(rx.try_recv().unwrap().role, Role::Model);
    }

    #[test]
    fn channel_sink_tolerates_dropped_receiver() {
        let (sink, rx) = ChannelTranscriptSink::new();
        drop(rx);
        sink.append(ConversationTurn::user("nobody listening"));
    }

    #[test]
    fn turn_serialises_without_empty_citations() {
        let json = serde_json::to_value(ConversationTurn::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
        assert!(json.get("citations").is_none());
        assert_eq!(json["security_flag"], false);
    }

    #[test]
    fn memory_sink_collects() {
        let sink = MemoryTranscriptSink::default();
        sink.append(ConversationTurn::user("a"));
        sink.append(ConversationTurn::user("b"));
        assert_eq!(sink.turns().len(), 2);
    }
}
