//! Tool Executor contract.
//!
//! The remote model requests side effects by name. The session forwards each
//! [`ToolCall`] to a [`ToolExecutor`] and relays the returned string back as a
//! [`ToolResult`] correlated by call id.
//!
//! Executors never fail outward: unknown names, bad arguments and backend
//! failures are all rendered as descriptive result strings, because the
//! remote model only ever sees plain text.
//!
//! * [`AssistantTools`] — built-in phone actions and media generation.
//! * [`PhoneBridge`] — native capability for calls, SMS and device settings.

pub mod assistant;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub use assistant::{AssistantTools, PhoneBridge, PhoneSetting, SIMULATED_NOTE};

/// Named arguments of a tool call, as sent by the remote model.
pub type ToolArgs = serde_json::Map<String, serde_json::Value>;

/// One call requested by the remote model.
///
/// A missing id decodes as empty and missing or `null` args as no arguments;
/// the call is still answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub args: ToolArgs,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<ToolArgs, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<ToolArgs>::deserialize(deserializer)?.unwrap_or_default())
}

/// The reply to one [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub name: String,
    pub result: String,
}

/// How the session should present a tool while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Quick side effect; the visible state is left alone.
    Action,
    /// Long-running image/video generation; the session shows `Generating`.
    MediaGeneration,
}

// ---------------------------------------------------------------------------
// ToolError
// ---------------------------------------------------------------------------

/// Why a single tool call could not be carried out. Never fatal to the
/// session; rendered into the result text.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("missing argument '{0}'")]
    MissingArgument(&'static str),

    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// The native capability reported a failure.
    #[error("{0}")]
    Failed(String),
}

// ---------------------------------------------------------------------------
// ToolExecutor trait
// ---------------------------------------------------------------------------

/// Performs named side-effecting actions.
///
/// Implementors must be `Send + Sync`: the session shares them as
/// `Arc<dyn ToolExecutor>` and runs each call on its own task.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run `name` with `args` and describe the outcome.
    ///
    /// Must not panic for any input; failures are part of the returned text.
    async fn execute(&self, name: &str, args: &ToolArgs) -> String;

    /// Classify `name` so the session can reflect long-running work.
    fn kind(&self, _name: &str) -> ToolKind {
        ToolKind::Action
    }
}

/// Render a failed call the way it is relayed to the remote model.
pub fn failure_text(err: &ToolError) -> String {
    format!("Error: {err}")
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

/// Executor returning canned results, optionally after a delay.
#[cfg(test)]
pub struct ScriptedTools {
    pub results: std::collections::HashMap<String, String>,
    pub media_tools: Vec<String>,
    pub delay: std::time::Duration,
    pub calls: std::sync::Mutex<Vec<(String, ToolArgs)>>,
}

#[cfg(test)]
impl ScriptedTools {
    pub fn new() -> Self {
        Self {
            results: std::collections::HashMap::new(),
            media_tools: Vec::new(),
            delay: std::time::Duration::ZERO,
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with(mut self, name: &str, result: &str) -> Self {
        self.results.insert(name.into(), result.into());
        self
    }

    pub fn calls(&self) -> Vec<(String, ToolArgs)> {
        self.calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl ToolExecutor for ScriptedTools {
    async fn execute(&self, name: &str, args: &ToolArgs) -> String {
        self.calls.lock().unwrap().push((name.into(), args.clone()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.results.get(name) {
            Some(result) => result.clone(),
            None => failure_text(&ToolError::UnknownTool(name.into())),
        }
    }

    fn kind(&self, name: &str) -> ToolKind {
        if self.media_tools.iter().any(|t| t == name) {
            ToolKind::MediaGeneration
        } else {
            ToolKind::Action
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_args_default_to_empty() {
        let call: ToolCall = serde_json::from_str(r#"{"id":"c1","name":"make_call"}"#).unwrap();
        assert!(call.args.is_empty());
    }

    #[test]
    fn null_args_and_missing_id_still_decode() {
        let call: ToolCall = serde_json::from_str(r#"{"name":"make_call","args":null}"#).unwrap();
        assert_eq!(call.id, "");
        assert!(call.args.is_empty());
    }

    #[test]
    fn failure_text_is_descriptive() {
        let text = failure_text(&ToolError::MissingArgument("setting"));
        assert_eq!(text, "Error: missing argument 'setting'");
    }

    #[test]
    fn executor_is_object_safe() {
        let _: Box<dyn ToolExecutor> = Box::new(ScriptedTools::new());
    }

    #[tokio::test]
    async fn scripted_unknown_tool_is_a_string_not_a_panic() {
        let tools = ScriptedTools::new();
        let out = tools.execute("nope", &ToolArgs::new()).await;
        assert_eq!(out, "Error: unknown tool 'nope'");
    }
}
