//! Session Controller — owns one duplex voice session at a time.
//!
//! [`VoiceSession::start`] acquires the microphone, opens the transport and
//! the speaker, then spawns a single session task that processes everything
//! strictly one at a time:
//!
//! ```text
//!            ┌─────────────── session task (tokio::select!) ───────────────┐
//! stop ─────▶│ stop signal            → teardown                           │
//! remote ───▶│ InboundEvent           → transcript / playback / tools      │
//! speaker ──▶│ finished SourceId      → Speaking → Listening when drained  │
//! mic ──────▶│ AudioChunk             → transport.send(Audio)              │
//!            └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Teardown order on every exit path: stop capture → close transport →
//! interrupt playback → release the output device → `Idle`. Device
//! acquisition and release run on the blocking pool.
//!
//! Tool calls run on their own task while the session task waits for the
//! result (or for stop). A result that resolves after stop is discarded.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::state::{new_shared_state, Reporter, SessionState, SessionUpdate, SharedState};
use crate::audio::{
    decode_pcm16, AudioCapture, CaptureStream, DeviceError, InputDevice, OutputDevice,
    PlaybackScheduler, SourceId,
};
use crate::config::SessionConfig;
use crate::media::{MediaGenerator, MediaKind, MediaResult};
use crate::security::{sanitize_input, Redactor, SECURITY_WARNING};
use crate::tools::{ToolCall, ToolExecutor, ToolKind, ToolResult};
use crate::transcript::{Citation, ConversationTurn, Role, TranscriptSink};
use crate::transport::{Connector, InboundEvent, OutboundMessage, TransportError, TransportSender};

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// Errors surfaced by [`VoiceSession`]'s lifecycle methods.
///
/// Mid-session failures never surface here; they end the session in `Idle`
/// and populate [`SessionSnapshot::error_message`](super::SessionSnapshot).
#[derive(Debug, Error)]
pub enum SessionError {
    /// The microphone could not be acquired. Nothing was opened.
    #[error("microphone unavailable: {0}")]
    DeviceUnavailable(DeviceError),

    #[error("speaker unavailable: {0}")]
    OutputUnavailable(DeviceError),

    #[error("could not open the session channel: {0}")]
    Transport(#[from] TransportError),

    #[error("a session is already active")]
    AlreadyActive,

    #[error("no media generator is configured")]
    MediaUnavailable,
}

// ---------------------------------------------------------------------------
// VoiceSession
// ---------------------------------------------------------------------------

/// The collaborators a session is wired to.
pub struct SessionParts {
    pub input: Arc<dyn InputDevice>,
    pub output: Arc<dyn OutputDevice>,
    pub connector: Arc<dyn Connector>,
    pub tools: Arc<dyn ToolExecutor>,
    pub transcript: Arc<dyn TranscriptSink>,
}

struct ActiveSession {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// One voice session with explicit `start` / `stop` lifecycle.
///
/// Independent instances never share state.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use voice_session::audio::{CpalMicrophone, CpalSpeaker};
/// use voice_session::config::AppConfig;
/// use voice_session::media::MediaService;
/// use voice_session::session::{SessionParts, VoiceSession};
/// use voice_session::tools::AssistantTools;
/// use voice_session::transcript::LogTranscriptSink;
/// use voice_session::transport::WebSocketConnector;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = AppConfig::load()?;
/// let media = Arc::new(MediaService::from_config(&config.media));
/// let parts = SessionParts {
///     input: Arc::new(CpalMicrophone::new(None)),
///     output: Arc::new(CpalSpeaker::new(None)),
///     connector: Arc::new(WebSocketConnector::from_config(&config.transport)),
///     tools: Arc::new(AssistantTools::new(media)),
///     transcript: Arc::new(LogTranscriptSink),
/// };
///
/// let mut session = VoiceSession::new(config.session, parts);
/// session.start().await?;
/// // … talk …
/// session.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct VoiceSession {
    config: Arc<SessionConfig>,
    parts: SessionParts,
    media: Option<Arc<dyn MediaGenerator>>,
    reporter: Reporter,
    active: Option<ActiveSession>,
}

impl VoiceSession {
    /// Create an idle session. `config` is frozen for every run of this
    /// session.
    pub fn new(config: SessionConfig, parts: SessionParts) -> Self {
        Self {
            config: Arc::new(config),
            parts,
            media: None,
            reporter: Reporter::new(new_shared_state()),
            active: None,
        }
    }

    /// Also publish every change on `tx`.
    pub fn with_updates(mut self, tx: mpsc::UnboundedSender<SessionUpdate>) -> Self {
        self.reporter.set_updates(tx);
        self
    }

    /// Enable [`generate_media`](Self::generate_media).
    pub fn with_media(mut self, media: Arc<dyn MediaGenerator>) -> Self {
        self.media = Some(media);
        self
    }

    /// Handle to the live snapshot.
    pub fn shared_state(&self) -> SharedState {
        Arc::clone(self.reporter.shared())
    }

    pub fn state(&self) -> SessionState {
        self.reporter.state()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// `true` while a session task is running.
    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.task.is_finished())
    }

    /// Acquire devices, open the transport and begin listening.
    ///
    /// Shows `Processing` while acquiring, then `Listening`.
    ///
    /// # Errors
    ///
    /// * [`SessionError::AlreadyActive`] if a session is running.
    /// * [`SessionError::DeviceUnavailable`] if the microphone cannot be
    ///   acquired; nothing else is attempted.
    /// * [`SessionError::Transport`] / [`SessionError::OutputUnavailable`];
    ///   whatever was already acquired is released.
    ///
    /// On error the state is `Idle` and the error slot is set.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.is_active() {
            return Err(SessionError::AlreadyActive);
        }
        // A previous run may have ended on its own; make sure it is gone.
        if let Some(previous) = self.active.take() {
            let _ = previous.task.await;
        }

        self.reporter.reset();
        self.reporter.set_state(SessionState::Processing);

        match self.open().await {
            Ok(active) => {
                self.active = Some(active);
                Ok(())
            }
            Err(e) => {
                log::error!("session: start failed: {e}");
                self.reporter.error(e.to_string());
                self.reporter.set_state(SessionState::Idle);
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<ActiveSession, SessionError> {
        let input = Arc::clone(&self.parts.input);
        let chunk_samples = self.config.chunk_samples;
        let capture = off_runtime(move || AudioCapture::new(chunk_samples).start(input.as_ref()))
            .await
            .and_then(|opened| opened)
            .map_err(SessionError::DeviceUnavailable)?;

        let connection = match self.parts.connector.connect(&self.config).await {
            Ok(connection) => connection,
            Err(e) => {
                release_capture(capture).await;
                return Err(e.into());
            }
        };
        let mut sender = connection.sender;

        let output = Arc::clone(&self.parts.output);
        let sink = match off_runtime(move || output.open()).await.and_then(|opened| opened) {
            Ok(sink) => sink,
            Err(e) => {
                release_capture(capture).await;
                sender.close().await;
                return Err(SessionError::OutputUnavailable(e));
            }
        };
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let scheduler = PlaybackScheduler::new(sink, finished_tx);

        let task = SessionTask {
            config: Arc::clone(&self.config),
            capture,
            capture_live: true,
            sender,
            events: connection.events,
            scheduler,
            finished: finished_rx,
            tools: Arc::clone(&self.parts.tools),
            transcript: Arc::clone(&self.parts.transcript),
            reporter: self.reporter.clone(),
            redactor: Redactor::new(),
            input_text: String::new(),
            output_text: String::new(),
            citations: Vec::new(),
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        self.reporter.set_state(SessionState::Listening);
        log::info!("session: listening");

        Ok(ActiveSession {
            stop_tx,
            task: tokio::spawn(task.run(stop_rx)),
        })
    }

    /// Stop the session and release every device. Safe from any state and
    /// idempotent; returns once teardown has finished.
    pub async fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            log::debug!("session: stop requested while idle");
            return;
        };
        let _ = active.stop_tx.send(true);
        if let Err(e) = active.task.await {
            log::error!("session: task ended abnormally: {e}");
            self.reporter.set_state(SessionState::Idle);
        }
    }

    /// Run one media generation outside a conversation.
    ///
    /// Shows `Generating` for the duration and returns to `Idle`. The
    /// prompt and the result are handed to the transcript sink.
    ///
    /// # Errors
    ///
    /// [`SessionError::AlreadyActive`] while a session runs;
    /// [`SessionError::MediaUnavailable`] without [`with_media`](Self::with_media).
    pub async fn generate_media(
        &mut self,
        kind: MediaKind,
        prompt: &str,
        aspect_ratio: &str,
    ) -> Result<MediaResult, SessionError> {
        if self.is_active() {
            return Err(SessionError::AlreadyActive);
        }
        let media = self.media.clone().ok_or(SessionError::MediaUnavailable)?;

        self.reporter.set_state(SessionState::Generating);
        let result = match kind {
            MediaKind::Image => media.generate_image(prompt, aspect_ratio).await,
            MediaKind::Video => media.generate_video(prompt, aspect_ratio).await,
        };

        self.parts.transcript.append(ConversationTurn::user(prompt));
        let detail = if self.config.privacy_mode {
            Redactor::new().redact(&result.detail)
        } else {
            result.detail.clone()
        };
        self.parts
            .transcript
            .append(ConversationTurn::model(detail, Vec::new()));

        if !result.success {
            self.reporter.error(result.detail.clone());
        }
        self.reporter.set_state(SessionState::Idle);
        Ok(result)
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        // The task tears itself down once it sees the signal.
        if let Some(active) = &self.active {
            let _ = active.stop_tx.send(true);
        }
    }
}

// ---------------------------------------------------------------------------
// SessionTask
// ---------------------------------------------------------------------------

/// Run a device call on the blocking pool. Opening and releasing a cpal
/// stream waits on its device thread.
async fn off_runtime<T, F>(f: F) -> Result<T, DeviceError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DeviceError::Thread(e.to_string()))
}

async fn release_capture(mut capture: CaptureStream) {
    if let Err(e) = off_runtime(move || capture.stop()).await {
        log::error!("session: releasing the microphone failed: {e}");
    }
}

async fn release_playback(mut scheduler: PlaybackScheduler) {
    if let Err(e) = off_runtime(move || scheduler.release()).await {
        log::error!("session: releasing the speaker failed: {e}");
    }
}

/// Why the session task is ending.
enum Exit {
    Stopped,
    RemoteClosed,
    Failed(String),
}

/// Everything one running session owns.
struct SessionTask {
    config: Arc<SessionConfig>,
    capture: CaptureStream,
    /// Cleared once the capture stream has ended on its own.
    capture_live: bool,
    sender: Box<dyn TransportSender>,
    events: mpsc::Receiver<InboundEvent>,
    scheduler: PlaybackScheduler,
    finished: mpsc::UnboundedReceiver<SourceId>,
    tools: Arc<dyn ToolExecutor>,
    transcript: Arc<dyn TranscriptSink>,
    reporter: Reporter,
    redactor: Redactor,
    input_text: String,
    output_text: String,
    citations: Vec<Citation>,
}

/// Resolves once stop has been requested or the controller is gone.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

impl SessionTask {
    async fn run(mut self, mut stop: watch::Receiver<bool>) {
        let exit = loop {
            tokio::select! {
                biased;

                _ = stop_requested(&mut stop) => break Exit::Stopped,

                event = self.events.recv() => {
                    let Some(event) = event else {
                        break Exit::RemoteClosed;
                    };
                    if let Some(exit) = self.handle_event(event, &mut stop).await {
                        break exit;
                    }
                }

                Some(id) = self.finished.recv() => self.on_source_finished(id),

                chunk = self.capture.next(), if self.capture_live => match chunk {
                    Some(chunk) => {
                        if let Err(e) = self.sender.send(OutboundMessage::Audio(chunk)).await {
                            break Exit::Failed(e.to_string());
                        }
                    }
                    None => {
                        log::warn!("session: microphone stream ended");
                        self.capture_live = false;
                    }
                },
            }
        };
        self.teardown(exit).await;
    }

    // -----------------------------------------------------------------------
    // Event handlers
    // -----------------------------------------------------------------------

    async fn handle_event(
        &mut self,
        event: InboundEvent,
        stop: &mut watch::Receiver<bool>,
    ) -> Option<Exit> {
        match event {
            InboundEvent::PartialInputTranscript(text) => {
                self.input_text.push_str(&text);
                self.reporter.live_transcript(Role::User, &self.input_text);
            }
            InboundEvent::PartialOutputTranscript(text) => {
                self.output_text.push_str(&text);
                self.reporter.live_transcript(Role::Model, &self.output_text);
            }
            InboundEvent::AudioFrame { data, sample_rate } => self.on_audio(&data, sample_rate),
            InboundEvent::GroundingRefs(refs) => self.citations = refs,
            InboundEvent::Interrupted => self.on_interrupted(),
            InboundEvent::TurnComplete => self.on_turn_complete(),
            InboundEvent::ToolCallRequest(calls) => return self.on_tool_calls(calls, stop).await,
            InboundEvent::ConnectionClosed => return Some(Exit::RemoteClosed),
            InboundEvent::ConnectionError(detail) => return Some(Exit::Failed(detail)),
        }
        None
    }

    fn on_audio(&mut self, data: &[u8], sample_rate: u32) {
        let samples = decode_pcm16(data);
        if samples.is_empty() {
            return;
        }
        self.scheduler.schedule(&samples, sample_rate);
        if self.reporter.state() == SessionState::Listening {
            self.reporter.set_state(SessionState::Speaking);
        }
    }

    fn on_source_finished(&mut self, id: SourceId) {
        if self.scheduler.finish(id) && self.reporter.state() == SessionState::Speaking {
            self.reporter.set_state(SessionState::Listening);
        }
    }

    fn on_interrupted(&mut self) {
        log::debug!(
            "session: interrupted with {} source(s) in flight",
            self.scheduler.active_count()
        );
        self.scheduler.interrupt_all();
        self.reporter.set_state(SessionState::Listening);
    }

    fn model_text(&self, text: &str) -> String {
        if self.config.privacy_mode {
            self.redactor.redact(text)
        } else {
            text.to_string()
        }
    }

    /// Finalise both buffers into turns and clear them.
    fn on_turn_complete(&mut self) {
        let input = std::mem::take(&mut self.input_text);
        let output = std::mem::take(&mut self.output_text);
        let citations = std::mem::take(&mut self.citations);

        match sanitize_input(&input) {
            Err(rejection) => {
                log::warn!("session: input turn withheld: {rejection}");
                self.transcript.append(ConversationTurn::flagged_user());
                self.reporter.security_warning(SECURITY_WARNING);
            }
            Ok(text) if !text.trim().is_empty() => {
                self.transcript.append(ConversationTurn::user(text.trim()));
            }
            Ok(_) => {}
        }

        let output = output.trim();
        if !output.is_empty() || !citations.is_empty() {
            self.reporter.citations(&citations);
            let text = self.model_text(output);
            self.transcript.append(ConversationTurn::model(text, citations));
        }

        self.reporter.clear_live();
    }

    /// Run every call in order, then reply once with all results.
    async fn on_tool_calls(
        &mut self,
        calls: Vec<ToolCall>,
        stop: &mut watch::Receiver<bool>,
    ) -> Option<Exit> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = if self.config.tool_enabled(&call.name) {
                match self.dispatch(&call, stop).await {
                    Ok(result) => result,
                    Err(exit) => return Some(exit),
                }
            } else {
                log::warn!("session: remote requested disabled tool '{}'", call.name);
                format!("Tool '{}' is not enabled for this session.", call.name)
            };
            results.push(ToolResult {
                id: call.id,
                name: call.name,
                result,
            });
        }

        let summary = results
            .iter()
            .map(|r| r.result.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        if let Err(e) = self.sender.send(OutboundMessage::ToolResults(results)).await {
            return Some(Exit::Failed(e.to_string()));
        }

        if !summary.trim().is_empty() {
            let text = self.model_text(&summary);
            self.transcript.append(ConversationTurn::model(text, Vec::new()));
        }
        None
    }

    /// Execute one call. `Err(Exit::Stopped)` when stop arrives first; the
    /// call keeps running detached and its result is dropped.
    async fn dispatch(
        &mut self,
        call: &ToolCall,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<String, Exit> {
        let media = self.tools.kind(&call.name) == ToolKind::MediaGeneration;
        let prior = self.reporter.state();
        if media {
            self.reporter.set_state(SessionState::Generating);
        }

        log::info!("session: running tool '{}' ({})", call.name, call.id);
        let tools = Arc::clone(&self.tools);
        let (name, args) = (call.name.clone(), call.args.clone());
        let mut handle = tokio::spawn(async move { tools.execute(&name, &args).await });

        let outcome = loop {
            tokio::select! {
                biased;

                _ = stop_requested(stop) => break Err(Exit::Stopped),

                joined = &mut handle => break Ok(joined.unwrap_or_else(|e| {
                    log::error!("session: tool '{}' panicked: {e}", call.name);
                    format!("Error: tool '{}' failed unexpectedly", call.name)
                })),

                // Listening is suspended until the result is back.
                chunk = self.capture.next(), if self.capture_live => {
                    if chunk.is_none() {
                        self.capture_live = false;
                    }
                }
            }
        };

        if media && outcome.is_ok() {
            self.reporter.set_state(prior);
        }
        outcome
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    async fn teardown(mut self, exit: Exit) {
        release_capture(self.capture).await;

        self.sender.close().await;
        self.events.close();
        while self.events.try_recv().is_ok() {}

        // Flushes what is queued, then closes the device.
        release_playback(self.scheduler).await;

        match exit {
            Exit::Stopped => log::info!("session: stopped"),
            Exit::RemoteClosed => {
                log::warn!("session: connection closed by remote");
                self.reporter.error("Connection closed by the remote side".into());
            }
            Exit::Failed(detail) => {
                log::error!("session: connection error: {detail}");
                self.reporter.error(format!("Connection error: {detail}"));
            }
        }
        self.reporter.clear_live();
        self.reporter.set_state(SessionState::Idle);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
