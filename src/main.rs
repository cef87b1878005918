//! Application entry point — voice session CLI.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Wire the cpal devices, the WebSocket connector, the assistant tools
//!    and the media service into a [`VoiceSession`].
//! 5. Either run a conversation until Ctrl+C or the remote ends it, or
//!    generate a single image/video when asked on the command line.
//!
//! ```text
//! voice-session                          converse
//! voice-session image <prompt> [ratio]   one image, e.g. `image "a red fox" 16:9`
//! voice-session video <prompt> [ratio]   one video
//! ```

use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::mpsc;
use voice_session::{
    audio::{CpalMicrophone, CpalSpeaker},
    config::AppConfig,
    media::{MediaGenerator, MediaKind, MediaService},
    session::{SessionParts, SessionState, SessionUpdate, VoiceSession},
    tools::AssistantTools,
    transcript::LogTranscriptSink,
    transport::WebSocketConnector,
};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

enum Command {
    Converse,
    Generate {
        kind: MediaKind,
        prompt: String,
        aspect_ratio: String,
    },
}

const USAGE: &str = "usage: voice-session [image|video <prompt> [aspect-ratio]]";

impl Command {
    fn parse(args: &[String]) -> anyhow::Result<Self> {
        let Some(first) = args.first() else {
            return Ok(Command::Converse);
        };
        let (kind, default_ratio) = match first.as_str() {
            "image" => (MediaKind::Image, "1:1"),
            "video" => (MediaKind::Video, "16:9"),
            other => bail!("unknown command '{other}'\n{USAGE}"),
        };
        let prompt = args
            .get(1)
            .filter(|p| !p.trim().is_empty())
            .with_context(|| format!("missing prompt\n{USAGE}"))?;
        Ok(Command::Generate {
            kind,
            prompt: prompt.clone(),
            aspect_ratio: args.get(2).map_or(default_ratio, String::as_str).to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

fn print_update(update: &SessionUpdate) {
    match update {
        SessionUpdate::StateChanged(state) => println!("[{}]", state.label()),
        SessionUpdate::Transcript { role, text } => log::debug!("live {role:?}: {text}"),
        SessionUpdate::SecurityWarning(message) => eprintln!("warning: {message}"),
        SessionUpdate::Error(message) => eprintln!("error: {message}"),
    }
}

/// Run one conversation until Ctrl+C or until the session ends on its own.
async fn converse(
    session: &mut VoiceSession,
    mut updates: mpsc::UnboundedReceiver<SessionUpdate>,
) -> anyhow::Result<()> {
    session.start().await.context("could not start the session")?;
    println!("Press Ctrl+C to end the session.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Ctrl+C received, ending session");
                break;
            }
            update = updates.recv() => match update {
                Some(SessionUpdate::StateChanged(SessionState::Idle)) | None => break,
                Some(update) => print_update(&update),
            },
        }
    }
    session.stop().await;

    // Drain whatever teardown reported.
    while let Ok(update) = updates.try_recv() {
        print_update(&update);
    }

    let error = session
        .shared_state()
        .lock()
        .ok()
        .and_then(|snap| snap.error_message.clone());
    match error {
        Some(message) => bail!("session ended: {message}"),
        None => Ok(()),
    }
}

async fn run(config: AppConfig, command: Command) -> anyhow::Result<()> {
    let media: Arc<dyn MediaGenerator> = Arc::new(MediaService::from_config(&config.media));

    let parts = SessionParts {
        input: Arc::new(CpalMicrophone::new(config.audio.input_device.clone())),
        output: Arc::new(CpalSpeaker::new(config.audio.output_device.clone())),
        connector: Arc::new(WebSocketConnector::from_config(&config.transport)),
        tools: Arc::new(AssistantTools::new(Arc::clone(&media))),
        transcript: Arc::new(LogTranscriptSink),
    };

    let (update_tx, update_rx) = mpsc::unbounded_channel();
    let mut session = VoiceSession::new(config.session, parts)
        .with_updates(update_tx)
        .with_media(media);

    match command {
        Command::Converse => converse(&mut session, update_rx).await,
        Command::Generate {
            kind,
            prompt,
            aspect_ratio,
        } => {
            let result = session.generate_media(kind, &prompt, &aspect_ratio).await?;
            println!("{}", result.detail);
            if !result.success {
                bail!("{kind} generation failed");
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voice-session starting up");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(run(config, command))
}
