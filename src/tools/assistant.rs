//! `AssistantTools` — the built-in [`ToolExecutor`].
//!
//! | Tool                   | Arguments                          |
//! |------------------------|------------------------------------|
//! | `make_call`            | `contact`                          |
//! | `send_sms`             | `contact`, `message`               |
//! | `toggle_phone_setting` | `setting`, `enabled`               |
//! | `generate_image`       | `prompt`, `aspect_ratio` (opt.)    |
//! | `generate_video`       | `prompt`, `aspect_ratio` (opt.)    |
//!
//! Phone actions go through an optional [`PhoneBridge`]. Without one the
//! action is reported as done with [`SIMULATED_NOTE`] appended, so the
//! conversation can continue on hosts with no telephony.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{failure_text, ToolArgs, ToolError, ToolExecutor, ToolKind};
use crate::media::MediaGenerator;

pub const MAKE_CALL: &str = "make_call";
pub const SEND_SMS: &str = "send_sms";
pub const TOGGLE_PHONE_SETTING: &str = "toggle_phone_setting";
pub const GENERATE_IMAGE: &str = "generate_image";
pub const GENERATE_VIDEO: &str = "generate_video";

/// Appended to phone results when no [`PhoneBridge`] is installed.
pub const SIMULATED_NOTE: &str = "(simulated: phone capability unavailable)";

// ---------------------------------------------------------------------------
// PhoneSetting / PhoneBridge
// ---------------------------------------------------------------------------

/// Device settings `toggle_phone_setting` can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneSetting {
    Wifi,
    Bluetooth,
    Flashlight,
    AirplaneMode,
    DoNotDisturb,
    MobileData,
}

impl PhoneSetting {
    /// Lenient parse: case, spaces, `_` and `-` are ignored.
    pub fn parse(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "wifi" | "wlan" => Some(PhoneSetting::Wifi),
            "bluetooth" | "bt" => Some(PhoneSetting::Bluetooth),
            "flashlight" | "torch" => Some(PhoneSetting::Flashlight),
            "airplanemode" | "airplane" | "flightmode" => Some(PhoneSetting::AirplaneMode),
            "donotdisturb" | "dnd" => Some(PhoneSetting::DoNotDisturb),
            "mobiledata" | "cellulardata" | "data" => Some(PhoneSetting::MobileData),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PhoneSetting::Wifi => "WiFi",
            PhoneSetting::Bluetooth => "Bluetooth",
            PhoneSetting::Flashlight => "Flashlight",
            PhoneSetting::AirplaneMode => "Airplane mode",
            PhoneSetting::DoNotDisturb => "Do Not Disturb",
            PhoneSetting::MobileData => "Mobile data",
        }
    }
}

/// Native telephony and device-settings capability.
#[async_trait]
pub trait PhoneBridge: Send + Sync {
    async fn place_call(&self, contact: &str) -> Result<(), ToolError>;
    async fn send_sms(&self, contact: &str, message: &str) -> Result<(), ToolError>;
    async fn set_setting(&self, setting: PhoneSetting, enabled: bool) -> Result<(), ToolError>;
}

// ---------------------------------------------------------------------------
// AssistantTools
// ---------------------------------------------------------------------------

pub struct AssistantTools {
    phone: Option<Arc<dyn PhoneBridge>>,
    media: Arc<dyn MediaGenerator>,
}

impl AssistantTools {
    /// Executor with media generation and simulated phone actions.
    pub fn new(media: Arc<dyn MediaGenerator>) -> Self {
        Self { phone: None, media }
    }

    /// Route phone actions through `bridge`.
    pub fn with_phone(mut self, bridge: Arc<dyn PhoneBridge>) -> Self {
        self.phone = Some(bridge);
        self
    }

    fn done(&self, text: String) -> String {
        if self.phone.is_some() {
            text
        } else {
            format!("{text} {SIMULATED_NOTE}")
        }
    }

    async fn run(&self, name: &str, args: &ToolArgs) -> Result<String, ToolError> {
        match name {
            MAKE_CALL => {
                let contact = str_arg(args, "contact")?;
                if let Some(phone) = &self.phone {
                    phone.place_call(contact).await?;
                }
                Ok(self.done(format!("Calling {contact}.")))
            }
            SEND_SMS => {
                let contact = str_arg(args, "contact")?;
                let message = str_arg(args, "message")?;
                if let Some(phone) = &self.phone {
                    phone.send_sms(contact, message).await?;
                }
                Ok(self.done(format!("Message sent to {contact}.")))
            }
            TOGGLE_PHONE_SETTING => {
                let raw = str_arg(args, "setting")?;
                let setting = PhoneSetting::parse(raw).ok_or_else(|| ToolError::InvalidArgument {
                    name: "setting",
                    reason: format!("unknown setting '{raw}'"),
                })?;
                let enabled = bool_arg(args, "enabled")?;
                if let Some(phone) = &self.phone {
                    phone.set_setting(setting, enabled).await?;
                }
                let state = if enabled { "on" } else { "off" };
                Ok(self.done(format!("{} is now {state}.", setting.label())))
            }
            GENERATE_IMAGE => {
                let prompt = str_arg(args, "prompt")?;
                let aspect = opt_str_arg(args, "aspect_ratio").unwrap_or("1:1");
                Ok(self.media.generate_image(prompt, aspect).await.detail)
            }
            GENERATE_VIDEO => {
                let prompt = str_arg(args, "prompt")?;
                let aspect = opt_str_arg(args, "aspect_ratio").unwrap_or("16:9");
                Ok(self.media.generate_video(prompt, aspect).await.detail)
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

#[async_trait]
impl ToolExecutor for AssistantTools {
    async fn execute(&self, name: &str, args: &ToolArgs) -> String {
        match self.run(name, args).await {
            Ok(text) => {
                log::info!("tools: {name} done");
                text
            }
            Err(e) => {
                log::warn!("tools: {name} failed: {e}");
                failure_text(&e)
            }
        }
    }

    fn kind(&self, name: &str) -> ToolKind {
        match name {
            GENERATE_IMAGE | GENERATE_VIDEO => ToolKind::MediaGeneration,
            _ => ToolKind::Action,
        }
    }
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn opt_str_arg<'a>(args: &'a ToolArgs, name: &str) -> Option<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn str_arg<'a>(args: &'a ToolArgs, name: &'static str) -> Result<&'a str, ToolError> {
    opt_str_arg(args, name).ok_or(ToolError::MissingArgument(name))
}

fn bool_arg(args: &ToolArgs, name: &'static str) -> Result<bool, ToolError> {
    let invalid = |v: &Value| ToolError::InvalidArgument {
        name,
        reason: format!("expected a boolean, got {v}"),
    };
    match args.get(name) {
        None | Some(Value::Null) => Err(ToolError::MissingArgument(name)),
        Some(Value::Bool(b)) => Ok(*b),
        Some(v @ Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Ok(true),
            "false" | "off" | "no" | "0" => Ok(false),
            _ => Err(invalid(v)),
        },
        Some(v @ Value::Number(n)) => match n.as_i64() {
            Some(1) => Ok(true),
            Some(0) => Ok(false),
            _ => Err(invalid(v)),
        },
        Some(v) => Err(invalid(v)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
