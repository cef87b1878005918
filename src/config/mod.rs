//! Configuration module.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! `AppPaths` for the settings location, and TOML persistence via
//! `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::{AppPaths, CONFIG_DIR_ENV};
pub use settings::{
    AppConfig, AudioConfig, FallbackConfig, MediaConfig, SessionConfig, TransportConfig,
    INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE,
};
