//! Configuration module for ferry.
//!
//! Handles the config file, environment variables, and settings.

mod settings;

pub use settings::{
    expand_env_vars, DebugSettings, SessionSettings, Settings, SettingsError, TerminalSettings,
    WorkerSettings,
};
