//! TOML-based configuration for ferry.
//!
//! Supports a config file (ferry.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [worker]
//! path = "${FERRY_HOME}/bin/ferry-worker"
//! args = ["--inspect"]
//!
//! [debug]
//! flags = ["--inspect", "--inspect-brk"]
//!
//! [terminal]
//! verbose = true
//! debug = false
//!
//! [session]
//! loggers = ["build", "lint"]
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Worker process configuration.
    pub worker: WorkerSettings,

    /// Debugger flags rewritten per worker.
    pub debug: DebugSettings,

    /// Root terminal configuration.
    pub terminal: TerminalSettings,

    /// Loggers available to workers.
    pub session: SessionSettings,
}

/// Worker configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Path to the worker binary (supports ${ENV_VAR} expansion).
    pub path: Option<String>,

    /// Runtime arguments placed before the launch arguments.
    pub args: Vec<String>,
}

/// Debugger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DebugSettings {
    /// Runtime flags that open a debugger port.
    pub flags: Vec<String>,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            flags: vec!["--inspect".to_string(), "--inspect-brk".to_string()],
        }
    }
}

/// Root terminal configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TerminalSettings {
    /// Show verbose lines.
    pub verbose: bool,

    /// Show debug lines.
    pub debug: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Logger names the host session can resolve.
    pub loggers: Vec<String>,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `FERRY_CONFIG`
    /// 2. `./ferry.toml`
    /// 3. `~/.config/ferry/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("FERRY_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("ferry.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("ferry").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Runtime arguments with environment variables expanded.
    pub fn worker_args(&self) -> Result<Vec<String>, SettingsError> {
        self.worker.args.iter().map(|a| expand_env_vars(a)).collect()
    }

    /// Get the worker binary path.
    ///
    /// Returns the configured path, otherwise searches next to the running
    /// executable, the working directory and `PATH`.
    pub fn worker_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.worker.path {
            let expanded = expand_env_vars(path).ok()?;
            return Some(PathBuf::from(expanded));
        }

        // Installed alongside the supervisor binary
        if let Some(sibling) = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(WORKER_BINARY)))
        {
            if sibling.exists() {
                return Some(sibling);
            }
        }

        let candidates = ["./ferry-worker", "./target/debug/ferry-worker"];
        for candidate in candidates {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(output) = std::process::Command::new("which")
            .arg(WORKER_BINARY)
            .output()
        {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(PathBuf::from(path));
                }
            }
        }

        None
    }
}

const WORKER_BINARY: &str = "ferry-worker";

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name: String = if chars.peek() == Some(&'{') {
            chars.next();
            chars.by_ref().take_while(|&ch| ch != '}').collect()
        } else {
            let mut name = String::new();
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                name.push(ch);
            }
            if name.is_empty() {
                // A lone `$` stays literal.
                result.push('$');
                continue;
            }
            name
        };

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
