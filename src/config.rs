//! Configuration loading and management
//!
//! The daemon reads a small JSON document written by the preferences editor.
//! Every field is optional; anything missing or invalid falls back to its
//! default and a broken file yields the full default configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::hotkey::KeyName;

/// Environment variable that overrides the config file search
pub const CONFIG_ENV: &str = "SUPERTAP_CONFIG";

/// System-wide fallback config file
pub const SYSTEM_CONFIG_PATH: &str = "/etc/supertap/config.json";

/// Per-user config file, relative to a home directory
const USER_CONFIG_RELATIVE: &str = ".config/supertap/config.json";

const DEFAULT_TRIGGER: KeyName = KeyName::LeftMeta;
const DEFAULT_INJECTION: KeyName = KeyName::LeftCtrl;
const DEFAULT_TAP_TIMEOUT_SECS: f64 = 0.5;
const DEFAULT_SETTLE_MS: u64 = 50;

/// Immutable daemon configuration snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Key whose clean tap is detected
    pub trigger_key: KeyName,

    /// Keys pressed (in order) and released (in reverse) on a tap
    pub injection_keys: Vec<KeyName>,

    /// Maximum press duration that still counts as a tap. Always > 0.
    pub tap_timeout: Duration,

    /// Pause between the synthetic press and release
    pub settle: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trigger_key: DEFAULT_TRIGGER,
            injection_keys: vec![DEFAULT_INJECTION],
            tap_timeout: Duration::from_secs_f64(DEFAULT_TAP_TIMEOUT_SECS),
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
        }
    }
}

/// Errors that can occur while reading a config file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// On-disk shape; kept loose so a single bad field does not spoil the rest
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    trigger_key: Option<String>,
    injection_key: Option<InjectionKeys>,
    tap_timeout: Option<f64>,
    settle_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InjectionKeys {
    One(String),
    Many(Vec<String>),
}

impl Config {
    /// Load configuration from an already-resolved path.
    ///
    /// Never fails: a missing path or a broken file produces the defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            info!("no config file found, using defaults");
            return Self::default();
        };

        match Self::from_file(path) {
            Ok(config) => {
                info!(path = %path.display(), "configuration loaded");
                config
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "could not load config, using defaults");
                Self::default()
            }
        }
    }

    /// Read and parse a config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parse a config document, applying per-field defaults
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(text)?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawConfig) -> Self {
        let defaults = Self::default();

        let trigger_key = raw
            .trigger_key
            .map(|name| parse_key("trigger_key", &name, DEFAULT_TRIGGER))
            .unwrap_or(defaults.trigger_key);

        let injection_keys = match raw.injection_key {
            None => defaults.injection_keys,
            Some(InjectionKeys::One(name)) => {
                vec![parse_key("injection_key", &name, DEFAULT_INJECTION)]
            }
            Some(InjectionKeys::Many(names)) if names.is_empty() => {
                warn!("injection_key list is empty, using default");
                defaults.injection_keys
            }
            Some(InjectionKeys::Many(names)) => names
                .iter()
                .map(|name| parse_key("injection_key", name, DEFAULT_INJECTION))
                .collect(),
        };

        let tap_timeout = match raw.tap_timeout {
            None => defaults.tap_timeout,
            Some(secs) => match Duration::try_from_secs_f64(secs) {
                Ok(timeout) if !timeout.is_zero() => timeout,
                _ => {
                    warn!(tap_timeout = secs, "tap_timeout must be a positive duration, using default");
                    defaults.tap_timeout
                }
            },
        };

        let settle = raw
            .settle_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.settle);

        Self {
            trigger_key,
            injection_keys,
            tap_timeout,
            settle,
        }
    }

    /// Injection key names joined with `+`, for logging
    pub fn injection_display(&self) -> String {
        self.injection_keys
            .iter()
            .map(|k| k.name())
            .collect::<Vec<_>>()
            .join("+")
    }
}

fn parse_key(field: &str, name: &str, default: KeyName) -> KeyName {
    KeyName::from_name(name).unwrap_or_else(|| {
        warn!(field, name, fallback = %default, "unknown key name");
        default
    })
}

/// Find the config file to honor, searching user homes before the system path.
///
/// A privileged service runs with `HOME=/root`, so the invoking user's home
/// (via `SUDO_USER`) and every home under `/home` are searched as well.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }

    let home = std::env::var("HOME").ok();
    let sudo_user = std::env::var("SUDO_USER").ok();

    candidate_paths(home.as_deref(), sudo_user.as_deref(), Path::new("/home"))
        .into_iter()
        .chain(std::iter::once(PathBuf::from(SYSTEM_CONFIG_PATH)))
        .find(|path| path.is_file())
}

/// Ordered per-user candidates
fn candidate_paths(home: Option<&str>, sudo_user: Option<&str>, homes_root: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();

    if let Some(home) = home {
        if !home.starts_with("/root") {
            paths.push(Path::new(home).join(USER_CONFIG_RELATIVE));
        }
    }

    if let Some(user) = sudo_user {
        paths.push(homes_root.join(user).join(USER_CONFIG_RELATIVE));
    }

    // Unreadable /home is expected for unprivileged runs
    if let Ok(entries) = std::fs::read_dir(homes_root) {
        let mut users: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path().join(USER_CONFIG_RELATIVE))
            .collect();
        users.sort();
        for path in users {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }

    paths
}
