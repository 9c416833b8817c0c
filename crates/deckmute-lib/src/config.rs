//! Deck configuration — TOML-based, platform-aware paths.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DeckmuteError, Result};

/// Widget config key for the unmuted icon path.
pub const ICON_KEY: &str = "icon";
/// Widget config key for the muted icon path.
pub const ICON_MUTE_KEY: &str = "iconMute";

/// Free-form per-widget configuration map.
pub type WidgetOptions = HashMap<String, toml::Value>;

/// Look up a string entry in a widget configuration map.
pub fn option_str<'a>(options: &'a WidgetOptions, key: &str) -> Result<&'a str> {
    match options.get(key) {
        Some(toml::Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(toml::Value::String(_)) => Err(DeckmuteError::Config(format!("`{key}` is empty"))),
        Some(other) => Err(DeckmuteError::Config(format!(
            "`{key}` must be a string, got {}",
            other.type_str()
        ))),
        None => Err(DeckmuteError::Config(format!("missing `{key}`"))),
    }
}

/// One deck key bound to a sink-mute widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetEntry {
    /// Zero-based key index on the deck.
    pub key: u8,

    /// Optional text label drawn by the base widget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Widget configuration map (`icon`, `iconMute`).
    #[serde(default)]
    pub config: WidgetOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckConfig {
    /// How often the host asks widgets whether they need a redraw. Default: 250.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on any single audio daemon round-trip. Default: 500.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Square key size in pixels icons are scaled to. Unset = native size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_size: Option<u32>,

    #[serde(default)]
    pub widgets: Vec<WidgetEntry>,
}

fn default_poll_interval_ms() -> u64 {
    250
}
fn default_query_timeout_ms() -> u64 {
    500
}

impl Default for DeckConfig {
    fn default() -> Self {
        DeckConfig {
            poll_interval_ms: default_poll_interval_ms(),
            query_timeout_ms: default_query_timeout_ms(),
            key_size: None,
            widgets: Vec::new(),
        }
    }
}

/// Validation errors that [`DeckConfig::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A duration field is zero (`field` names it).
    ZeroDuration(&'static str),
    /// Two widgets are bound to the same key.
    DuplicateKey(u8),
    /// A widget lacks a usable icon entry.
    MissingIcon { key: u8, reason: String },
    /// `key_size` is zero.
    ZeroKeySize,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ZeroDuration(field) => write!(f, "{field} must be greater than 0"),
            ValidationError::DuplicateKey(k) => write!(f, "Key {k} is bound more than once"),
            ValidationError::MissingIcon { key, reason } => {
                write!(f, "Key {key}: {reason}")
            }
            ValidationError::ZeroKeySize => write!(f, "key_size must be greater than 0"),
        }
    }
}

impl DeckConfig {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("deckmute"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.poll_interval_ms == 0 {
            errors.push(ValidationError::ZeroDuration("poll_interval_ms"));
        }
        if self.query_timeout_ms == 0 {
            errors.push(ValidationError::ZeroDuration("query_timeout_ms"));
        }
        if self.key_size == Some(0) {
            errors.push(ValidationError::ZeroKeySize);
        }

        let mut seen = HashSet::new();
        for w in &self.widgets {
            if !seen.insert(w.key) {
                errors.push(ValidationError::DuplicateKey(w.key));
            }
            for field in [ICON_KEY, ICON_MUTE_KEY] {
                if let Err(e) = option_str(&w.config, field) {
                    errors.push(ValidationError::MissingIcon {
                        key: w.key,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
