//! CLI subcommands — deck host, default output status, toggle, config.

mod config_cmd;
mod run;
mod status;
mod toggle;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Subcommand;
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use deckmute_lib::audio;
pub(super) use deckmute_lib::config::DeckConfig;
pub(super) use deckmute_lib::error::Result;

/// Endpoint type the CLI connects with on this platform.
#[cfg(target_os = "linux")]
pub(super) type PlatformEndpoint = audio::PulseEndpoint;
#[cfg(not(target_os = "linux"))]
pub(super) type PlatformEndpoint = audio::stub::StubEndpoint;

/// Open a connection to the platform's audio daemon.
#[cfg(target_os = "linux")]
pub(super) fn connect(timeout: Duration) -> audio::Result<PlatformEndpoint> {
    audio::PulseEndpoint::connect(timeout)
}

#[cfg(not(target_os = "linux"))]
pub(super) fn connect(_timeout: Duration) -> audio::Result<PlatformEndpoint> {
    Err(audio::AudioError::InitFailed(
        "Default output control is not yet supported on this platform.".into(),
    ))
}

/// Load the config from `custom` or the platform default, logging parse
/// warnings. Also returns the directory relative icon paths resolve against.
pub(super) fn load_config(custom: Option<&Path>) -> (DeckConfig, Option<PathBuf>) {
    let (config, warnings, base_dir) = match custom {
        Some(path) => {
            let (config, warnings) = DeckConfig::load_from(path);
            (config, warnings, path.parent().map(Path::to_path_buf))
        }
        None => {
            let (config, warnings) = DeckConfig::load_with_warnings();
            (config, warnings, DeckConfig::dir())
        }
    };
    for w in &warnings {
        log::warn!("[config] {w}");
    }
    (config, base_dir)
}

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

pub(super) fn mute_label(muted: bool) -> &'static str {
    if muted { "MUTED" } else { "UNMUTED" }
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct StatusOutput {
    pub version: String,
    pub output: Option<OutputJson>,
}

#[derive(Serialize)]
pub(super) struct OutputJson {
    pub name: String,
    pub description: Option<String>,
    pub muted: bool,
}

impl From<audio::Output> for OutputJson {
    fn from(o: audio::Output) -> Self {
        OutputJson {
            name: o.name,
            description: o.description,
            muted: o.mute,
        }
    }
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: DeckConfig,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the deck host (polls widgets, reads `press N` / `hold N` from stdin)
    Run,

    /// Show the default output and its mute state
    Status,

    /// Toggle the default output's mute state
    Toggle,

    /// Show current configuration and file paths
    Config,
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, json: bool, config_path: Option<&Path>) -> Result<()> {
    match cmd {
        Command::Run => {
            if json {
                warn_json_unsupported("run");
            }
            run::cmd_run(config_path)
        }
        Command::Status => status::cmd_status(json, config_path),
        Command::Toggle => {
            if json {
                warn_json_unsupported("toggle");
            }
            toggle::cmd_toggle(config_path)
        }
        Command::Config => config_cmd::cmd_config(json, config_path),
    }
}
