//! `config` subcommand — show current configuration and file paths.

use std::path::Path;

use super::{ConfigOutput, DeckConfig, Result, kv, kv_indent, kv_width};
use deckmute_lib::config::{ICON_KEY, ICON_MUTE_KEY, WidgetOptions};

fn option_display(options: &WidgetOptions, key: &str) -> String {
    match deckmute_lib::config::option_str(options, key) {
        Ok(s) => s.to_string(),
        Err(e) => format!("(invalid: {e})"),
    }
}

pub(super) fn cmd_config(json: bool, custom_path: Option<&Path>) -> Result<()> {
    let (config, base_dir) = super::load_config(custom_path);
    let config_path = custom_path.map(|p| p.to_path_buf()).or_else(DeckConfig::path);
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());

    if json {
        let output = ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            settings: config,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).map_err(std::io::Error::other)?
        );
        return Ok(());
    }

    // Human-readable output
    let w = kv_width(
        &["Config file:", "Icon dir:"],
        &[
            "poll_interval_ms:",
            "query_timeout_ms:",
            "key_size:",
            "icon:",
            "iconMute:",
        ],
    );

    match &config_path {
        Some(p) => {
            if config_exists {
                kv("Config file:", format_args!("{} (loaded)", p.display()), w);
            } else {
                kv(
                    "Config file:",
                    format_args!("{} (not found, using defaults)", p.display()),
                    w,
                );
            }
        }
        None => kv("Config file:", "(no config directory)", w),
    }
    match &base_dir {
        Some(d) => kv("Icon dir:", d.display(), w),
        None => kv("Icon dir:", "(current directory)", w),
    }
    println!();

    println!("Settings:");
    kv_indent("poll_interval_ms:", config.poll_interval_ms, w);
    kv_indent("query_timeout_ms:", config.query_timeout_ms, w);
    match config.key_size {
        Some(size) => kv_indent("key_size:", format_args!("{size}x{size}"), w),
        None => kv_indent("key_size:", "(native icon size)", w),
    }
    println!();

    if config.widgets.is_empty() {
        println!("Widgets: (none)");
    }
    for entry in &config.widgets {
        match &entry.label {
            Some(label) => println!("Key {} ({label}):", entry.key),
            None => println!("Key {}:", entry.key),
        }
        kv_indent("icon:", option_display(&entry.config, ICON_KEY), w);
        kv_indent("iconMute:", option_display(&entry.config, ICON_MUTE_KEY), w);
    }

    if let Err(errors) = config.validate() {
        for e in &errors {
            log::warn!("[config] {e}");
        }
    }
    Ok(())
}
