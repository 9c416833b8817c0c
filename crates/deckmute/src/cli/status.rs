//! `status` subcommand — show the default output and its mute state.

use std::path::Path;

use super::{OutputJson, Result, StatusOutput, audio, kv, kv_indent, kv_width, mute_label};
use deckmute_lib::audio::{AudioEndpoint, AudioError};

/// Query the default output. Returns None (and logs why) when the daemon
/// can't be reached.
fn get_output(timeout: std::time::Duration) -> Option<audio::Output> {
    let query = || -> std::result::Result<audio::Output, AudioError> {
        let mut endpoint = super::connect(timeout)?;
        let output = endpoint.default_output();
        if let Err(e) = endpoint.close() {
            log::debug!("close after status query failed: {e}");
        }
        output
    };
    query()
        .inspect_err(|e| log::warn!("[audio] {e}"))
        .ok()
}

fn print_status(output: Option<audio::Output>, json: bool) -> Result<()> {
    if json {
        let status = StatusOutput {
            version: env!("CARGO_PKG_VERSION").to_string(),
            output: output.map(OutputJson::from),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&status).map_err(std::io::Error::other)?
        );
        return Ok(());
    }

    let w = kv_width(&["Version:", "Output:"], &["Name:", "Description:", "Mute:"]);
    kv("Version:", env!("CARGO_PKG_VERSION"), w);
    match output {
        Some(o) => {
            println!("Output:");
            kv_indent("Name:", &o.name, w);
            kv_indent("Description:", o.description.as_deref().unwrap_or("(none)"), w);
            kv_indent("Mute:", mute_label(o.mute), w);
        }
        None => kv("Output:", "(unavailable)", w),
    }
    Ok(())
}

pub(super) fn cmd_status(json: bool, config_path: Option<&Path>) -> Result<()> {
    let (config, _) = super::load_config(config_path);
    print_status(get_output(config.query_timeout()), json)
}
