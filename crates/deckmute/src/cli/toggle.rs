//! `toggle` subcommand — flip the default output's mute state once.

use std::path::Path;

use super::{Result, audio, mute_label};

/// The read and the write go through one serialized endpoint, the same path
/// a key press takes. A running deck picks the change up on its next poll.
pub(super) fn cmd_toggle(config_path: Option<&Path>) -> Result<()> {
    let (config, _) = super::load_config(config_path);
    let endpoint = audio::SharedEndpoint::new(super::connect(config.query_timeout())?);
    let muted = endpoint.toggle_mute()?;
    if let Err(e) = endpoint.close() {
        log::warn!("close failed: {e}");
    }
    println!("Output: {}", mute_label(muted));
    Ok(())
}
