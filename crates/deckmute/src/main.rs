//! deckmute — headless button-deck host for the default-sink mute widget.
//!
//! Console subsystem: keys are pressed by typing `press N` / `hold N` on stdin.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
#[cfg(not(windows))]
use std::sync::atomic::Ordering;

use clap::Parser;

mod cli;
mod deck;

/// Shared shutdown flag — set by Ctrl+C handler.
pub static RUNNING: AtomicBool = AtomicBool::new(true);

#[derive(Parser)]
#[command(
    name = "deckmute",
    version,
    about = "Button-deck widget mirroring the default audio output's mute state"
)]
struct Args {
    /// Output as JSON (for status, config)
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: cli::Command,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();

    #[cfg(not(windows))]
    {
        ctrlc::set_handler(move || {
            RUNNING.store(false, Ordering::SeqCst);
        })
        .ok();
    }

    if let Err(e) = cli::run(args.command, args.json, args.config.as_deref()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
