//! `run` subcommand — host the configured deck until Ctrl+C.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use deckmute_lib::DeckmuteError;

use super::{DeckConfig, PlatformEndpoint, RUNNING, Result};
use crate::deck::{self, Deck};

/// Check the config before any connection is opened.
fn check_config(config: &DeckConfig) -> Result<()> {
    if let Err(errors) = config.validate() {
        for e in &errors {
            log::error!("[config] {e}");
        }
        return Err(DeckmuteError::Config(format!(
            "{} invalid setting(s)",
            errors.len()
        )));
    }
    if config.widgets.is_empty() {
        return Err(DeckmuteError::Config(
            "no widgets configured (add a [[widgets]] entry)".into(),
        ));
    }
    Ok(())
}

/// Forward key presses typed on stdin to the deck. Ends on EOF.
fn spawn_input(deck: Arc<Deck<PlatformEndpoint>>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match deck::parse_input(&line) {
                Some((key, hold)) => {
                    if !deck.press(key, hold) {
                        println!("[input]  no widget on key {key}");
                    }
                }
                None => println!("[input]  expected `press N` or `hold N`"),
            }
        }
        log::debug!("stdin closed, key input stopped");
    });
}

/// Poll loop: redraw keys whose widgets ask for it.
fn run_loop(deck: &Deck<PlatformEndpoint>, config: &DeckConfig) {
    while RUNNING.load(Ordering::SeqCst) {
        for r in deck.tick() {
            let state = if r.muted { "MUTED" } else { "LIVE " };
            match &r.label {
                Some(label) => println!("  [key {} {label}] {state}", r.key),
                None => println!("  [key {}] {state}", r.key),
            }
        }
        std::thread::sleep(config.poll_interval());
    }
}

pub(super) fn cmd_run(config_path: Option<&Path>) -> Result<()> {
    let (config, base_dir) = super::load_config(config_path);
    check_config(&config)?;

    // Banner
    println!("deckmute — mirrors the default output's mute state on deck keys.");
    println!("  Keys:    {:?}", config.widgets.iter().map(|w| w.key).collect::<Vec<_>>());
    println!("  Poll:    every {} ms", config.poll_interval_ms);
    println!("Type `press N` or `hold N` to press a key, Ctrl+C to exit.");
    println!();

    let timeout = config.query_timeout();
    let deck = Arc::new(Deck::build(&config, base_dir, || super::connect(timeout))?);
    println!("[audio]  {} widget(s) connected", deck.keys().len());

    spawn_input(Arc::clone(&deck));
    run_loop(&deck, &config);

    println!();
    println!("Closing widgets...");
    deck.close();
    println!("Done.");
    Ok(())
}
