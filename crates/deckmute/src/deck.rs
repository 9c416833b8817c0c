//! Virtual deck — owns one widget per configured key and drives the
//! poll → update → composite cycle and key presses.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use deckmute_lib::audio::{self, AudioEndpoint};
use deckmute_lib::button::ButtonWidget;
use deckmute_lib::config::DeckConfig;
use deckmute_lib::diagnostics::{DiagnosticSink, LogSink};
use deckmute_lib::error::Result;
use deckmute_lib::icon::FileIconLoader;
use deckmute_lib::widget::{SinkMuteWidget, Widget};

/// State of a key after it was redrawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redraw {
    pub key: u8,
    pub label: Option<String>,
    pub muted: bool,
}

struct DeckKey<E> {
    key: u8,
    widget: Mutex<SinkMuteWidget<E, ButtonWidget>>,
}

pub struct Deck<E> {
    keys: Vec<DeckKey<E>>,
}

/// One host cycle for a widget: poll, then update when asked to.
///
/// Returns whether the widget was redrawn.
fn refresh(widget: &mut dyn Widget) -> Result<bool> {
    if !widget.requires_update() {
        return Ok(false);
    }
    widget.update()?;
    Ok(true)
}

impl<E: AudioEndpoint> Deck<E> {
    /// Build every configured widget, each with its own daemon connection.
    ///
    /// Fails on the first widget that cannot be constructed; widgets built
    /// so far are dropped, which releases their connections.
    pub fn build(
        config: &DeckConfig,
        base_dir: Option<PathBuf>,
        connect: impl Fn() -> audio::Result<E>,
    ) -> Result<Self> {
        let loader = FileIconLoader::new(base_dir, config.key_size);
        let diagnostics: Arc<dyn DiagnosticSink> = Arc::new(LogSink);

        let mut keys = Vec::with_capacity(config.widgets.len());
        for entry in &config.widgets {
            let widget = SinkMuteWidget::new(
                ButtonWidget::new(entry.key, entry.label.clone()),
                &entry.config,
                &loader,
                &connect,
                Arc::clone(&diagnostics),
            )
            .inspect_err(|e| log::error!("[key {}] widget not created: {e}", entry.key))?;
            keys.push(DeckKey {
                key: entry.key,
                widget: Mutex::new(widget),
            });
        }
        Ok(Deck { keys })
    }

    /// Configured key indices, in config order.
    pub fn keys(&self) -> Vec<u8> {
        self.keys.iter().map(|k| k.key).collect()
    }

    /// Run one poll cycle over every key. Update failures are logged and
    /// retried on the next cycle.
    pub fn tick(&self) -> Vec<Redraw> {
        let mut redrawn = Vec::new();
        for k in &self.keys {
            let Ok(mut widget) = k.widget.lock() else {
                log::warn!("[key {}] widget mutex poisoned", k.key);
                continue;
            };
            match refresh(&mut *widget) {
                Ok(true) => {
                    let button = widget.base();
                    redrawn.push(Redraw {
                        key: button.key(),
                        label: button.label().map(str::to_string),
                        muted: widget.is_muted(),
                    });
                }
                Ok(false) => {}
                Err(e) => log::warn!("[key {}] update failed: {e}", k.key),
            }
        }
        redrawn
    }

    /// Deliver a key press. Returns `false` if no widget is bound to `key`.
    pub fn press(&self, key: u8, hold: bool) -> bool {
        let Some(k) = self.keys.iter().find(|k| k.key == key) else {
            return false;
        };
        match k.widget.lock() {
            Ok(widget) => widget.trigger_action(hold),
            Err(_) => log::warn!("[key {key}] widget mutex poisoned"),
        }
        true
    }

    /// Close every widget. Errors are logged; every widget ends up closed.
    pub fn close(&self) {
        for k in &self.keys {
            let Ok(mut widget) = k.widget.lock() else {
                continue;
            };
            if let Err(e) = Widget::close(&mut *widget) {
                log::warn!("[key {}] close failed: {e}", k.key);
            }
        }
    }
}

/// Parse one line of key input: `press N`, `hold N`, or a bare `N`.
pub fn parse_input(line: &str) -> Option<(u8, bool)> {
    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    let (hold, key) = match first.to_ascii_lowercase().as_str() {
        "press" | "p" => (false, parts.next()?),
        "hold" | "h" => (true, parts.next()?),
        _ => (false, first),
    };
    if parts.next().is_some() {
        return None;
    }
    key.parse().ok().map(|k| (k, hold))
}
