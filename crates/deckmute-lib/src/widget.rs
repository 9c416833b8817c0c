//! Sink mute widget — mirrors the default output's mute flag onto a deck key
//! and toggles it when the key is pressed.
//!
//! The widget keeps the last mute flag it rendered for (`mute`). Each poll
//! compares it to a fresh daemon query; `update` applies a divergence by
//! swapping the key image, so every external change is drawn exactly once.
//! Poll and press failures are absorbed and reported to the injected
//! [`DiagnosticSink`]; `update` failures are returned and leave the widget
//! untouched.

use std::sync::Arc;

use crate::audio::{AudioEndpoint, AudioError, SharedEndpoint};
use crate::button::BaseWidget;
use crate::config::{self, ICON_KEY, ICON_MUTE_KEY, WidgetOptions};
use crate::diagnostics::{Diagnostic, DiagnosticSink, Stage};
use crate::error::{DeckmuteError, Result};
use crate::icon::{Bitmap, IconLoader};

/// Surface a deck host drives: poll, draw, press, unload.
pub trait Widget: Send {
    /// Cheap check whether the widget wants to be repainted.
    fn requires_update(&self) -> bool;
    /// Bring the widget in line with current state and composite it.
    fn update(&mut self) -> Result<()>;
    /// Key press (`hold` = long press).
    fn trigger_action(&self, hold: bool);
    /// Release the widget's resources.
    fn close(&mut self) -> Result<()>;
}

/// Activation failure tagged with the step that failed.
struct ActivationFailure(Stage, AudioError);

impl From<AudioError> for ActivationFailure {
    fn from(e: AudioError) -> Self {
        ActivationFailure(Stage::ActivationQuery, e)
    }
}

pub struct SinkMuteWidget<E, B> {
    base: B,
    endpoint: SharedEndpoint<E>,
    diagnostics: Arc<dyn DiagnosticSink>,
    mute: bool,
    icon_unmute: Bitmap,
    icon_mute: Bitmap,
}

impl<E: AudioEndpoint, B: BaseWidget> SinkMuteWidget<E, B> {
    /// Build a widget from its configuration map.
    ///
    /// Both icons are decoded before `connect` is called, so a bad icon never
    /// opens a daemon connection. The initial mute flag is read once and the
    /// matching icon is set on `base` before returning.
    pub fn new(
        mut base: B,
        options: &WidgetOptions,
        loader: &impl IconLoader,
        connect: impl FnOnce() -> crate::audio::Result<E>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        let icon_unmute = loader.load_icon(config::option_str(options, ICON_KEY)?)?;
        let icon_mute = loader.load_icon(config::option_str(options, ICON_MUTE_KEY)?)?;

        let endpoint = SharedEndpoint::new(connect()?);
        let mute = endpoint.is_muted()?;

        base.set_image(if mute {
            icon_mute.clone()
        } else {
            icon_unmute.clone()
        });
        log::debug!("sink mute widget ready (muted: {mute})");

        Ok(Self {
            base,
            endpoint,
            diagnostics,
            mute,
            icon_unmute,
            icon_mute,
        })
    }

    fn icon_for(&self, mute: bool) -> &Bitmap {
        if mute { &self.icon_mute } else { &self.icon_unmute }
    }

    /// True when the daemon's flag differs from the rendered one, or when the
    /// base widget needs a redraw for its own reasons. Always false once closed.
    pub fn requires_update(&self) -> bool {
        let mute_changed = match self.endpoint.is_muted() {
            Ok(muted) => muted != self.mute,
            Err(e @ AudioError::Closed) => {
                self.diagnostics.report(Diagnostic::new(Stage::Poll, &e));
                return false;
            }
            Err(e) => {
                self.diagnostics.report(Diagnostic::new(Stage::Poll, &e));
                false
            }
        };
        mute_changed || self.base.requires_update()
    }

    /// Re-query the flag, swap the icon if it changed, then composite.
    pub fn update(&mut self) -> Result<()> {
        if self.endpoint.is_closed() {
            return Err(DeckmuteError::Closed);
        }
        let muted = self.endpoint.is_muted()?;
        if muted != self.mute {
            let icon = self.icon_for(muted).clone();
            self.mute = muted;
            self.base.set_image(icon);
            log::debug!("default sink {}", if muted { "muted" } else { "unmuted" });
        }
        self.base.update()
    }

    /// Invert the daemon's current mute flag.
    ///
    /// The read and the write happen under one endpoint lock. Failures are
    /// reported and the press is dropped; the next poll picks up whatever
    /// state the daemon ends up in. Hold behaves like a short press.
    pub fn trigger_action(&self, _hold: bool) {
        let outcome = self.endpoint.with(|ep| {
            let output = ep.default_output()?;
            ep.set_output_mute(&output, !output.mute)
                .map_err(|e| ActivationFailure(Stage::ActivationCommand, e))?;
            Ok::<bool, ActivationFailure>(!output.mute)
        });
        match outcome {
            Ok(target) => log::debug!("requested default sink mute -> {target}"),
            Err(ActivationFailure(stage, e)) => {
                self.diagnostics.report(Diagnostic::new(stage, &e));
            }
        }
    }

    /// Release the daemon connection. Closing twice is a no-op.
    ///
    /// The widget counts as closed even when the endpoint reports an error.
    pub fn close(&mut self) -> Result<()> {
        if self.endpoint.is_closed() {
            return Ok(());
        }
        self.endpoint.close()?;
        log::debug!("sink mute widget closed");
        Ok(())
    }

    /// The mute flag the widget last rendered for.
    pub fn is_muted(&self) -> bool {
        self.mute
    }

    pub fn is_closed(&self) -> bool {
        self.endpoint.is_closed()
    }

    pub fn base(&self) -> &B {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut B {
        &mut self.base
    }

    pub fn icon_muted(&self) -> &Bitmap {
        &self.icon_mute
    }

    pub fn icon_unmuted(&self) -> &Bitmap {
        &self.icon_unmute
    }
}

impl<E: AudioEndpoint, B: BaseWidget> Widget for SinkMuteWidget<E, B> {
    fn requires_update(&self) -> bool {
        SinkMuteWidget::requires_update(self)
    }

    fn update(&mut self) -> Result<()> {
        SinkMuteWidget::update(self)
    }

    fn trigger_action(&self, hold: bool) {
        SinkMuteWidget::trigger_action(self, hold)
    }

    fn close(&mut self) -> Result<()> {
        SinkMuteWidget::close(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::stub::StubEndpoint;
    use crate::button::ButtonWidget;
    use crate::diagnostics::RecordingSink;
    use crate::icon::{self, IconError};
    use std::cell::Cell;
    use std::collections::HashMap;

    const UNMUTED: [u8; 4] = [0, 200, 0, 255];
    const MUTED: [u8; 4] = [200, 0, 0, 255];

    /// Loader serving solid bitmaps keyed by path.
    struct MapLoader(HashMap<&'static str, Bitmap>);

    impl IconLoader for MapLoader {
        fn load_icon(&self, path: &str) -> icon::Result<Bitmap> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| IconError::NotFound(path.into()))
        }
    }

    fn loader() -> MapLoader {
        MapLoader(HashMap::from([
            ("unmuted.png", Bitmap::solid(2, 2, UNMUTED)),
            ("muted.png", Bitmap::solid(2, 2, MUTED)),
        ]))
    }

    fn options(icon: &str, icon_mute: &str) -> WidgetOptions {
        WidgetOptions::from([
            (ICON_KEY.to_string(), toml::Value::String(icon.into())),
            (ICON_MUTE_KEY.to_string(), toml::Value::String(icon_mute.into())),
        ])
    }

    type TestWidget = SinkMuteWidget<StubEndpoint, ButtonWidget>;

    fn make_widget(stub: &StubEndpoint) -> (TestWidget, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let stub = stub.clone();
        let mut w = SinkMuteWidget::new(
            ButtonWidget::new(0, None),
            &options("unmuted.png", "muted.png"),
            &loader(),
            move || Ok(stub),
            sink.clone(),
        )
        .unwrap();
        // Host draws the first frame
        w.update().unwrap();
        (w, sink)
    }

    fn shown(w: &TestWidget) -> &Bitmap {
        w.base().frame().unwrap()
    }

    // ── Construction ──

    #[test]
    fn new_reads_initial_state_unmuted() {
        let stub = StubEndpoint::new(false);
        let (w, _) = make_widget(&stub);
        assert!(!w.is_muted());
        assert_eq!(shown(&w), w.icon_unmuted());
    }

    #[test]
    fn new_shows_muted_icon_when_sink_starts_muted() {
        let stub = StubEndpoint::new(true);
        let (w, _) = make_widget(&stub);
        assert!(w.is_muted());
        assert_eq!(shown(&w), w.icon_muted());
    }

    #[test]
    fn new_fails_on_missing_icon_key_without_connecting() {
        let connected = Cell::new(false);
        let mut opts = options("unmuted.png", "muted.png");
        opts.remove(ICON_MUTE_KEY);
        let result = SinkMuteWidget::<StubEndpoint, _>::new(
            ButtonWidget::new(0, None),
            &opts,
            &loader(),
            || {
                connected.set(true);
                Ok(StubEndpoint::new(false))
            },
            Arc::new(RecordingSink::new()),
        );
        assert!(matches!(result, Err(DeckmuteError::Config(_))));
        assert!(!connected.get());
    }

    #[test]
    fn new_fails_on_icon_decode_error() {
        let result = SinkMuteWidget::new(
            ButtonWidget::new(0, None),
            &options("unmuted.png", "missing.png"),
            &loader(),
            || Ok(StubEndpoint::new(false)),
            Arc::new(RecordingSink::new()),
        );
        assert!(matches!(
            result,
            Err(DeckmuteError::Icon(IconError::NotFound(_)))
        ));
    }

    #[test]
    fn new_fails_on_connection_error() {
        let result = SinkMuteWidget::<StubEndpoint, _>::new(
            ButtonWidget::new(0, None),
            &options("unmuted.png", "muted.png"),
            &loader(),
            || Err(AudioError::InitFailed("no daemon".into())),
            Arc::new(RecordingSink::new()),
        );
        assert!(matches!(
            result,
            Err(DeckmuteError::Audio(AudioError::InitFailed(_)))
        ));
    }

    #[test]
    fn new_fails_on_initial_query_error() {
        let stub = StubEndpoint::new(false);
        stub.fail_queries(true);
        let s = stub.clone();
        let result = SinkMuteWidget::new(
            ButtonWidget::new(0, None),
            &options("unmuted.png", "muted.png"),
            &loader(),
            move || Ok(s),
            Arc::new(RecordingSink::new()),
        );
        assert!(matches!(
            result,
            Err(DeckmuteError::Audio(AudioError::Disconnected))
        ));
    }

    // ── Poll ──

    #[test]
    fn poll_is_idempotent_without_external_change() {
        let stub = StubEndpoint::new(false);
        let (w, sink) = make_widget(&stub);
        for _ in 0..5 {
            assert!(!w.requires_update());
        }
        assert!(!w.is_muted());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn poll_detects_external_change_without_mutating() {
        let stub = StubEndpoint::new(false);
        let (w, _) = make_widget(&stub);
        stub.set_external_mute(true);
        assert!(w.requires_update());
        assert!(w.requires_update());
        assert!(!w.is_muted(), "poll must not touch the cached flag");
        assert_eq!(shown(&w), w.icon_unmuted());
    }

    #[test]
    fn poll_includes_base_redraw_signal() {
        let stub = StubEndpoint::new(false);
        let (mut w, _) = make_widget(&stub);
        w.base_mut().set_label(Some("Speakers".into()));
        assert!(w.requires_update());
        w.update().unwrap();
        assert!(!w.requires_update());
    }

    #[test]
    fn poll_failure_reports_and_returns_false() {
        let stub = StubEndpoint::new(false);
        let (w, sink) = make_widget(&stub);
        stub.set_external_mute(true);
        stub.fail_queries(true);
        assert!(!w.requires_update());
        assert!(!w.is_muted());
        assert_eq!(sink.count(Stage::Poll), 1);
    }

    #[test]
    fn poll_failure_falls_through_to_base_signal() {
        let stub = StubEndpoint::new(false);
        let (mut w, sink) = make_widget(&stub);
        w.base_mut().set_label(Some("x".into()));
        stub.fail_queries(true);
        assert!(w.requires_update());
        assert_eq!(sink.count(Stage::Poll), 1);
    }

    // ── Reconcile ──

    #[test]
    fn update_converges_to_external_state() {
        let stub = StubEndpoint::new(false);
        let (mut w, _) = make_widget(&stub);
        stub.set_external_mute(true);
        assert!(w.requires_update());
        w.update().unwrap();
        assert!(w.is_muted());
        assert_eq!(shown(&w), w.icon_muted());
        assert!(!w.requires_update());

        stub.set_external_mute(false);
        w.update().unwrap();
        assert!(!w.is_muted());
        assert_eq!(shown(&w), w.icon_unmuted());
    }

    #[test]
    fn update_failure_changes_nothing() {
        let stub = StubEndpoint::new(false);
        let (mut w, _) = make_widget(&stub);
        let frames = w.base().frames_drawn();
        stub.set_external_mute(true);
        stub.fail_queries(true);

        let err = w.update().unwrap_err();
        assert!(matches!(err, DeckmuteError::Audio(AudioError::Disconnected)));
        assert!(!w.is_muted());
        assert_eq!(w.base().image(), Some(w.icon_unmuted()));
        assert_eq!(w.base().frames_drawn(), frames);
    }

    #[test]
    fn update_without_change_still_composites() {
        let stub = StubEndpoint::new(false);
        let (mut w, _) = make_widget(&stub);
        let frames = w.base().frames_drawn();
        w.update().unwrap();
        assert_eq!(w.base().frames_drawn(), frames + 1);
        assert!(!w.is_muted());
    }

    // ── Activation ──

    #[test]
    fn press_on_unmuted_sink_mutes_once() {
        let stub = StubEndpoint::new(false);
        let (w, sink) = make_widget(&stub);
        w.trigger_action(false);
        assert_eq!(stub.commands(), vec![true]);
        assert!(stub.muted());
        assert!(!w.is_muted(), "press does not touch the cached flag");
        assert!(sink.events().is_empty());
    }

    #[test]
    fn hold_behaves_like_press() {
        let stub = StubEndpoint::new(true);
        let (w, _) = make_widget(&stub);
        w.trigger_action(true);
        assert_eq!(stub.commands(), vec![false]);
    }

    #[test]
    fn press_command_failure_is_absorbed() {
        let stub = StubEndpoint::new(false);
        let (w, sink) = make_widget(&stub);
        stub.fail_commands(true);
        w.trigger_action(false);
        assert!(!stub.muted());
        assert!(!w.is_muted());
        assert_eq!(shown(&w), w.icon_unmuted());
        assert_eq!(sink.count(Stage::ActivationCommand), 1);
    }

    #[test]
    fn press_query_failure_sends_no_command() {
        let stub = StubEndpoint::new(false);
        let (w, sink) = make_widget(&stub);
        stub.fail_queries(true);
        w.trigger_action(false);
        assert!(stub.commands().is_empty());
        assert_eq!(sink.count(Stage::ActivationQuery), 1);
    }

    #[test]
    fn press_then_poll_picks_up_new_state() {
        let stub = StubEndpoint::new(false);
        let (mut w, _) = make_widget(&stub);
        w.trigger_action(false);
        assert!(w.requires_update());
        w.update().unwrap();
        assert!(w.is_muted());
        assert_eq!(shown(&w), w.icon_muted());
    }

    // ── Teardown ──

    #[test]
    fn close_releases_connection() {
        let stub = StubEndpoint::new(false);
        let (mut w, _) = make_widget(&stub);
        w.close().unwrap();
        assert!(stub.is_closed());
        assert!(w.is_closed());
    }

    #[test]
    fn close_twice_is_ok() {
        let stub = StubEndpoint::new(false);
        let (mut w, _) = make_widget(&stub);
        w.close().unwrap();
        w.close().unwrap();
    }

    #[test]
    fn close_error_is_surfaced_and_widget_is_closed() {
        let stub = StubEndpoint::new(false);
        let (mut w, _) = make_widget(&stub);
        stub.fail_close(true);
        assert!(w.close().is_err());
        assert!(w.is_closed());
        assert!(w.close().is_ok());
    }

    #[test]
    fn operations_after_close_fail_fast() {
        let stub = StubEndpoint::new(false);
        let (mut w, sink) = make_widget(&stub);
        w.close().unwrap();
        let queries = stub.query_count();

        assert!(matches!(w.update(), Err(DeckmuteError::Closed)));
        assert!(!w.requires_update());
        w.trigger_action(false);

        assert_eq!(stub.query_count(), queries, "no daemon traffic after close");
        assert!(stub.commands().is_empty());
        assert_eq!(sink.count(Stage::Poll), 1);
        assert_eq!(sink.count(Stage::ActivationQuery), 1);
        assert!(sink.events().iter().all(|d| d.message.contains("closed")));
    }

    #[test]
    fn closed_widget_ignores_dirty_base() {
        let stub = StubEndpoint::new(false);
        let (mut w, _) = make_widget(&stub);
        w.close().unwrap();
        w.base_mut().set_label(Some("Speakers".into()));
        assert!(w.base().requires_update());
        assert!(!w.requires_update());
    }

    #[test]
    fn usable_as_trait_object() {
        let stub = StubEndpoint::new(false);
        let (w, _) = make_widget(&stub);
        let mut boxed: Box<dyn Widget> = Box::new(w);
        stub.set_external_mute(true);
        assert!(boxed.requires_update());
        boxed.update().unwrap();
        assert!(!boxed.requires_update());
        boxed.close().unwrap();
    }
}
