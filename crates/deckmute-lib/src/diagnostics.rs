//! Recoverable-failure reporting.
//!
//! Failures the widget absorbs (a poll that could not reach the daemon, an
//! abandoned button press) are handed to a [`DiagnosticSink`] instead of
//! being propagated. [`LogSink`] forwards them to the `log` facade;
//! [`RecordingSink`] keeps them for tests.

use std::fmt;
use std::sync::Mutex;

use crate::audio::AudioError;

/// Which call path absorbed the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// `requires_update` could not query the daemon.
    Poll,
    /// A button press could not read the current mute flag.
    ActivationQuery,
    /// A button press could not command the new mute flag.
    ActivationCommand,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Poll => write!(f, "poll"),
            Stage::ActivationQuery => write!(f, "activation query"),
            Stage::ActivationCommand => write!(f, "activation command"),
        }
    }
}

/// A failure that was recovered locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub stage: Stage,
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: Stage, err: &AudioError) -> Self {
        Self {
            stage,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Stage::Poll => write!(f, "can't read default sink mute: {}", self.message),
            Stage::ActivationQuery => write!(f, "can't get default sink: {}", self.message),
            Stage::ActivationCommand => {
                write!(f, "can't set default sink mute: {}", self.message)
            }
        }
    }
}

pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `log::warn!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&self, diagnostic: Diagnostic) {
        log::warn!("[sink-mute] {diagnostic}");
    }
}

/// Collects diagnostics in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything reported so far.
    pub fn events(&self) -> Vec<Diagnostic> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub fn count(&self, stage: Stage) -> usize {
        self.events().iter().filter(|d| d.stage == stage).count()
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, diagnostic: Diagnostic) {
        match self.events.lock() {
            Ok(mut events) => events.push(diagnostic),
            Err(e) => e.into_inner().push(diagnostic),
        }
    }
}
