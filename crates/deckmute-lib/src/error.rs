//! Unified error type for the deckmute-lib crate.
//!
//! [`DeckmuteError`] wraps module-specific errors (`AudioError`, `IconError`)
//! and domain-specific error kinds (`Config`, `Closed`).
//! `From` impls allow `?` to propagate across module boundaries seamlessly.

use std::fmt;

use crate::audio::AudioError;
use crate::icon::IconError;

/// Unified error type for deckmute-lib operations.
#[derive(Debug)]
pub enum DeckmuteError {
    /// Audio daemon error (connect, query, command, close).
    Audio(AudioError),
    /// Icon resolution or decode error.
    Icon(IconError),
    /// Standard I/O error (config persistence).
    Io(std::io::Error),
    /// Configuration error (missing or malformed widget keys).
    Config(String),
    /// Operation on a widget that has been closed.
    Closed,
}

impl fmt::Display for DeckmuteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeckmuteError::Audio(e) => write!(f, "{e}"),
            DeckmuteError::Icon(e) => write!(f, "{e}"),
            DeckmuteError::Io(e) => write!(f, "I/O error: {e}"),
            DeckmuteError::Config(e) => write!(f, "Config error: {e}"),
            DeckmuteError::Closed => write!(f, "Widget is closed"),
        }
    }
}

impl std::error::Error for DeckmuteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeckmuteError::Audio(e) => Some(e),
            DeckmuteError::Icon(e) => Some(e),
            DeckmuteError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AudioError> for DeckmuteError {
    fn from(e: AudioError) -> Self {
        DeckmuteError::Audio(e)
    }
}

impl From<IconError> for DeckmuteError {
    fn from(e: IconError) -> Self {
        DeckmuteError::Icon(e)
    }
}

impl From<std::io::Error> for DeckmuteError {
    fn from(e: std::io::Error) -> Self {
        DeckmuteError::Io(e)
    }
}

/// Crate-level Result alias using [`DeckmuteError`].
pub type Result<T> = std::result::Result<T, DeckmuteError>;
