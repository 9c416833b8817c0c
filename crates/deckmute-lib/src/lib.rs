//! deckmute — button-deck widget mirroring the default audio output's mute state.

pub mod audio;
pub mod button;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod icon;
pub mod widget;

pub use error::DeckmuteError;
