//! Utility functions for session display.

pub mod format;

pub use format::{format_countdown, format_expiry, welcome_line};
