//! Core error types for focuskit-core.
//!
//! Nothing in the timer core is fatal: transition errors are rejected locally
//! and store errors degrade the timer to memory-only operation. These types
//! exist so callers can log or display the reason.

use std::path::PathBuf;
use thiserror::Error;

use crate::timer::TimerPhase;

/// Core error type for focuskit-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// State machine errors
    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    /// Durable store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by the focus timer state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// The requested action is not valid from the current phase.
    #[error("cannot {action} while {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: TimerPhase,
    },

    /// A paused session exists; the caller must pick how to resolve it.
    #[error("a paused session exists: resume it, or start fresh crediting or discarding it")]
    AmbiguousResume,

    /// Start options failed validation.
    #[error("invalid start options: {0}")]
    InvalidOptions(String),
}

/// Durable store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored value could not be decoded.
    #[error("corrupt value under '{key}': {message}")]
    Corrupt { key: String, message: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Key does not exist in the configuration tree
    #[error("unknown config key: {0}")]
    UnknownKey(String),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
