//! Kernel error types
//!
//! Every monitor operation returns a [`KernelResult`]. Waits never time out,
//! so the only ways out of a blocked call besides the normal predicate are an
//! abort (another thread hit a fatal error) or a poisoned lock.

use thiserror::Error;

/// Result type alias for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

/// Errors that can occur inside the coordination kernel
#[derive(Error, Debug)]
pub enum KernelError {
    /// The match was aborted while the caller was blocked in a monitor
    #[error("Match aborted while waiting in {monitor}")]
    Aborted { monitor: &'static str },

    /// A monitor lock was poisoned by a panicking thread
    #[error("Lock poisoned in {monitor}")]
    Poisoned { monitor: &'static str },

    /// A structural invariant of a monitor was broken
    #[error("Invariant violated in {monitor}: {message}")]
    InvariantViolation {
        monitor: &'static str,
        message: String,
    },

    /// A role tried to move along an edge its state graph does not have
    #[error("Illegal {role} transition: {from} → {to}")]
    IllegalTransition {
        role: &'static str,
        from: String,
        to: String,
    },

    /// An entity thread could not be spawned or panicked
    #[error("Entity thread {name} failed: {message}")]
    Thread { name: String, message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Event history could not be read or exported
    #[error("Event history error: {0}")]
    History(#[from] crate::events::HistoryError),
}

impl KernelError {
    /// Create an aborted error
    pub fn aborted(monitor: &'static str) -> Self {
        Self::Aborted { monitor }
    }

    /// Create a poisoned-lock error
    pub fn poisoned(monitor: &'static str) -> Self {
        Self::Poisoned { monitor }
    }

    /// Create an invariant violation error
    pub fn invariant(monitor: &'static str, message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            monitor,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a thread failure error
    pub fn thread(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Thread {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether this error is the fallout of another thread's failure rather
    /// than a failure of its own.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}
