//! Error types for the simulated backend

use thiserror::Error;

/// Errors raised while configuring or driving the simulation
#[derive(Debug, Error)]
pub enum SimError {
    /// I/O error reading a configuration file
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration is not valid JSON for the expected schema
    #[error("config error: {0}")]
    ConfigError(#[from] serde_json::Error),

    /// Injected event names no known event
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// Injected event has malformed or missing arguments
    #[error("malformed {event} event: {reason}")]
    MalformedEvent {
        /// Event keyword
        event: &'static str,
        /// What was wrong with the arguments
        reason: String,
    },

    /// The event task is no longer running
    #[error("simulation event task stopped")]
    TaskStopped,
}

impl SimError {
    pub(crate) fn malformed(event: &'static str, reason: impl Into<String>) -> Self {
        SimError::MalformedEvent {
            event,
            reason: reason.into(),
        }
    }
}
