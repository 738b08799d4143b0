//! Error types for Conveyor.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid transition: cannot {event} a {state} record")]
    InvalidTransition {
        state: &'static str,
        event: &'static str,
    },

    #[error("missing required association: {0}")]
    MissingAssociation(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("dispatch to '{queue}' timed out")]
    DispatchTimeout { queue: String },

    #[error("dispatch to '{queue}' failed: {message}")]
    DispatchFailed { queue: String, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
