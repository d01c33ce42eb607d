//! Error taxonomy for the alert core.

use thiserror::Error;

/// Errors surfaced by the alert store, lifecycle checks, and service.
///
/// The API layer maps each variant to its own status code; the distinction
/// is never collapsed into a generic failure.
#[derive(Debug, Clone, Error)]
pub enum AlertError {
    /// Malformed or missing input (400-class).
    #[error("{0}")]
    Validation(String),

    /// Unknown alert id (404-class).
    #[error("Alert not found")]
    NotFound,

    /// Requested status change is not a legal lifecycle transition (400-class).
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Operation not permitted in the alert's current state (400-class).
    #[error("{0}")]
    InvalidState(String),

    /// Persistence layer failure or timeout (500-class, retryable by caller).
    #[error("Alert store unavailable: {0}")]
    StoreUnavailable(String),
}
