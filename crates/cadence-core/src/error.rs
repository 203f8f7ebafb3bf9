//! Error types and result aliases for cadence.
//!
//! This module defines the shared error types used across all cadence components.
//! Errors are structured for programmatic handling and include context for debugging.

/// The result type used throughout cadence.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cadence core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// An interval whose upper bound precedes its lower bound.
    #[error("invalid interval: {message}")]
    InvalidInterval {
        /// Description of the offending bounds.
        message: String,
    },
}
