//! Unified error types for the fleet layer.
//!
//! Every repository, coordinator and report function returns [`Result`]. The
//! variants map one-to-one onto the error classes presentation code needs to
//! tell apart: bad input, missing records, illegal trip transitions and a
//! failing document store.

use crate::entities::{Collection, TripStatus};
use sea_orm::DbErr;
use thiserror::Error;

/// Errors raised by the fleet data layer.
#[derive(Debug, Error)]
pub enum Error {
    /// A required field is missing or a supplied value is malformed.
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable description of what was rejected
        message: String,
    },

    /// The targeted record does not exist.
    #[error("{collection} record {id} not found")]
    NotFound {
        /// Collection that was searched
        collection: Collection,
        /// Id that could not be resolved
        id: i64,
    },

    /// A trip status change was requested from a state that does not allow it.
    #[error("Trip {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Trip id
        id: i64,
        /// Status the trip is currently in
        from: TripStatus,
        /// Status that was requested
        to: TripStatus,
    },

    /// The underlying document store failed; the store error is kept as the source.
    #[error("Document store unavailable: {0}")]
    StoreUnavailable(#[from] DbErr),

    /// Configuration could not be loaded or parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem
        message: String,
    },
}

/// Fieldless classification of an [`Error`], for callers that only need to
/// pick the right message to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`Error::Validation`]
    Validation,
    /// See [`Error::NotFound`]
    NotFound,
    /// See [`Error::InvalidTransition`]
    InvalidTransition,
    /// See [`Error::StoreUnavailable`]
    StoreUnavailable,
    /// See [`Error::Config`]
    Config,
}

impl Error {
    /// Builds a [`Error::Validation`] from anything printable.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Returns the class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::Config { .. } => ErrorKind::Config,
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
