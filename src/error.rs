//! Error types for the distributed multiply.
//!
//! Every condition here is fatal for the run: the engine has no retry or
//! partial-result path, so callers either fix the precondition or abort.

use std::fmt;

/// Errors that can occur while setting up or running Cannon's algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CannonError {
    /// The process count cannot be arranged as a square grid.
    InvalidTopology {
        /// Number of processes that was requested.
        processes: usize,
    },
    /// A tile or matrix does not have the shape the grid expects.
    ShapeMismatch {
        /// Element count (or order) that was expected.
        expected: usize,
        /// Element count (or order) that was found.
        actual: usize,
        /// Human-readable error message.
        message: String,
    },
    /// A transfer between two processes failed.
    Communication {
        /// Rank that observed the failure.
        rank: usize,
        /// Human-readable error message.
        message: String,
    },
}

impl fmt::Display for CannonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CannonError::InvalidTopology { processes } => write!(
                f,
                "Invalid topology: {} processes do not form a square grid",
                processes
            ),
            CannonError::ShapeMismatch {
                expected,
                actual,
                message,
            } => write!(
                f,
                "Shape mismatch: {} (expected {}, found {})",
                message, expected, actual
            ),
            CannonError::Communication { rank, message } => {
                write!(f, "Communication failure on rank {}: {}", rank, message)
            }
        }
    }
}

impl std::error::Error for CannonError {}

/// Result type alias for cannon operations.
pub type Result<T> = std::result::Result<T, CannonError>;

/// Creates an invalid topology error.
pub fn invalid_topology(processes: usize) -> CannonError {
    CannonError::InvalidTopology { processes }
}

/// Creates a shape mismatch error.
pub fn shape_mismatch(expected: usize, actual: usize, message: impl Into<String>) -> CannonError {
    CannonError::ShapeMismatch {
        expected,
        actual,
        message: message.into(),
    }
}

/// Creates a communication error.
pub fn communication_error(rank: usize, message: impl Into<String>) -> CannonError {
    CannonError::Communication {
        rank,
        message: message.into(),
    }
}
