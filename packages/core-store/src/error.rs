//! Error types for the core layer.

use crate::path::PathError;

/// Errors raised by tree and key-expression operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("path error: {0}")]
    Path(#[from] PathError),

    /// A key expression could not be parsed.
    #[error("invalid key expression '{expression}': {message}")]
    InvalidKey { expression: String, message: String },

    /// A mutation targeted a missing node, or a node that can't hold the
    /// addressed child.
    #[error("mutation failed at '{path}': {message}")]
    Mutation { path: String, message: String },
}
