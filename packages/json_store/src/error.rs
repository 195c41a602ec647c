//! Error types for the store layer.

use std::{io, path};

use crate::commit::FlushError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] jsontree_core::Error),

    #[error("Root path ({path:?}) is invalid: {error}")]
    RootPathInvalid {
        path: path::PathBuf,
        #[source]
        error: io::Error,
    },

    #[error("I/O error on {path:?}: {error}")]
    Io {
        path: path::PathBuf,
        #[source]
        error: io::Error,
    },

    #[error("Failed to scan {path:?}: {error}")]
    Scan {
        path: path::PathBuf,
        #[source]
        error: walkdir::Error,
    },

    #[error("Failed to parse {path:?}: {error}")]
    Parse {
        path: path::PathBuf,
        #[source]
        error: serde_json::Error,
    },

    #[error("Failed to encode {path:?}: {error}")]
    Encode {
        path: path::PathBuf,
        #[source]
        error: serde_json::Error,
    },

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error(transparent)]
    Flush(Box<FlushError>),
}

impl Error {
    pub(crate) fn io(path: impl Into<path::PathBuf>, error: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            error,
        }
    }
}

impl From<jsontree_core::PathError> for Error {
    fn from(e: jsontree_core::PathError) -> Self {
        Error::Core(e.into())
    }
}

impl From<FlushError> for Error {
    fn from(e: FlushError) -> Self {
        Error::Flush(Box::new(e))
    }
}
