use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("artifact reference is empty")]
    Empty,

    #[error("invalid artifact name '{0}': use ASCII letters, digits, '-', '_' or '.'")]
    InvalidName(String),

    #[error("invalid artifact version '{0}': expected 'latest' or 'v<N>'")]
    InvalidVersion(String),
}

/// Failures reading the registry's own bookkeeping (manifests, run records).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("document {path} is not valid JSON")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid artifact reference")]
    InvalidReference(#[from] ReferenceError),

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("artifact {reference} holds {count} files; expected exactly one")]
    AmbiguousFile { reference: String, count: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid artifact name")]
    InvalidName(#[from] ReferenceError),

    #[error("artifact '{0}' has no files")]
    Empty(String),

    #[error("artifact file does not exist: {0}")]
    MissingFile(PathBuf),

    #[error("artifact file name '{0}' appears more than once")]
    DuplicateFile(String),

    #[error(
        "artifact '{name}' already exists with type '{existing}'; refusing to log type '{requested}'"
    )]
    TypeMismatch {
        name: String,
        existing: String,
        requested: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
