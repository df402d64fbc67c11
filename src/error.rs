use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::engine::ExecutionTree;

/// Canonical failure attached to every FAIL result.
///
/// The original cause is kept behind an `Arc` so the same failure can be
/// stored in the execution tree and re-thrown to the enclosing composite.
#[derive(Debug, Error, Clone)]
#[error("Task '{path}' failed:\n{cause}")]
pub struct MigrationFailure {
    path: String,
    cause: Arc<anyhow::Error>,
}

impl MigrationFailure {
    pub fn new(path: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self {
            path: path.into(),
            cause: Arc::new(cause.into()),
        }
    }

    /// Execution path of the task that failed first.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The error that caused the failure.
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }
}

#[derive(Debug, Error, Clone)]
pub enum MigrationError {
    /// Programming error, such as running an execution twice.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Failure(#[from] MigrationFailure),
}

impl MigrationError {
    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        MigrationError::InvalidState(message.into())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManagementError {
    #[error("Resource '{address}' not found")]
    NotFound { address: String },

    #[error("Resource '{address}' already exists")]
    Duplicate { address: String },

    #[error("Malformed operation: {0}")]
    Malformed(String),

    #[error("Unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("Operation '{operation}' failed: {description}")]
    Failed {
        operation: String,
        description: String,
    },
}

#[derive(Debug, Error)]
pub enum FilesError {
    #[error("Target '{target}' was already copied from '{existing}', refusing '{requested}'")]
    Conflict {
        target: Utf8PathBuf,
        existing: Utf8PathBuf,
        requested: Utf8PathBuf,
    },

    #[error("Couldn't copy file.\n{0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Resource type '{0}' was never declared")]
    UnknownType(String),

    #[error("Resource type '{0}' declared twice")]
    DuplicateType(String),

    #[error("Schema has no root resource type")]
    MissingRoot,
}

/// Returned when a run throws. The partially built tree is kept so the caller
/// can report how far the migration got.
#[derive(Debug, Error)]
#[error("Migration aborted:\n{error}")]
pub struct Aborted {
    pub tree: ExecutionTree,
    #[source]
    pub error: MigrationError,
}
