//! Reconciliation error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle operation an error was raised from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Import,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Read => write!(f, "read"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
            Operation::Import => write!(f, "import"),
        }
    }
}

/// Reconciliation errors
#[derive(Error, Debug)]
pub enum CloudError {
    /// Declared attributes are malformed; raised before any remote call
    #[error("Invalid {resource}: {message}")]
    Validation { resource: String, message: String },

    /// Structured API error or malformed response; never retried
    #[error("Failed to {operation} {resource}: {message}")]
    FatalRemote {
        resource: String,
        operation: Operation,
        message: String,
    },

    /// Transport failure inside a retry-tolerant context
    #[error("Retryable failure during {operation} of {resource}: {message}")]
    RetryableRemote {
        resource: String,
        operation: Operation,
        message: String,
    },

    /// A replacement deleted the old resource but could not create the new one
    #[error("Failed to replace {resource}: deleted {previous_id} but could not create its successor: {source}")]
    ReplaceIncomplete {
        resource: String,
        previous_id: String,
        #[source]
        source: Box<CloudError>,
    },

    #[error("Timed out waiting for {subject}: {last_condition}")]
    ConvergenceTimeout {
        subject: String,
        last_condition: String,
    },

    #[error("Cancelled while waiting for {0}")]
    Cancelled(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn validation(resource: impl Into<String>, message: impl Into<String>) -> Self {
        CloudError::Validation {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn fatal(
        resource: impl Into<String>,
        operation: Operation,
        message: impl Into<String>,
    ) -> Self {
        CloudError::FatalRemote {
            resource: resource.into(),
            operation,
            message: message.into(),
        }
    }

    /// Whether the remote resource the failed operation targeted is known to be gone
    pub fn remote_deleted(&self) -> bool {
        matches!(self, CloudError::ReplaceIncomplete { .. })
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
