//! Error classification
//!
//! Collapses an [`OperationResult`] into a single [`RetryDecision`]. The
//! calling context decides whether "not found" and transport failures are
//! benign.

use crate::client::OperationResult;
use crate::error::{CloudError, Operation};

/// Context a result is classified in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyContext {
    /// Create/update: every API error is fatal
    Default,
    /// Read/import: not-found means the resource was removed
    Read,
    /// Delete call: not-found means the resource is already gone
    Delete,
    /// Absence polling: not-found is success, transport errors are retried
    Convergence,
}

impl ClassifyContext {
    fn not_found_is_benign(self) -> bool {
        !matches!(self, ClassifyContext::Default)
    }

    fn retry_tolerant(self) -> bool {
        matches!(self, ClassifyContext::Convergence)
    }
}

/// Whether the remote resource exists after a classified call
#[derive(Debug, Clone, PartialEq)]
pub enum Presence<T> {
    Present(T),
    Absent,
}

/// Classified outcome of a remote call
#[derive(Debug)]
pub enum RetryDecision<T> {
    Proceed(Presence<T>),
    Retryable(CloudError),
    Fatal(CloudError),
}

impl<T> RetryDecision<T> {
    pub fn is_fatal(&self) -> bool {
        matches!(self, RetryDecision::Fatal(_))
    }

    /// Collapse into a `Result`, treating retryable failures as errors
    pub fn into_result(self) -> crate::Result<Presence<T>> {
        match self {
            RetryDecision::Proceed(presence) => Ok(presence),
            RetryDecision::Retryable(err) | RetryDecision::Fatal(err) => Err(err),
        }
    }
}

/// Classify one remote call for `resource` (e.g. "fusionauth_key 6f1c...")
pub fn classify<T>(
    result: OperationResult<T>,
    context: ClassifyContext,
    resource: &str,
    operation: Operation,
) -> RetryDecision<T> {
    let decision = match result {
        OperationResult::TransportError(cause) => {
            let message = format!("transport error: {}", cause);
            if context.retry_tolerant() {
                RetryDecision::Retryable(CloudError::RetryableRemote {
                    resource: resource.to_string(),
                    operation,
                    message,
                })
            } else {
                RetryDecision::Fatal(CloudError::fatal(resource, operation, message))
            }
        }
        OperationResult::ApiError { status, errors } => {
            let not_found = status == 404 || errors.iter().any(|e| e.is_not_found());
            if not_found && context.not_found_is_benign() {
                RetryDecision::Proceed(Presence::Absent)
            } else if errors.is_empty() {
                RetryDecision::Fatal(CloudError::fatal(
                    resource,
                    operation,
                    format!("unexpected status code {} with no error details", status),
                ))
            } else {
                let joined = errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                RetryDecision::Fatal(CloudError::fatal(
                    resource,
                    operation,
                    format!("status {}: {}", status, joined),
                ))
            }
        }
        OperationResult::Success { status, payload } => {
            if !(200..300).contains(&status) {
                RetryDecision::Fatal(CloudError::fatal(
                    resource,
                    operation,
                    format!("unexpected status code {}", status),
                ))
            } else {
                match payload {
                    Some(payload) => RetryDecision::Proceed(Presence::Present(payload)),
                    None => RetryDecision::Fatal(CloudError::fatal(
                        resource,
                        operation,
                        format!("empty response body (status {})", status),
                    )),
                }
            }
        }
    };

    match &decision {
        RetryDecision::Proceed(Presence::Absent) => {
            tracing::debug!(%resource, %operation, ?context, "classified as absent");
        }
        RetryDecision::Retryable(err) => {
            tracing::debug!(%resource, %operation, error = %err, "classified as retryable");
        }
        RetryDecision::Fatal(err) => {
            tracing::debug!(%resource, %operation, error = %err, "classified as fatal");
        }
        RetryDecision::Proceed(Presence::Present(_)) => {}
    }

    decision
}
