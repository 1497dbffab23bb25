//! Remote resource client seam
//!
//! Every resource type talks to its remote API through a [`ResourceClient`].
//! Calls never fail with a Rust error; they report an [`OperationResult`]
//! which the classifier turns into a decision.

use crate::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Error code that marks a "not found" API error
pub const NOT_FOUND_CODE: &str = "[NotFound]";

/// A single structured error returned by the remote API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Machine-readable code
    pub code: String,

    /// Human-readable message
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(NOT_FOUND_CODE, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.code == NOT_FOUND_CODE
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Outcome of one remote call. Exactly one channel is ever populated.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult<T> {
    /// The call completed; `payload` is `None` when the body was empty
    Success { status: u16, payload: Option<T> },

    /// The remote API rejected the call
    ApiError { status: u16, errors: Vec<ApiError> },

    /// The call never produced a response
    TransportError(String),
}

impl<T> OperationResult<T> {
    pub fn ok(payload: T) -> Self {
        OperationResult::Success {
            status: 200,
            payload: Some(payload),
        }
    }

    pub fn api_error(status: u16, errors: Vec<ApiError>) -> Self {
        OperationResult::ApiError { status, errors }
    }

    pub fn not_found() -> Self {
        OperationResult::ApiError {
            status: 404,
            errors: vec![ApiError::not_found("resource not found")],
        }
    }

    pub fn transport(cause: impl Into<String>) -> Self {
        OperationResult::TransportError(cause.into())
    }

    /// Whether this result reports that the target does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            OperationResult::ApiError { status, errors } => {
                *status == 404 || errors.iter().any(ApiError::is_not_found)
            }
            _ => false,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationResult<U> {
        match self {
            OperationResult::Success { status, payload } => OperationResult::Success {
                status,
                payload: payload.map(f),
            },
            OperationResult::ApiError { status, errors } => {
                OperationResult::ApiError { status, errors }
            }
            OperationResult::TransportError(cause) => OperationResult::TransportError(cause),
        }
    }
}

impl OperationResult<()> {
    /// A bodiless success, as returned by delete calls
    pub fn acknowledged(status: u16) -> Self {
        OperationResult::Success {
            status,
            payload: Some(()),
        }
    }
}

/// The remote view of a resource, materialised by a single call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteResource<A> {
    pub id: String,
    pub attributes: A,
}

impl<A> RemoteResource<A> {
    pub fn new(id: impl Into<String>, attributes: A) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }
}

/// Declared attribute set of a resource type
pub trait Declared:
    Clone + PartialEq + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Resource type name used in state keys and diagnostics (e.g. "fusionauth_key")
    const RESOURCE_TYPE: &'static str;

    /// Check attribute formats. Runs before any remote call.
    fn validate(&self) -> Result<()>;

    /// Identity supplied by the caller, if any
    fn requested_id(&self) -> Option<&str>;

    /// Record the identity the resource ended up with
    fn set_id(&mut self, id: &str);

    /// Fill attributes the caller left to the remote side from a prior state
    fn inherit_computed(&mut self, prior: &Self);
}

/// CRUD access to one remote resource type
///
/// Implementations hold no per-instance state and are shared across
/// concurrently reconciled instances.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    type Attributes: Declared;

    /// Create a resource, optionally under a caller-supplied identity
    async fn create(
        &self,
        id: Option<&str>,
        attributes: &Self::Attributes,
    ) -> OperationResult<RemoteResource<Self::Attributes>>;

    async fn retrieve(&self, id: &str) -> OperationResult<RemoteResource<Self::Attributes>>;

    /// Update in place; `changed` names the fields the plan selected
    async fn update(
        &self,
        id: &str,
        attributes: &Self::Attributes,
        changed: &[&'static str],
    ) -> OperationResult<RemoteResource<Self::Attributes>>;

    async fn delete(&self, id: &str) -> OperationResult<()>;
}
