//! Keyflow reconciliation core
//!
//! Provider-independent machinery for managing remote resources
//! declaratively: classifying remote results, waiting for eventually
//! consistent deletes, planning update-vs-replace, and driving each
//! instance through its lifecycle.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  keyflow CLI                     │
//! │        (plan / apply / import / destroy)         │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                keyflow-cloud                     │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │  Reconciler  │  │  State Mgmt  │             │
//! │  └──────┬───────┘  └──────────────┘             │
//! │  ┌──────▼───────────────────────────────────┐   │
//! │  │ ResourceManager: classify · poll · plan  │   │
//! │  └──────┬───────────────────────────────────┘   │
//! │  ┌──────▼───────────────────────────────────┐   │
//! │  │   trait ResourceClient { ... }           │   │
//! │  └──────────────────────────────────────────┘   │
//! └─────────┬───────────────────────────────────────┘
//!           │
//! ┌─────────▼───────┐
//! │ keyflow-        │
//! │ fusionauth      │
//! └─────────────────┘
//! ```

pub mod action;
pub mod classify;
pub mod client;
pub mod error;
pub mod lifecycle;
pub mod plan;
pub mod poller;
pub mod reconcile;
pub mod state;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports
pub use action::{Action, ActionResult, ActionType, ApplyResult, Plan, PlanSummary};
pub use classify::{ClassifyContext, Presence, RetryDecision, classify};
pub use client::{ApiError, Declared, OperationResult, RemoteResource, ResourceClient};
pub use error::{CloudError, Operation, Result};
pub use lifecycle::{DeleteOutcome, ReadOutcome, ResourceManager, UpdateOutcome};
pub use plan::{FieldChange, PlanDecision, PlanPolicy};
pub use poller::{Converged, Convergence, PollConfig, poll_until};
pub use reconcile::{DEFAULT_PARALLELISM, Reconciler, RefreshReport};
pub use state::{
    GlobalState, LifecycleStatus, ResourceState, StateLock, StateManager, TrackedResource,
};
