//! Whole-configuration reconciliation
//!
//! [`Reconciler`] compares a set of named declared instances against the
//! state file, builds a [`Plan`], and applies it through a
//! [`ResourceManager`]. Independent instances are reconciled concurrently.

use crate::action::{Action, ActionType, ApplyResult, Plan};
use crate::client::{Declared, ResourceClient};
use crate::error::{CloudError, Result};
use crate::lifecycle::{ResourceManager, UpdateOutcome};
use crate::state::{GlobalState, LifecycleStatus, TrackedResource, state_key};
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::time::Instant;

/// Default number of instances reconciled at once
pub const DEFAULT_PARALLELISM: usize = 4;

/// What a refresh found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Instances still present remotely
    pub refreshed: Vec<String>,
    /// Instances whose remote attributes differed from state
    pub drifted: Vec<String>,
    /// Instances removed outside of keyflow and dropped from state
    pub removed: Vec<String>,
}

enum Change<A> {
    Track(TrackedResource<A>),
    Untrack,
    Keep,
    /// Keep the record but flag it with an in-flight status
    Mark(LifecycleStatus),
}

/// A failed action and what it leaves behind in state
struct Failure<A> {
    error: CloudError,
    change: Change<A>,
}

impl<A> From<CloudError> for Failure<A> {
    fn from(error: CloudError) -> Self {
        let change = if error.remote_deleted() {
            Change::Untrack
        } else {
            Change::Keep
        };
        Self { error, change }
    }
}

/// Classify a failure from an operation that may have issued a delete
///
/// Timeouts and cancellation only arise while waiting for absence, so the
/// delete was acknowledged but never confirmed.
fn after_delete<A>(error: CloudError) -> Failure<A> {
    match error {
        CloudError::ConvergenceTimeout { .. } | CloudError::Cancelled(_) => Failure {
            error,
            change: Change::Mark(LifecycleStatus::Deleting),
        },
        error => error.into(),
    }
}

/// Reconciles many named instances of one resource type
pub struct Reconciler<C: ResourceClient> {
    manager: ResourceManager<C>,
    parallelism: usize,
}

impl<C: ResourceClient> Reconciler<C> {
    pub fn new(manager: ResourceManager<C>) -> Self {
        Self {
            manager,
            parallelism: DEFAULT_PARALLELISM,
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn manager(&self) -> &ResourceManager<C> {
        &self.manager
    }

    fn resource_type(&self) -> &'static str {
        C::Attributes::RESOURCE_TYPE
    }

    fn tracked_all(&self, state: &GlobalState) -> Result<Vec<(String, TrackedResource<C::Attributes>)>> {
        let mut tracked = Vec::new();
        for name in state.names_of_type(self.resource_type()) {
            if let Some(resource) = state.tracked::<C::Attributes>(&name)? {
                tracked.push((name, resource));
            }
        }
        Ok(tracked)
    }

    /// Re-read every tracked instance and fold the results into `state`
    pub async fn refresh(&self, state: &mut GlobalState) -> Result<RefreshReport> {
        let tracked = self.tracked_all(state)?;

        let results: Vec<_> = stream::iter(tracked)
            .map(|(name, prior)| async move {
                let refreshed = self.manager.refresh(&prior).await;
                (name, prior, refreshed)
            })
            .buffer_unordered(self.parallelism)
            .collect()
            .await;

        let mut report = RefreshReport::default();
        for (name, prior, refreshed) in results {
            match refreshed? {
                Some(current) => {
                    if current.attributes != prior.attributes {
                        report.drifted.push(name.clone());
                    }
                    state.track(&name, &current)?;
                    report.refreshed.push(name);
                }
                None => {
                    state.remove_resource(&state_key(self.resource_type(), &name));
                    report.removed.push(name);
                }
            }
        }

        report.refreshed.sort();
        report.drifted.sort();
        report.removed.sort();
        Ok(report)
    }

    /// Plan how to move `state` to `declared`
    ///
    /// Tracked instances missing from `declared` are planned for deletion.
    pub fn plan(
        &self,
        declared: &BTreeMap<String, C::Attributes>,
        state: &GlobalState,
    ) -> Result<Plan> {
        let resource_type = self.resource_type();
        let mut actions = Vec::new();

        for (name, attributes) in declared {
            match state.tracked::<C::Attributes>(name)? {
                Some(prior) => {
                    let decision = self.manager.plan(&prior, attributes)?;
                    let action = Action::new(
                        decision.action_type(),
                        resource_type,
                        name.as_str(),
                        Some(prior.id.clone()),
                    );
                    actions.push(if decision.fields().is_empty() {
                        action
                    } else {
                        action.with_detail("fields", serde_json::json!(decision.fields()))
                    });
                }
                None => {
                    attributes.validate()?;
                    actions.push(Action::new(ActionType::Create, resource_type, name.as_str(), None));
                }
            }
        }

        for (name, tracked) in self.tracked_all(state)? {
            if !declared.contains_key(&name) {
                actions.push(Action::new(
                    ActionType::Delete,
                    resource_type,
                    name,
                    Some(tracked.id),
                ));
            }
        }

        Ok(Plan::new(actions))
    }

    /// Plan deletion of tracked instances; every tracked instance when `names` is empty
    pub fn plan_destroy(&self, names: &[String], state: &GlobalState) -> Result<Plan> {
        let resource_type = self.resource_type();
        let mut actions = Vec::new();

        if names.is_empty() {
            for (name, tracked) in self.tracked_all(state)? {
                actions.push(Action::new(ActionType::Delete, resource_type, name, Some(tracked.id)));
            }
        } else {
            for name in names {
                let tracked = state
                    .tracked::<C::Attributes>(name)?
                    .ok_or_else(|| CloudError::ResourceNotFound(state_key(resource_type, name)))?;
                actions.push(Action::new(
                    ActionType::Delete,
                    resource_type,
                    name.as_str(),
                    Some(tracked.id),
                ));
            }
        }

        Ok(Plan::new(actions))
    }

    /// Apply `plan`, recording every successful step in `state`
    ///
    /// A failing action does not stop the others; its instance keeps the
    /// last known good state.
    pub async fn apply(
        &self,
        plan: &Plan,
        declared: &BTreeMap<String, C::Attributes>,
        state: &mut GlobalState,
    ) -> Result<ApplyResult> {
        let start = Instant::now();

        let mut jobs = Vec::new();
        for action in &plan.actions {
            let prior = state.tracked::<C::Attributes>(&action.name)?;
            jobs.push((action, prior));
        }

        let outcomes: Vec<_> = stream::iter(jobs)
            .map(|(action, prior)| async move {
                let change = self.execute(action, prior, declared).await;
                (action, change)
            })
            .buffer_unordered(self.parallelism)
            .collect()
            .await;

        let mut result = ApplyResult::new();
        for (action, outcome) in outcomes {
            match outcome {
                Ok(change) => {
                    let message = match &change {
                        Change::Track(resource) => {
                            Some(format!("{} ({})", action.description, resource.id))
                        }
                        Change::Untrack => Some(action.description.clone()),
                        Change::Keep | Change::Mark(_) => None,
                    };
                    self.record(state, action, change)?;
                    if let Some(message) = message {
                        result.add_success(action.id.clone(), message);
                    }
                }
                Err(Failure { error, change }) => {
                    tracing::error!(action = %action.id, error = %error, "Action failed");
                    self.record(state, action, change)?;
                    result.add_failure(action.id.clone(), error.to_string());
                }
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    fn record(
        &self,
        state: &mut GlobalState,
        action: &Action,
        change: Change<C::Attributes>,
    ) -> Result<()> {
        match change {
            Change::Track(resource) => state.track(&action.name, &resource),
            Change::Untrack => {
                state.remove_resource(&action.state_key());
                Ok(())
            }
            Change::Mark(status) => {
                if let Some(tracked) = state.tracked::<C::Attributes>(&action.name)? {
                    tracing::warn!(instance = %action.state_key(), %status, "Left unsettled");
                    state.track(&action.name, &tracked.with_status(status))?;
                }
                Ok(())
            }
            Change::Keep => Ok(()),
        }
    }

    async fn execute(
        &self,
        action: &Action,
        prior: Option<TrackedResource<C::Attributes>>,
        declared: &BTreeMap<String, C::Attributes>,
    ) -> std::result::Result<Change<C::Attributes>, Failure<C::Attributes>> {
        if self.manager.cancellation().is_cancelled() {
            return Err(CloudError::Cancelled(action.description.clone()).into());
        }

        let declared_for = |name: &str| {
            declared
                .get(name)
                .ok_or_else(|| CloudError::InvalidConfig(format!("{} is not declared", name)))
        };

        match action.action_type {
            ActionType::NoOp => Ok(Change::Keep),
            ActionType::Create => {
                let resource = self.manager.create(declared_for(&action.name)?).await?;
                Ok(Change::Track(resource))
            }
            ActionType::Update | ActionType::Replace => {
                let prior = prior.ok_or_else(|| {
                    CloudError::StateError(format!("{} is not tracked", action.state_key()))
                })?;
                let replacing = action.action_type == ActionType::Replace;
                let outcome = self
                    .manager
                    .update(&prior, declared_for(&action.name)?)
                    .await
                    .map_err(|err| {
                        if replacing {
                            after_delete::<C::Attributes>(err)
                        } else {
                            err.into()
                        }
                    })?;
                match outcome {
                    UpdateOutcome::Unchanged(_) => Ok(Change::Keep),
                    outcome => Ok(Change::Track(outcome.into_resource())),
                }
            }
            ActionType::Delete => {
                let id = match (&action.remote_id, &prior) {
                    (Some(id), _) => id.clone(),
                    (None, Some(prior)) => prior.id.clone(),
                    (None, None) => return Ok(Change::Untrack),
                };
                self.manager.delete(&id).await.map_err(after_delete::<C::Attributes>)?;
                Ok(Change::Untrack)
            }
        }
    }

    /// Adopt an existing remote resource under `name`
    pub async fn import(
        &self,
        name: &str,
        id: &str,
        state: &mut GlobalState,
    ) -> Result<TrackedResource<C::Attributes>> {
        if let Some(existing) = state.tracked::<C::Attributes>(name)? {
            return Err(CloudError::StateError(format!(
                "{} is already tracked as {}",
                state_key(self.resource_type(), name),
                existing.id
            )));
        }

        let tracked = self.manager.import(id).await?;
        state.track(name, &tracked)?;
        Ok(tracked)
    }

    /// Delete tracked instances; every tracked instance when `names` is empty
    pub async fn destroy(&self, names: &[String], state: &mut GlobalState) -> Result<ApplyResult> {
        let plan = self.plan_destroy(names, state)?;
        self.apply(&plan, &BTreeMap::new(), state).await
    }
}
