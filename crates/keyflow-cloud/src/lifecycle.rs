//! Resource lifecycle management
//!
//! [`ResourceManager`] drives a single declared instance through
//! `Planned → Creating → Created (↔ Reading/Updating) → Deleting → Deleted`.
//! Each entry point calls the remote client, classifies the result, and for
//! deletes waits for the remote side to confirm absence.

use crate::classify::{ClassifyContext, Presence, RetryDecision, classify};
use crate::client::{Declared, RemoteResource, ResourceClient};
use crate::error::{CloudError, Operation, Result};
use crate::plan::{PlanDecision, PlanPolicy};
use crate::poller::{Convergence, PollConfig, poll_until};
use crate::state::{LifecycleStatus, TrackedResource};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result of reading a tracked instance back from the remote
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome<A> {
    /// The remote resource exists; attributes are as observed
    Present(RemoteResource<A>),
    /// The resource was removed outside of keyflow
    Removed,
}

/// Result of reconciling an instance towards new declared attributes
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome<A> {
    Unchanged(TrackedResource<A>),
    Updated {
        resource: TrackedResource<A>,
        fields: Vec<&'static str>,
    },
    Replaced {
        resource: TrackedResource<A>,
        previous_id: String,
        fields: Vec<&'static str>,
    },
}

impl<A> UpdateOutcome<A> {
    pub fn resource(&self) -> &TrackedResource<A> {
        match self {
            UpdateOutcome::Unchanged(resource)
            | UpdateOutcome::Updated { resource, .. }
            | UpdateOutcome::Replaced { resource, .. } => resource,
        }
    }

    pub fn into_resource(self) -> TrackedResource<A> {
        match self {
            UpdateOutcome::Unchanged(resource)
            | UpdateOutcome::Updated { resource, .. }
            | UpdateOutcome::Replaced { resource, .. } => resource,
        }
    }
}

/// Result of a confirmed delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// The delete call itself reported the resource missing
    pub already_absent: bool,

    /// Absence checks made after the first one
    pub retries: u32,
}

/// Lifecycle manager for one resource type
pub struct ResourceManager<C: ResourceClient> {
    client: Arc<C>,
    policy: PlanPolicy<C::Attributes>,
    poll: PollConfig,
    cancel: CancellationToken,
}

impl<C: ResourceClient> ResourceManager<C> {
    pub fn new(client: Arc<C>, policy: PlanPolicy<C::Attributes>) -> Self {
        Self {
            client,
            policy,
            poll: PollConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Share a token so a host-level shutdown aborts in-flight polls
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn poll_config(&self) -> &PollConfig {
        &self.poll
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn resource_type(&self) -> &'static str {
        C::Attributes::RESOURCE_TYPE
    }

    fn subject(&self, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{} {}", self.resource_type(), id),
            None => self.resource_type().to_string(),
        }
    }

    /// Decide how `prior` reaches `declared` without touching the remote
    pub fn plan(
        &self,
        prior: &TrackedResource<C::Attributes>,
        declared: &C::Attributes,
    ) -> Result<PlanDecision> {
        declared.validate()?;
        let mut normalized = declared.clone();
        normalized.inherit_computed(&prior.attributes);
        Ok(self.policy.plan(&prior.attributes, &normalized))
    }

    /// Create the remote resource and adopt its identity
    ///
    /// On failure nothing is returned for the caller to track.
    pub async fn create(
        &self,
        declared: &C::Attributes,
    ) -> Result<TrackedResource<C::Attributes>> {
        declared.validate()?;
        let requested = declared.requested_id();
        let subject = self.subject(requested);

        tracing::info!(resource = %subject, status = %LifecycleStatus::Creating, "Creating");
        let result = self.client.create(requested, declared).await;

        let remote = match classify(result, ClassifyContext::Default, &subject, Operation::Create) {
            RetryDecision::Proceed(Presence::Present(remote)) => remote,
            RetryDecision::Proceed(Presence::Absent) => {
                return Err(CloudError::fatal(
                    subject,
                    Operation::Create,
                    "remote reported no resource after create",
                ));
            }
            RetryDecision::Retryable(err) | RetryDecision::Fatal(err) => return Err(err),
        };

        if let Some(requested) = requested {
            if remote.id != requested {
                return Err(CloudError::fatal(
                    subject,
                    Operation::Create,
                    format!(
                        "remote assigned id {} instead of requested {}",
                        remote.id, requested
                    ),
                ));
            }
        }

        let mut attributes = remote.attributes;
        attributes.set_id(&remote.id);
        tracing::info!(
            resource_type = self.resource_type(),
            id = %remote.id,
            status = %LifecycleStatus::Created,
            "Created"
        );
        Ok(TrackedResource::adopt(remote.id, attributes))
    }

    /// Read the remote resource back
    ///
    /// A missing resource is reported as [`ReadOutcome::Removed`], not as an
    /// error, so the caller can drop it from tracked state.
    pub async fn read(&self, id: &str) -> Result<ReadOutcome<C::Attributes>> {
        let subject = self.subject(Some(id));
        tracing::debug!(resource = %subject, status = %LifecycleStatus::Reading, "Reading");
        let result = self.client.retrieve(id).await;

        match classify(result, ClassifyContext::Read, &subject, Operation::Read).into_result()? {
            Presence::Present(mut remote) => {
                remote.attributes.set_id(&remote.id);
                Ok(ReadOutcome::Present(remote))
            }
            Presence::Absent => {
                tracing::warn!(resource = %subject, "Resource was removed outside of keyflow");
                Ok(ReadOutcome::Removed)
            }
        }
    }

    /// Refresh a tracked instance from the remote
    ///
    /// Returns `None` when the resource no longer exists.
    pub async fn refresh(
        &self,
        tracked: &TrackedResource<C::Attributes>,
    ) -> Result<Option<TrackedResource<C::Attributes>>> {
        match self.read(&tracked.id).await? {
            ReadOutcome::Present(remote) => {
                let mut refreshed = tracked.clone();
                if refreshed.refresh(remote.attributes) {
                    tracing::warn!(
                        resource_type = self.resource_type(),
                        id = %tracked.id,
                        "Drift detected, remote values become the new baseline"
                    );
                }
                Ok(Some(refreshed))
            }
            ReadOutcome::Removed => Ok(None),
        }
    }

    /// Move `prior` towards `declared`, in place or by replacement
    ///
    /// On failure `prior` remains the last known good state.
    pub async fn update(
        &self,
        prior: &TrackedResource<C::Attributes>,
        declared: &C::Attributes,
    ) -> Result<UpdateOutcome<C::Attributes>> {
        declared.validate()?;
        let mut normalized = declared.clone();
        normalized.inherit_computed(&prior.attributes);

        match self.policy.plan(&prior.attributes, &normalized) {
            PlanDecision::NoOp => {
                tracing::debug!(resource_type = self.resource_type(), id = %prior.id, "No changes");
                Ok(UpdateOutcome::Unchanged(prior.clone()))
            }
            PlanDecision::Update(fields) => {
                let subject = self.subject(Some(&prior.id));
                tracing::info!(
                    resource = %subject,
                    status = %LifecycleStatus::Updating,
                    ?fields,
                    "Updating in place"
                );
                let result = self.client.update(&prior.id, &normalized, &fields).await;

                match classify(result, ClassifyContext::Default, &subject, Operation::Update) {
                    RetryDecision::Proceed(Presence::Present(remote)) => {
                        let mut resource = prior.clone();
                        let mut attributes = remote.attributes;
                        attributes.set_id(&prior.id);
                        resource.refresh(attributes);
                        Ok(UpdateOutcome::Updated { resource, fields })
                    }
                    RetryDecision::Proceed(Presence::Absent) => Err(CloudError::fatal(
                        subject,
                        Operation::Update,
                        "remote reported no resource after update",
                    )),
                    RetryDecision::Retryable(err) | RetryDecision::Fatal(err) => Err(err),
                }
            }
            PlanDecision::Replace(fields) => {
                tracing::info!(
                    resource_type = self.resource_type(),
                    id = %prior.id,
                    ?fields,
                    "Replacing"
                );
                self.delete(&prior.id).await?;
                // Computed identity is not carried over: the new resource gets
                // whatever the caller declared, or a fresh remote-assigned id.
                let resource = self.create(declared).await.map_err(|err| {
                    tracing::error!(
                        resource_type = self.resource_type(),
                        previous_id = %prior.id,
                        error = %err,
                        "Old resource deleted but its replacement was not created"
                    );
                    CloudError::ReplaceIncomplete {
                        resource: self.subject(Some(&prior.id)),
                        previous_id: prior.id.clone(),
                        source: Box::new(err),
                    }
                })?;
                Ok(UpdateOutcome::Replaced {
                    resource,
                    previous_id: prior.id.clone(),
                    fields,
                })
            }
        }
    }

    /// Delete and wait until the remote confirms absence
    pub async fn delete(&self, id: &str) -> Result<DeleteOutcome> {
        let poll = self.poll;
        self.delete_with(id, &poll).await
    }

    /// Delete with a per-call convergence budget
    pub async fn delete_with(&self, id: &str, poll: &PollConfig) -> Result<DeleteOutcome> {
        let subject = self.subject(Some(id));
        tracing::info!(resource = %subject, status = %LifecycleStatus::Deleting, "Deleting");
        let result = self.client.delete(id).await;

        match classify(result, ClassifyContext::Delete, &subject, Operation::Delete).into_result()? {
            Presence::Absent => {
                tracing::debug!(resource = %subject, "Already absent");
                return Ok(DeleteOutcome {
                    already_absent: true,
                    retries: 0,
                });
            }
            Presence::Present(()) => {}
        }

        let converged = poll_until(
            &subject,
            poll,
            &self.cancel,
            || self.client.retrieve(id),
            |result| match classify(result, ClassifyContext::Convergence, &subject, Operation::Delete) {
                RetryDecision::Proceed(Presence::Absent) => Convergence::Done(()),
                RetryDecision::Proceed(Presence::Present(_)) => {
                    Convergence::Pending(format!("{} still exists", subject))
                }
                RetryDecision::Retryable(err) => Convergence::Pending(err.to_string()),
                RetryDecision::Fatal(err) => Convergence::Fatal(err),
            },
        )
        .await?;

        tracing::info!(
            resource = %subject,
            status = %LifecycleStatus::Deleted,
            retries = converged.retries,
            "Deleted"
        );
        Ok(DeleteOutcome {
            already_absent: false,
            retries: converged.retries,
        })
    }

    /// Bring an existing remote resource under management
    pub async fn import(&self, id: &str) -> Result<TrackedResource<C::Attributes>> {
        let subject = self.subject(Some(id));
        tracing::info!(resource = %subject, "Importing");
        match self.read(id).await? {
            ReadOutcome::Present(remote) => {
                let tracked = TrackedResource::adopt(remote.id, remote.attributes);
                tracked.attributes.validate()?;
                Ok(tracked)
            }
            ReadOutcome::Removed => Err(CloudError::ResourceNotFound(subject)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiError;
    use crate::testing::{Injected, MemoryClient, Widget};
    use std::time::Duration;

    fn manager(client: &Arc<MemoryClient<Widget>>) -> ResourceManager<MemoryClient<Widget>> {
        ResourceManager::new(Arc::clone(client), Widget::policy()).with_poll_config(
            PollConfig::new(Duration::from_secs(30), Duration::from_secs(2)),
        )
    }

    #[tokio::test]
    async fn test_create_with_server_generated_id() {
        let client = Arc::new(MemoryClient::new());
        let manager = manager(&client);

        let tracked = manager.create(&Widget::new("spinner", "red")).await.unwrap();
        assert!(!tracked.id.is_empty());
        assert_eq!(tracked.status, LifecycleStatus::Created);
        assert_eq!(tracked.attributes.id.as_deref(), Some(tracked.id.as_str()));

        match manager.read(&tracked.id).await.unwrap() {
            ReadOutcome::Present(remote) => {
                assert_eq!(remote.attributes.name, "spinner");
                assert_eq!(remote.attributes.color, "red");
            }
            ReadOutcome::Removed => panic!("expected resource to exist"),
        }
    }

    #[tokio::test]
    async fn test_create_with_requested_id() {
        let client = Arc::new(MemoryClient::new());
        let manager = manager(&client);

        let declared = Widget::new("spinner", "red").with_id("w-fixed");
        let tracked = manager.create(&declared).await.unwrap();
        assert_eq!(tracked.id, "w-fixed");

        let ReadOutcome::Present(remote) = manager.read("w-fixed").await.unwrap() else {
            panic!("expected resource to exist");
        };
        assert_eq!(remote.attributes.id.as_deref(), Some("w-fixed"));
    }

    #[tokio::test]
    async fn test_create_validation_happens_before_remote_call() {
        let client = Arc::new(MemoryClient::new());
        let manager = manager(&client);

        let err = manager
            .create(&Widget::new("spinner", "red").with_id("bad id"))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::Validation { .. }));
        assert_eq!(client.calls(Operation::Create), 0);
    }

    #[tokio::test]
    async fn test_failed_create_leaves_nothing_tracked() {
        let client = Arc::new(MemoryClient::new());
        client.inject(
            Operation::Create,
            Injected::Api {
                status: 400,
                errors: vec![ApiError::new("[invalid]name", "name rejected")],
            },
        );
        let manager = manager(&client);

        let err = manager.create(&Widget::new("spinner", "red")).await.unwrap_err();
        assert!(matches!(
            err,
            CloudError::FatalRemote {
                operation: Operation::Create,
                ..
            }
        ));
        assert!(client.is_empty());
    }

    #[tokio::test]
    async fn test_read_reports_external_removal() {
        let client = Arc::new(MemoryClient::new());
        let manager = manager(&client);

        let tracked = manager.create(&Widget::new("spinner", "red")).await.unwrap();
        client.remove(&tracked.id);

        assert_eq!(manager.read(&tracked.id).await.unwrap(), ReadOutcome::Removed);
        assert!(manager.refresh(&tracked).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_surfaces_transport_failure() {
        let client = Arc::new(MemoryClient::<Widget>::new());
        client.inject(Operation::Read, Injected::Transport("connection refused".into()));
        let manager = manager(&client);

        let err = manager.read("w-1").await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_refresh_adopts_remote_drift() {
        let client = Arc::new(MemoryClient::new());
        let manager = manager(&client);

        let tracked = manager.create(&Widget::new("spinner", "red")).await.unwrap();
        client.modify(&tracked.id, |w| w.name = "renamed".to_string());

        let refreshed = manager.refresh(&tracked).await.unwrap().unwrap();
        assert_eq!(refreshed.attributes.name, "renamed");
        assert_eq!(refreshed.id, tracked.id);
    }

    #[tokio::test]
    async fn test_update_in_place() {
        let client = Arc::new(MemoryClient::new());
        let manager = manager(&client);

        let tracked = manager.create(&Widget::new("spinner", "red")).await.unwrap();
        let outcome = manager
            .update(&tracked, &Widget::new("whirler", "red"))
            .await
            .unwrap();

        match outcome {
            UpdateOutcome::Updated { resource, fields } => {
                assert_eq!(fields, vec!["name"]);
                assert_eq!(resource.id, tracked.id);
                assert_eq!(resource.attributes.name, "whirler");
            }
            other => panic!("expected in-place update, got {:?}", other),
        }
        assert_eq!(client.calls(Operation::Delete), 0);
    }

    #[tokio::test]
    async fn test_update_without_changes_is_noop() {
        let client = Arc::new(MemoryClient::new());
        let manager = manager(&client);

        let tracked = manager.create(&Widget::new("spinner", "red")).await.unwrap();
        let outcome = manager
            .update(&tracked, &Widget::new("spinner", "red"))
            .await
            .unwrap();

        assert!(matches!(outcome, UpdateOutcome::Unchanged(_)));
        assert_eq!(client.calls(Operation::Update), 0);
    }

    #[tokio::test]
    async fn test_failed_update_surfaces_error() {
        let client = Arc::new(MemoryClient::new());
        let manager = manager(&client);

        let tracked = manager.create(&Widget::new("spinner", "red")).await.unwrap();
        client.inject(
            Operation::Update,
            Injected::Api {
                status: 400,
                errors: vec![ApiError::new("[invalid]name", "too long")],
            },
        );

        let err = manager
            .update(&tracked, &Widget::new("whirler", "red"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("too long"));
        assert_eq!(client.get(&tracked.id).unwrap().name, "spinner");
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_assigns_new_server_id() {
        let client = Arc::new(MemoryClient::new());
        let manager = manager(&client);

        let tracked = manager.create(&Widget::new("spinner", "red")).await.unwrap();
        let outcome = manager
            .update(&tracked, &Widget::new("spinner", "blue"))
            .await
            .unwrap();

        let UpdateOutcome::Replaced {
            resource,
            previous_id,
            fields,
        } = outcome
        else {
            panic!("expected replacement");
        };
        assert_eq!(previous_id, tracked.id);
        assert_ne!(resource.id, tracked.id);
        assert_eq!(fields, vec!["color"]);
        assert!(client.get(&tracked.id).is_none());
        assert_eq!(client.get(&resource.id).unwrap().color, "blue");
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_reports_deleted_predecessor_when_create_fails() {
        let client = Arc::new(MemoryClient::new());
        let manager = manager(&client);

        let tracked = manager.create(&Widget::new("spinner", "red")).await.unwrap();
        client.inject(
            Operation::Create,
            Injected::Api {
                status: 400,
                errors: vec![ApiError::new("[invalid]color", "blue is sold out")],
            },
        );

        let err = manager
            .update(&tracked, &Widget::new("spinner", "blue"))
            .await
            .unwrap_err();

        assert!(err.remote_deleted());
        match &err {
            CloudError::ReplaceIncomplete {
                previous_id,
                source,
                ..
            } => {
                assert_eq!(previous_id, &tracked.id);
                assert!(matches!(**source, CloudError::FatalRemote { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("blue is sold out"));
        assert!(client.get(&tracked.id).is_none());
        assert!(client.is_empty());
    }

    #[tokio::test]
    async fn test_update_sends_only_changed_fields() {
        let client = Arc::new(MemoryClient::new());
        let manager = manager(&client);

        let tracked = manager.create(&Widget::new("spinner", "red")).await.unwrap();
        // Drift on a field the update does not touch must survive it
        client.modify(&tracked.id, |w| w.color = "green".to_string());

        let outcome = manager
            .update(&tracked, &Widget::new("whirler", "red"))
            .await
            .unwrap();

        assert_eq!(client.last_update_fields(), vec!["name"]);
        let stored = client.get(&tracked.id).unwrap();
        assert_eq!(stored.name, "whirler");
        assert_eq!(stored.color, "green");
        assert_eq!(outcome.resource().attributes.color, "green");
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_reuses_requested_id_after_convergence() {
        let client = Arc::new(MemoryClient::new().with_linger(2));
        let manager = manager(&client);

        let declared = Widget::new("spinner", "red").with_id("w-fixed");
        let tracked = manager.create(&declared).await.unwrap();

        let outcome = manager
            .update(&tracked, &Widget::new("spinner", "blue").with_id("w-fixed"))
            .await
            .unwrap();

        let resource = outcome.into_resource();
        assert_eq!(resource.id, "w-fixed");
        assert_eq!(resource.attributes.color, "blue");
    }

    #[tokio::test]
    async fn test_changing_id_plans_replace() {
        let client = Arc::new(MemoryClient::new());
        let manager = manager(&client);

        let tracked = manager
            .create(&Widget::new("spinner", "red").with_id("w-1"))
            .await
            .unwrap();

        let decision = manager
            .plan(&tracked, &Widget::new("spinner", "red").with_id("w-2"))
            .unwrap();
        assert_eq!(decision, PlanDecision::Replace(vec!["id"]));

        // An omitted id inherits the established one
        let decision = manager.plan(&tracked, &Widget::new("spinner", "red")).unwrap();
        assert_eq!(decision, PlanDecision::NoOp);
    }

    #[tokio::test]
    async fn test_delete_already_absent_is_success() {
        let client = Arc::new(MemoryClient::<Widget>::new());
        let manager = manager(&client);

        let outcome = manager.delete("w-missing").await.unwrap();
        assert!(outcome.already_absent);
        assert_eq!(outcome.retries, 0);
        assert_eq!(client.calls(Operation::Read), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_confirmed_on_first_check() {
        let client = Arc::new(MemoryClient::new());
        let manager = manager(&client);

        let tracked = manager.create(&Widget::new("spinner", "red")).await.unwrap();
        let outcome = manager.delete(&tracked.id).await.unwrap();

        assert!(!outcome.already_absent);
        assert_eq!(outcome.retries, 0);
        assert_eq!(client.calls(Operation::Read), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_waits_for_eventual_consistency() {
        let client = Arc::new(MemoryClient::new().with_linger(3));
        let manager = manager(&client);

        let tracked = manager.create(&Widget::new("spinner", "red")).await.unwrap();
        let outcome = manager.delete(&tracked.id).await.unwrap();

        assert_eq!(outcome.retries, 3);
        assert_eq!(client.calls(Operation::Read), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_retries_transport_errors_while_polling() {
        let client = Arc::new(MemoryClient::new());
        let manager = manager(&client);

        let tracked = manager.create(&Widget::new("spinner", "red")).await.unwrap();
        client.inject(Operation::Read, Injected::Transport("timeout".into()));

        let outcome = manager.delete(&tracked.id).await.unwrap();
        assert_eq!(outcome.retries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_times_out_when_never_absent() {
        let client = Arc::new(MemoryClient::new().with_linger(u32::MAX));
        let manager = manager(&client);

        let tracked = manager.create(&Widget::new("spinner", "red")).await.unwrap();
        let poll = PollConfig::new(Duration::from_secs(10), Duration::from_secs(3));
        let err = manager.delete_with(&tracked.id, &poll).await.unwrap_err();

        match err {
            CloudError::ConvergenceTimeout {
                subject,
                last_condition,
            } => {
                assert!(subject.contains(&tracked.id));
                assert!(last_condition.contains("still exists"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fatal_delete_skips_polling() {
        let client = Arc::new(MemoryClient::new());
        let manager = manager(&client);

        let tracked = manager.create(&Widget::new("spinner", "red")).await.unwrap();
        client.inject(
            Operation::Delete,
            Injected::Api {
                status: 401,
                errors: vec![ApiError::new("[Unauthorized]", "bad api key")],
            },
        );

        let err = manager.delete(&tracked.id).await.unwrap_err();
        assert!(matches!(err, CloudError::FatalRemote { .. }));
        assert_eq!(client.calls(Operation::Read), 0);
        assert!(client.get(&tracked.id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_delete_stops_polling() {
        let client = Arc::new(MemoryClient::new().with_linger(u32::MAX));
        let cancel = CancellationToken::new();
        let manager = manager(&client).with_cancellation(cancel.clone());

        let tracked = manager.create(&Widget::new("spinner", "red")).await.unwrap();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(4)).await;
            trigger.cancel();
        });

        let err = manager.delete(&tracked.id).await.unwrap_err();
        assert!(matches!(err, CloudError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_import_round_trips_with_read() {
        let client = Arc::new(MemoryClient::new());
        client.insert("w-outside", Widget::new("made elsewhere", "green"));
        let manager = manager(&client);

        let imported = manager.import("w-outside").await.unwrap();
        assert_eq!(imported.id, "w-outside");
        assert_eq!(imported.attributes.id.as_deref(), Some("w-outside"));
        assert_eq!(client.calls(Operation::Create), 0);

        let ReadOutcome::Present(remote) = manager.read("w-outside").await.unwrap() else {
            panic!("expected resource to exist");
        };
        assert_eq!(remote.attributes, imported.attributes);
    }

    #[tokio::test]
    async fn test_import_missing_resource_fails() {
        let client = Arc::new(MemoryClient::<Widget>::new());
        let manager = manager(&client);

        let err = manager.import("w-nowhere").await.unwrap_err();
        assert!(matches!(err, CloudError::ResourceNotFound(_)));
    }
}
