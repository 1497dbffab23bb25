//! In-memory remote for exercising the reconciliation core
//!
//! [`MemoryClient`] behaves like an eventually consistent remote API: deleted
//! objects can keep answering reads for a configurable number of calls, and
//! failures can be injected per operation.

use crate::client::{ApiError, Declared, OperationResult, RemoteResource, ResourceClient};
use crate::error::{CloudError, Operation, Result};
use crate::plan::PlanPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Failure to return from the next call of an operation
#[derive(Debug, Clone)]
pub enum Injected {
    Api { status: u16, errors: Vec<ApiError> },
    Transport(String),
}

impl Injected {
    fn into_result<T>(self) -> OperationResult<T> {
        match self {
            Injected::Api { status, errors } => OperationResult::api_error(status, errors),
            Injected::Transport(cause) => OperationResult::transport(cause),
        }
    }
}

struct Inner<A> {
    objects: BTreeMap<String, A>,
    /// Deleted objects still visible to reads, with remaining visible reads
    ghosts: HashMap<String, (A, u32)>,
    linger: u32,
    next_id: u64,
    calls: HashMap<Operation, u32>,
    last_update: Vec<String>,
    injected: HashMap<Operation, VecDeque<Injected>>,
}

/// Eventually consistent in-memory [`ResourceClient`]
pub struct MemoryClient<A> {
    inner: Mutex<Inner<A>>,
}

impl<A: Declared> Default for MemoryClient<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Declared> MemoryClient<A> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                objects: BTreeMap::new(),
                ghosts: HashMap::new(),
                linger: 0,
                next_id: 1,
                calls: HashMap::new(),
                last_update: Vec::new(),
                injected: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<A>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deleted objects stay readable for `reads` further retrieve calls
    pub fn with_linger(self, reads: u32) -> Self {
        self.lock().linger = reads;
        self
    }

    pub fn set_linger(&self, reads: u32) {
        self.lock().linger = reads;
    }

    /// Fail the next call of `operation` with `failure`
    pub fn inject(&self, operation: Operation, failure: Injected) {
        self.lock()
            .injected
            .entry(operation)
            .or_default()
            .push_back(failure);
    }

    /// Create an object out of band, as another tool would
    pub fn insert(&self, id: &str, mut attributes: A) {
        attributes.set_id(id);
        self.lock().objects.insert(id.to_string(), attributes);
    }

    /// Delete an object out of band, immediately and without lingering
    pub fn remove(&self, id: &str) -> Option<A> {
        self.lock().objects.remove(id)
    }

    /// Mutate an object out of band
    pub fn modify(&self, id: &str, f: impl FnOnce(&mut A)) -> bool {
        match self.lock().objects.get_mut(id) {
            Some(attributes) => {
                f(attributes);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<A> {
        self.lock().objects.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of calls made for `operation`, injected failures included
    pub fn calls(&self, operation: Operation) -> u32 {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Fields named by the most recent update call
    pub fn last_update_fields(&self) -> Vec<String> {
        self.lock().last_update.clone()
    }

    fn begin<T>(&self, operation: Operation) -> (MutexGuard<'_, Inner<A>>, Option<OperationResult<T>>) {
        let mut inner = self.lock();
        *inner.calls.entry(operation).or_default() += 1;
        let injected = inner
            .injected
            .get_mut(&operation)
            .and_then(|queue| queue.pop_front())
            .map(Injected::into_result);
        (inner, injected)
    }
}

#[async_trait]
impl<A: Declared> ResourceClient for MemoryClient<A> {
    type Attributes = A;

    async fn create(&self, id: Option<&str>, attributes: &A) -> OperationResult<RemoteResource<A>> {
        let (mut inner, injected) = self.begin(Operation::Create);
        if let Some(result) = injected {
            return result;
        }

        let id = match id {
            Some(id) => {
                if inner.objects.contains_key(id) || inner.ghosts.contains_key(id) {
                    return OperationResult::api_error(
                        400,
                        vec![ApiError::new(
                            "[duplicate]id",
                            format!("An object with id {} already exists", id),
                        )],
                    );
                }
                id.to_string()
            }
            None => {
                let n = inner.next_id;
                inner.next_id += 1;
                format!("00000000-0000-4000-8000-{:012}", n)
            }
        };

        let mut stored = attributes.clone();
        stored.set_id(&id);
        inner.objects.insert(id.clone(), stored.clone());
        OperationResult::Success {
            status: 200,
            payload: Some(RemoteResource::new(id, stored)),
        }
    }

    async fn retrieve(&self, id: &str) -> OperationResult<RemoteResource<A>> {
        let (mut inner, injected) = self.begin(Operation::Read);
        if let Some(result) = injected {
            return result;
        }

        if let Some(attributes) = inner.objects.get(id) {
            return OperationResult::ok(RemoteResource::new(id, attributes.clone()));
        }

        let visible = match inner.ghosts.get_mut(id) {
            Some((attributes, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Some(attributes.clone())
            }
            _ => None,
        };
        match visible {
            Some(attributes) => OperationResult::ok(RemoteResource::new(id, attributes)),
            None => {
                inner.ghosts.remove(id);
                OperationResult::api_error(404, Vec::new())
            }
        }
    }

    async fn update(
        &self,
        id: &str,
        attributes: &A,
        changed: &[&'static str],
    ) -> OperationResult<RemoteResource<A>> {
        let (mut inner, injected) = self.begin(Operation::Update);
        inner.last_update = changed.iter().map(|f| f.to_string()).collect();
        if let Some(result) = injected {
            return result;
        }

        let Some(stored) = inner.objects.get_mut(id) else {
            return OperationResult::not_found();
        };
        match apply_fields(stored, attributes, changed) {
            Ok(mut updated) => {
                updated.set_id(id);
                *stored = updated.clone();
                OperationResult::ok(RemoteResource::new(id, updated))
            }
            Err(e) => OperationResult::api_error(
                400,
                vec![ApiError::new("[invalid]", format!("unusable update: {}", e))],
            ),
        }
    }

    async fn delete(&self, id: &str) -> OperationResult<()> {
        let (mut inner, injected) = self.begin(Operation::Delete);
        if let Some(result) = injected {
            return result;
        }

        match inner.objects.remove(id) {
            Some(attributes) => {
                let linger = inner.linger;
                if linger > 0 {
                    inner.ghosts.insert(id.to_string(), (attributes, linger));
                }
                OperationResult::acknowledged(200)
            }
            None => OperationResult::not_found(),
        }
    }
}

/// Copy only `fields` of `declared` onto `stored`, matching by serialized name
fn apply_fields<A: Declared>(stored: &A, declared: &A, fields: &[&str]) -> serde_json::Result<A> {
    let mut current = serde_json::to_value(stored)?;
    let wanted = serde_json::to_value(declared)?;
    if let (Some(current), Some(wanted)) = (current.as_object_mut(), wanted.as_object()) {
        for field in fields {
            match wanted.get(*field) {
                Some(value) => {
                    current.insert(field.to_string(), value.clone());
                }
                None => {
                    current.remove(*field);
                }
            }
        }
    }
    serde_json::from_value(current)
}

/// Minimal resource type for exercising the core without a real remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub color: String,
}

impl Widget {
    pub fn new(name: &str, color: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            color: color.to_string(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// `id` and `color` force replacement, `name` updates in place
    pub fn policy() -> PlanPolicy<Widget> {
        PlanPolicy::<Widget>::new()
            .replace_on("id", |o, n| o.id != n.id)
            .replace_on("color", |o, n| o.color != n.color)
            .update_on("name", |o, n| o.name != n.name)
    }
}

impl Declared for Widget {
    const RESOURCE_TYPE: &'static str = "widget";

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CloudError::validation(Self::RESOURCE_TYPE, "name is required"));
        }
        if let Some(id) = &self.id {
            if id.is_empty() || id.chars().any(char::is_whitespace) {
                return Err(CloudError::validation(
                    Self::RESOURCE_TYPE,
                    format!("malformed id {:?}", id),
                ));
            }
        }
        Ok(())
    }

    fn requested_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: &str) {
        self.id = Some(id.to_string());
    }

    fn inherit_computed(&mut self, prior: &Self) {
        if self.id.is_none() {
            self.id = prior.id.clone();
        }
    }
}
