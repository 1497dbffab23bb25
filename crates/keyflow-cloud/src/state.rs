//! Tracked state for managed resources
//!
//! Manages the `.keyflow/state.json` file, which records the remote identity
//! and last-observed attributes of every managed instance. Remote state is
//! never cached here; every lifecycle step re-reads it.

use crate::client::Declared;
use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".keyflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Key of an instance in the state file
pub fn state_key(resource_type: &str, name: &str) -> String {
    format!("{}:{}", resource_type, name)
}

/// Lifecycle position of a managed instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    /// Declared but not yet created
    Planned,
    /// Create call in flight
    Creating,
    /// Exists remotely and is managed
    Created,
    /// Read-back in flight
    Reading,
    /// Update call in flight
    Updating,
    /// Delete issued, waiting for convergence
    Deleting,
    /// Confirmed absent
    Deleted,
}

impl LifecycleStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleStatus::Created | LifecycleStatus::Deleted)
    }
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleStatus::Planned => write!(f, "planned"),
            LifecycleStatus::Creating => write!(f, "creating"),
            LifecycleStatus::Created => write!(f, "created"),
            LifecycleStatus::Reading => write!(f, "reading"),
            LifecycleStatus::Updating => write!(f, "updating"),
            LifecycleStatus::Deleting => write!(f, "deleting"),
            LifecycleStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// A managed instance with typed attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedResource<A> {
    /// Durable remote identifier
    pub id: String,

    /// Resource type
    pub resource_type: String,

    /// Current lifecycle status
    pub status: LifecycleStatus,

    /// Last applied or observed attributes
    pub attributes: A,

    /// When the resource was adopted
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// State file form of a tracked instance
pub type ResourceState = TrackedResource<serde_json::Value>;

impl<A: Declared> TrackedResource<A> {
    /// Adopt a remote resource as `Created`
    pub fn adopt(id: impl Into<String>, attributes: A) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            resource_type: A::RESOURCE_TYPE.to_string(),
            status: LifecycleStatus::Created,
            attributes,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: LifecycleStatus) -> Self {
        self.status = status;
        self
    }

    /// Replace attributes with observed ones, returning whether they drifted
    pub fn refresh(&mut self, observed: A) -> bool {
        let drifted = self.attributes != observed;
        if drifted {
            self.attributes = observed;
            self.updated_at = Utc::now();
        }
        self.status = LifecycleStatus::Created;
        drifted
    }

    /// Encode for the state file
    pub fn to_state(&self) -> Result<ResourceState> {
        Ok(TrackedResource {
            id: self.id.clone(),
            resource_type: self.resource_type.clone(),
            status: self.status,
            attributes: serde_json::to_value(&self.attributes)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl ResourceState {
    /// Decode typed attributes from the state file form
    pub fn decode<A: Declared>(&self) -> Result<TrackedResource<A>> {
        if self.resource_type != A::RESOURCE_TYPE {
            return Err(CloudError::StateError(format!(
                "resource {} has type {}, expected {}",
                self.id,
                self.resource_type,
                A::RESOURCE_TYPE
            )));
        }
        Ok(TrackedResource {
            id: self.id.clone(),
            resource_type: self.resource_type.clone(),
            status: self.status,
            attributes: serde_json::from_value(self.attributes.clone())?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Global state containing all tracked instances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Resources indexed by type:name
    pub resources: HashMap<String, ResourceState>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: HashMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instance names tracked for a resource type, sorted
    pub fn names_of_type(&self, resource_type: &str) -> Vec<String> {
        let prefix = format!("{}:", resource_type);
        let mut names: Vec<String> = self
            .resources
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix).map(|n| n.to_string()))
            .collect();
        names.sort();
        names
    }

    /// Add or update a resource
    pub fn set_resource(&mut self, key: String, state: ResourceState) {
        self.resources.insert(key, state);
        self.updated_at = Utc::now();
    }

    /// Add or update a typed resource under `name`
    pub fn track<A: Declared>(&mut self, name: &str, resource: &TrackedResource<A>) -> Result<()> {
        let key = state_key(A::RESOURCE_TYPE, name);
        self.set_resource(key, resource.to_state()?);
        Ok(())
    }

    /// Remove a resource
    pub fn remove_resource(&mut self, key: &str) -> Option<ResourceState> {
        let result = self.resources.remove(key);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    /// Get a resource by key
    pub fn get_resource(&self, key: &str) -> Option<&ResourceState> {
        self.resources.get(key)
    }

    /// Get a typed resource by instance name
    pub fn tracked<A: Declared>(&self, name: &str) -> Result<Option<TrackedResource<A>>> {
        self.get_resource(&state_key(A::RESOURCE_TYPE, name))
            .map(|state| state.decode())
            .transpose()
    }
}

/// State manager for reading/writing state files
pub struct StateManager {
    /// Project root directory
    project_root: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    /// Get the state directory path
    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    /// Get the state file path
    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    /// Get the backup file path
    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    /// Get the lock file path
    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    /// Ensure the state directory exists
    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the current state
    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(GlobalState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: GlobalState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} resources", state.resources.len());
        Ok(state)
    }

    /// Save the state
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created state backup");
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} resources", state.resources.len());
        Ok(())
    }

    /// Acquire a lock for exclusive access
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // Locks older than an hour are considered stale
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::LockError(format!(
                    "State is locked by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Widget;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = GlobalState::new();
        let widget = Widget::new("primary", "blue");
        state
            .track("primary", &TrackedResource::adopt("w-1", widget.clone()))
            .unwrap();

        manager.save(&state).await.unwrap();

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.resources.len(), 1);
        let tracked = loaded.tracked::<Widget>("primary").unwrap().unwrap();
        assert_eq!(tracked.id, "w-1");
        assert_eq!(tracked.attributes, widget);
        assert_eq!(tracked.status, LifecycleStatus::Created);
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let state = manager.load().await.unwrap();
        assert!(state.resources.is_empty());
    }

    #[tokio::test]
    async fn test_save_keeps_backup() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        manager.save(&GlobalState::new()).await.unwrap();
        manager.save(&GlobalState::new()).await.unwrap();

        assert!(temp_dir.path().join(".keyflow/state.json.backup").exists());
    }

    #[tokio::test]
    async fn test_newer_state_version_rejected() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = GlobalState::new();
        state.version = STATE_VERSION + 1;
        manager.save(&state).await.unwrap();

        let err = manager.load().await.unwrap_err();
        assert!(matches!(err, CloudError::StateError(_)));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_until_released() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock().await.unwrap();
        let err = manager.acquire_lock().await.err().unwrap();
        assert!(matches!(err, CloudError::LockError(_)));

        lock.release().await.unwrap();
        let again = manager.acquire_lock().await.unwrap();
        drop(again);
        assert!(!temp_dir.path().join(".keyflow/lock.json").exists());
    }

    #[test]
    fn test_names_of_type_and_decode_mismatch() {
        let mut state = GlobalState::new();
        state
            .track("b", &TrackedResource::adopt("w-2", Widget::new("b", "red")))
            .unwrap();
        state
            .track("a", &TrackedResource::adopt("w-1", Widget::new("a", "red")))
            .unwrap();

        assert_eq!(state.names_of_type(Widget::RESOURCE_TYPE), vec!["a", "b"]);

        let mut foreign = state.get_resource("widget:a").unwrap().clone();
        foreign.resource_type = "gadget".to_string();
        assert!(foreign.decode::<Widget>().is_err());
    }

    #[test]
    fn test_refresh_reports_drift() {
        let mut tracked = TrackedResource::adopt("w-1", Widget::new("a", "red"));
        assert!(!tracked.refresh(Widget::new("a", "red")));
        assert!(tracked.refresh(Widget::new("a", "green")));
        assert_eq!(tracked.attributes.color, "green");
    }
}
