//! State management for a stack
//!
//! Manages `.infraflow/<stack>.state.json`, the last recorded snapshot of
//! the desired graph plus provider outputs and encrypted generated secrets.

use crate::error::{CloudError, Result};
use crate::graph::ResourceGraph;
use crate::output::{Output, PendingOutput, lookup_output};
use crate::resource::{Provider, ResourceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".infraflow";

/// Snapshot of one stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Recorded resources indexed by `kind/name`
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRecord>,

    /// Provider outputs indexed by `kind/name.attribute`
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,

    /// Generated secrets, encrypted (base64 nonce || ciphertext)
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
}

impl Default for StackState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
            secrets: BTreeMap::new(),
        }
    }
}

impl StackState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace recorded resources with the given graph
    pub fn record_graph(&mut self, graph: &ResourceGraph) -> Result<()> {
        self.record_graph_keeping(graph, &[])
    }

    /// Replace recorded resources, keeping records for `keep` (deferred resources)
    pub fn record_graph_keeping(&mut self, graph: &ResourceGraph, keep: &[ResourceId]) -> Result<()> {
        let now = Utc::now();
        let mut resources: BTreeMap<String, ResourceRecord> = self
            .resources
            .iter()
            .filter(|(_, record)| keep.contains(&record.id) && !graph.contains(&record.id))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (order, resource) in graph.topological_order()?.into_iter().enumerate() {
            let key = resource.id.to_string();
            let fingerprint = resource.fingerprint();
            let created_at = self
                .resources
                .get(&key)
                .map(|r| r.created_at)
                .unwrap_or(now);
            resources.insert(
                key,
                ResourceRecord {
                    id: resource.id.clone(),
                    provider: resource.provider,
                    fingerprint,
                    depends_on: resource.depends_on.clone(),
                    order,
                    config: resource.config.clone(),
                    created_at,
                    updated_at: now,
                },
            );
        }

        self.resources = resources;
        self.updated_at = now;
        Ok(())
    }

    /// Record a provider output
    pub fn set_output(&mut self, resource: &str, attribute: &str, value: serde_json::Value) {
        self.outputs
            .insert(PendingOutput::new(resource, attribute).key(), value);
        self.updated_at = Utc::now();
    }

    pub fn remove_output(&mut self, key: &str) -> Option<serde_json::Value> {
        let result = self.outputs.remove(key);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    /// A string output; pending until recorded
    pub fn output(&self, resource: &str, attribute: &str) -> Output<String> {
        lookup_output(&self.outputs, resource, attribute)
    }

    /// Forget every recorded resource and output (secrets kept unless asked)
    pub fn clear(&mut self, forget_secrets: bool) {
        self.resources.clear();
        self.outputs.clear();
        if forget_secrets {
            self.secrets.clear();
        }
        self.updated_at = Utc::now();
    }
}

/// Recorded state of a single resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: ResourceId,
    pub provider: Provider,
    /// SHA-256 fingerprint of the desired config
    pub fingerprint: String,
    #[serde(default)]
    pub depends_on: Vec<ResourceId>,
    /// Position in dependency order when recorded
    #[serde(default)]
    pub order: usize,
    /// Display-safe config (secrets masked)
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// State manager for one stack's state file
pub struct StateManager {
    project_root: PathBuf,
    stack: String,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>, stack: impl Into<String>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
            stack: stack.into(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    /// Path of `.infraflow/<stack>.state.json`
    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(format!("{}.state.json", self.stack))
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir()
            .join(format!("{}.state.json.backup", self.stack))
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(format!("{}.lock.json", self.stack))
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the current state (empty if none recorded)
    pub async fn load(&self) -> Result<StackState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!(stack = %self.stack, "State file not found, returning empty state");
            return Ok(StackState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: StackState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!(
            stack = %self.stack,
            resources = state.resources.len(),
            outputs = state.outputs.len(),
            "Loaded state"
        );
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    pub async fn save(&self, state: &StackState) -> Result<()> {
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

        tracing::debug!(stack = %self.stack, resources = state.resources.len(), "Saved state");
        Ok(())
    }

    /// Acquire a lock for exclusive access
    ///
    /// Locks older than one hour are considered stale and taken over.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::LockError(format!(
                    "Stack '{}' is locked by {} since {}",
                    self.stack, lock_info.holder, lock_info.acquired_at
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

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
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
    use crate::resource::Resource;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample_graph() -> ResourceGraph {
        let mut graph = ResourceGraph::new();
        graph
            .insert(Resource::new(
                ResourceId::new("gke-cluster", "app-cluster"),
                Provider::Gcp,
                json!({ "autopilot": true }),
            ))
            .unwrap();
        graph
    }

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path(), "dev");

        let mut state = StackState::new();
        state.record_graph(&sample_graph()).unwrap();
        state.set_output("gke-cluster/app-cluster", "endpoint", json!("10.0.0.1"));

        manager.save(&state).await.unwrap();
        assert!(temp_dir.path().join(".infraflow/dev.state.json").exists());

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.resources.len(), 1);
        assert_eq!(
            loaded.output("gke-cluster/app-cluster", "endpoint"),
            Output::Known("10.0.0.1".to_string())
        );
    }

    #[tokio::test]
    async fn test_backup_created_on_second_save() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path(), "prod");

        manager.save(&StackState::new()).await.unwrap();
        manager.save(&StackState::new()).await.unwrap();
        assert!(temp_dir
            .path()
            .join(".infraflow/prod.state.json.backup")
            .exists());
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path(), "dev");

        let state = manager.load().await.unwrap();
        assert!(state.resources.is_empty());
        assert!(!state.output("service/app", "address").is_known());
    }

    #[tokio::test]
    async fn test_newer_version_rejected() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path(), "dev");
        let mut state = StackState::new();
        state.version = STATE_VERSION + 1;
        manager.save(&state).await.unwrap();

        assert!(matches!(manager.load().await, Err(CloudError::StateError(_))));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path(), "dev");

        let lock = manager.acquire_lock().await.unwrap();
        assert!(matches!(
            manager.acquire_lock().await,
            Err(CloudError::LockError(_))
        ));
        lock.release().await.unwrap();
        assert!(manager.acquire_lock().await.is_ok());
    }

    #[tokio::test]
    async fn test_stale_lock_taken_over() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path(), "dev");
        std::fs::create_dir_all(temp_dir.path().join(".infraflow")).unwrap();
        let stale = LockInfo {
            holder: "old-host".to_string(),
            acquired_at: Utc::now() - chrono::Duration::hours(2),
        };
        std::fs::write(
            temp_dir.path().join(".infraflow/dev.lock.json"),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        assert!(manager.acquire_lock().await.is_ok());
    }

    #[test]
    fn test_record_keeps_deferred_and_creation_time() {
        let mut state = StackState::new();
        let mut graph = sample_graph();
        graph
            .insert(Resource::new(
                ResourceId::new("deployment", "bench"),
                Provider::Kubernetes,
                json!({}),
            ))
            .unwrap();
        state.record_graph(&graph).unwrap();
        let created = state.resources["gke-cluster/app-cluster"].created_at;

        let bench = ResourceId::new("deployment", "bench");
        state
            .record_graph_keeping(&sample_graph(), std::slice::from_ref(&bench))
            .unwrap();
        assert!(state.resources.contains_key("deployment/bench"));
        assert_eq!(state.resources["gke-cluster/app-cluster"].created_at, created);

        state.record_graph(&sample_graph()).unwrap();
        assert!(!state.resources.contains_key("deployment/bench"));
    }

    #[test]
    fn test_clear() {
        let mut state = StackState::new();
        state.record_graph(&sample_graph()).unwrap();
        state.secrets.insert("password".to_string(), "xxx".to_string());

        state.clear(false);
        assert!(state.resources.is_empty());
        assert_eq!(state.secrets.len(), 1);

        state.clear(true);
        assert!(state.secrets.is_empty());
    }
}
