//! Desired-state resource descriptors

use crate::error::{CloudError, Result};
use crate::secret::Secret;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Stable identity of a resource in `kind/name` form
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    /// Resource kind (e.g. "gcp-service-account", "deployment")
    pub kind: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Parse `kind/name`
    pub fn parse(s: &str) -> Option<Self> {
        let (kind, name) = s.split_once('/')?;
        if kind.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(kind, name))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Which external system owns the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Cloud APIs
    Gcp,
    /// Kubernetes API of the provisioned cluster
    Kubernetes,
    /// Image build and push
    Docker,
    /// Material generated locally (passwords, keys, certificates)
    Generated,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Gcp => write!(f, "gcp"),
            Provider::Kubernetes => write!(f, "kubernetes"),
            Provider::Docker => write!(f, "docker"),
            Provider::Generated => write!(f, "generated"),
        }
    }
}

/// A desired-state resource handed to the orchestration engine
///
/// `config` is display-safe: every secret field holds the `[secret]`
/// placeholder, and the real value lives in `secrets` keyed by the JSON
/// pointer of the field it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct Resource {
    pub id: ResourceId,
    pub provider: Provider,
    pub depends_on: Vec<ResourceId>,
    pub config: serde_json::Value,
    pub secrets: BTreeMap<String, Secret<String>>,
}

impl Resource {
    pub fn new(id: ResourceId, provider: Provider, config: serde_json::Value) -> Self {
        Self {
            id,
            provider,
            depends_on: Vec::new(),
            config,
            secrets: BTreeMap::new(),
        }
    }

    /// Add an explicit dependency edge (duplicates ignored)
    pub fn depends_on(mut self, id: ResourceId) -> Self {
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
        self
    }

    pub fn depends_on_all(mut self, ids: impl IntoIterator<Item = ResourceId>) -> Self {
        for id in ids {
            self = self.depends_on(id);
        }
        self
    }

    /// Attach a secret value at `pointer`, writing the placeholder into config
    pub fn with_secret(mut self, pointer: &str, value: Secret<String>) -> Result<Self> {
        let slot = pointer_slot(&mut self.config, pointer)?;
        *slot = serde_json::Value::String(Secret::<String>::mask().to_string());
        self.secrets.insert(pointer.to_string(), value);
        Ok(self)
    }

    /// The engine payload with secret values filled in
    pub fn materialize(&self) -> Result<serde_json::Value> {
        let mut value = self.config.clone();
        for (pointer, secret) in &self.secrets {
            let slot = pointer_slot(&mut value, pointer)?;
            *slot = serde_json::Value::String(secret.expose().clone());
        }
        Ok(value)
    }

    /// SHA-256 over the display config and a digest of each secret
    ///
    /// Changing a secret changes the fingerprint without the secret
    /// ever reaching the state file in plaintext.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.provider.to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.config.to_string().as_bytes());
        for (pointer, secret) in &self.secrets {
            hasher.update(b"\0");
            hasher.update(pointer.as_bytes());
            hasher.update(b"=");
            hasher.update(Sha256::digest(secret.expose().as_bytes()));
        }
        hex::encode(hasher.finalize())
    }
}

/// Resolve (creating intermediate objects) the slot a JSON pointer names
fn pointer_slot<'a>(
    value: &'a mut serde_json::Value,
    pointer: &str,
) -> Result<&'a mut serde_json::Value> {
    let Some(path) = pointer.strip_prefix('/') else {
        return Err(CloudError::InvalidSecretPath(pointer.to_string()));
    };
    let mut current = value;
    for raw in path.split('/') {
        let segment = raw.replace("~1", "/").replace("~0", "~");
        let target = current;
        if target.is_null() {
            *target = serde_json::Value::Object(serde_json::Map::new());
        }
        current = match target {
            serde_json::Value::Object(map) => {
                map.entry(segment).or_insert(serde_json::Value::Null)
            }
            serde_json::Value::Array(items) => {
                let index: usize = segment
                    .parse()
                    .map_err(|_| CloudError::InvalidSecretPath(pointer.to_string()))?;
                items
                    .get_mut(index)
                    .ok_or_else(|| CloudError::InvalidSecretPath(pointer.to_string()))?
            }
            _ => return Err(CloudError::InvalidSecretPath(pointer.to_string())),
        };
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn secret_resource(password: &str) -> Resource {
        Resource::new(
            ResourceId::new("sql-user", "app"),
            Provider::Gcp,
            json!({ "name": "app", "password": null }),
        )
        .with_secret("/password", Secret::new(password.to_string()))
        .unwrap()
    }

    #[test]
    fn test_resource_id_roundtrip() {
        let id = ResourceId::new("deployment", "app");
        assert_eq!(id.to_string(), "deployment/app");
        assert_eq!(ResourceId::parse("deployment/app"), Some(id));
        assert_eq!(ResourceId::parse("no-slash"), None);
    }

    #[test]
    fn test_secret_placeholder_in_config() {
        let resource = secret_resource("s3cret");
        assert_eq!(resource.config["password"], json!("[secret]"));
        let shown = serde_json::to_string(&resource).unwrap();
        assert!(!shown.contains("s3cret"));
    }

    #[test]
    fn test_materialize_fills_secret() {
        let resource = secret_resource("s3cret");
        let value = resource.materialize().unwrap();
        assert_eq!(value["password"], json!("s3cret"));
        assert_eq!(value["name"], json!("app"));
    }

    #[test]
    fn test_secret_in_nested_path() {
        let resource = Resource::new(
            ResourceId::new("secret", "token-signing-key"),
            Provider::Kubernetes,
            json!({ "kind": "Secret" }),
        )
        .with_secret("/stringData/key", Secret::new("abc".to_string()))
        .unwrap();
        assert_eq!(resource.config["stringData"]["key"], json!("[secret]"));
        assert_eq!(resource.materialize().unwrap()["stringData"]["key"], json!("abc"));
    }

    #[test]
    fn test_invalid_pointer() {
        let result = Resource::new(ResourceId::new("a", "b"), Provider::Gcp, json!({}))
            .with_secret("password", Secret::new("x".to_string()));
        assert!(matches!(result, Err(CloudError::InvalidSecretPath(_))));
    }

    #[test]
    fn test_fingerprint_tracks_secret_changes() {
        let a = secret_resource("one");
        let b = secret_resource("one");
        let c = secret_resource("two");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_depends_on_dedup() {
        let dep = ResourceId::new("job", "migrations");
        let resource = Resource::new(ResourceId::new("deployment", "app"), Provider::Kubernetes, json!({}))
            .depends_on(dep.clone())
            .depends_on(dep);
        assert_eq!(resource.depends_on.len(), 1);
    }
}
