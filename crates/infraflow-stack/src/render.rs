//! Render a resource graph into the files the orchestration engine consumes

use crate::error::Result;
use infraflow_cloud::{Output, Provider, Resource, ResourceGraph};
use serde::Serialize;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const KUBERNETES_FILE: &str = "kubernetes.yaml";
pub const GCP_FILE: &str = "gcp.json";
pub const IMAGES_FILE: &str = "images.json";
pub const KUBECONFIG_FILE: &str = "kubeconfig.yaml";

/// Rendered manifests in dependency order
#[derive(Debug, Clone, Serialize)]
pub struct Bundle {
    pub kubernetes: Vec<Value>,
    pub gcp: Vec<Value>,
    pub images: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,
}

impl Bundle {
    /// Bundle with secret values filled in, for writing to disk
    pub fn from_graph(graph: &ResourceGraph, kubeconfig: &Output<String>) -> Result<Self> {
        Self::render(graph, kubeconfig, true)
    }

    /// Bundle with every secret field left as `[secret]`
    pub fn display(graph: &ResourceGraph, kubeconfig: &Output<String>) -> Result<Self> {
        Self::render(graph, kubeconfig, false)
    }

    fn render(graph: &ResourceGraph, kubeconfig: &Output<String>, materialize: bool) -> Result<Self> {
        let mut bundle = Bundle {
            kubernetes: Vec::new(),
            gcp: Vec::new(),
            images: Vec::new(),
            kubeconfig: kubeconfig.value().cloned(),
        };

        for resource in graph.topological_order()? {
            let config = if materialize {
                resource.materialize()?
            } else {
                resource.config.clone()
            };
            match resource.provider {
                // The provider resource itself is carried by kubeconfig.yaml
                Provider::Kubernetes if config.get("apiVersion").is_some() => {
                    bundle.kubernetes.push(config)
                }
                Provider::Kubernetes => {}
                Provider::Docker => bundle.images.push(descriptor(resource, config)),
                Provider::Gcp | Provider::Generated => bundle.gcp.push(descriptor(resource, config)),
            }
        }

        debug!(
            kubernetes = bundle.kubernetes.len(),
            gcp = bundle.gcp.len(),
            images = bundle.images.len(),
            "Rendered bundle"
        );
        Ok(bundle)
    }

    /// Multi-document YAML, one object per document
    pub fn kubernetes_yaml(&self) -> Result<String> {
        let mut out = String::new();
        for object in &self.kubernetes {
            out.push_str("---\n");
            out.push_str(&serde_yaml::to_string(object)?);
        }
        Ok(out)
    }

    pub fn gcp_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.gcp)?)
    }

    pub fn images_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.images)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write every file into `dir`; returns the paths written
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;

        let mut files = vec![
            (KUBERNETES_FILE, self.kubernetes_yaml()?),
            (GCP_FILE, self.gcp_json()?),
            (IMAGES_FILE, self.images_json()?),
        ];
        if let Some(kubeconfig) = &self.kubeconfig {
            files.push((KUBECONFIG_FILE, kubeconfig.clone()));
        } else {
            // 古い kubeconfig を残さない
            let stale = dir.join(KUBECONFIG_FILE);
            if stale.exists() {
                fs::remove_file(&stale)?;
            }
        }

        let mut written = Vec::with_capacity(files.len());
        for (name, contents) in files {
            let path = dir.join(name);
            fs::write(&path, contents)?;
            written.push(path);
        }
        info!(dir = %dir.display(), files = written.len(), "Wrote bundle");
        Ok(written)
    }
}

fn descriptor(resource: &Resource, config: Value) -> Value {
    json!({
        "id": resource.id.to_string(),
        "kind": resource.id.kind,
        "name": resource.id.name,
        "provider": resource.provider.to_string(),
        "dependsOn": resource.depends_on.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "config": config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{ComposeInputs, compose};
    use infraflow_core::StackConfig;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn graph(outputs: BTreeMap<String, Value>) -> (ResourceGraph, Output<String>) {
        let mut config = StackConfig::new("dev");
        config.project.id = "my-project".to_string();
        let mut inputs = ComposeInputs::for_tests();
        inputs.outputs = outputs;
        let composition = compose(&config, &inputs).unwrap();
        let kubeconfig = composition.kubeconfig.clone();
        (composition.into_graph().unwrap(), kubeconfig)
    }

    fn position(bundle: &Bundle, kind: &str, name: &str) -> usize {
        bundle
            .kubernetes
            .iter()
            .position(|o| o["kind"] == kind && o["metadata"]["name"] == name)
            .unwrap()
    }

    #[test]
    fn test_kubernetes_objects_in_dependency_order() {
        let (graph, kubeconfig) = graph(BTreeMap::new());
        let bundle = Bundle::from_graph(&graph, &kubeconfig).unwrap();

        let account = position(&bundle, "ServiceAccount", "app");
        let job = position(&bundle, "Job", "migrations-latest");
        let deployment = position(&bundle, "Deployment", "app");
        let service = position(&bundle, "Service", "app");
        assert!(account < job);
        assert!(job < deployment);
        assert!(deployment < service);
        assert!(bundle.kubeconfig.is_none());
    }

    #[test]
    fn test_display_masks_secrets() {
        let (graph, kubeconfig) = graph(BTreeMap::new());

        let display = Bundle::display(&graph, &kubeconfig).unwrap().to_json().unwrap();
        assert!(!display.contains("TokenSigningKey1"));
        assert!(!display.contains("db-pa$$word-0001"));
        assert!(display.contains("[secret]"));

        let materialized = Bundle::from_graph(&graph, &kubeconfig).unwrap();
        assert!(materialized.kubernetes_yaml().unwrap().contains("TokenSigningKey1"));
        assert!(materialized.gcp_json().unwrap().contains("db-pa$$word-0001"));
    }

    #[test]
    fn test_descriptors() {
        let (graph, kubeconfig) = graph(BTreeMap::new());
        let bundle = Bundle::display(&graph, &kubeconfig).unwrap();

        assert_eq!(bundle.gcp[0]["id"], "gke-cluster/cluster");
        assert_eq!(bundle.gcp[0]["provider"], "gcp");
        assert!(bundle.images.iter().all(|i| i["dependsOn"] == json!(["artifact-registry/docker"])));
        assert!(
            bundle
                .kubernetes
                .iter()
                .all(|o| o.get("apiVersion").is_some() && o.get("kind").is_some())
        );
    }

    #[test]
    fn test_write_to() {
        let outputs = BTreeMap::from([
            ("gke-cluster/cluster.endpoint".to_string(), json!("1.2.3.4")),
            ("gke-cluster/cluster.caCertificate".to_string(), json!("Q0E=")),
        ]);
        let (graph, kubeconfig) = graph(outputs);
        let bundle = Bundle::from_graph(&graph, &kubeconfig).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let written = bundle.write_to(dir.path()).unwrap();
        assert_eq!(written.len(), 4);

        let yaml = fs::read_to_string(dir.path().join(KUBERNETES_FILE)).unwrap();
        assert!(yaml.starts_with("---\n"));
        let kubeconfig = fs::read_to_string(dir.path().join(KUBECONFIG_FILE)).unwrap();
        assert!(kubeconfig.contains("server: https://1.2.3.4"));
    }

    #[test]
    fn test_pending_kubeconfig_removes_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(KUBECONFIG_FILE), "old").unwrap();

        let (graph, kubeconfig) = graph(BTreeMap::new());
        let written = Bundle::from_graph(&graph, &kubeconfig)
            .unwrap()
            .write_to(dir.path())
            .unwrap();
        assert_eq!(written.len(), 3);
        assert!(!dir.path().join(KUBECONFIG_FILE).exists());
    }
}
