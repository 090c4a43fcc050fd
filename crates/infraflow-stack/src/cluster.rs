//! GKE Autopilot cluster and its kubeconfig

use crate::composition::ComposeInputs;
use crate::gcp;
use infraflow_cloud::{Output, Provider, Resource, ResourceId};
use infraflow_core::StackConfig;
use serde_json::json;

pub const CLUSTER_NAME: &str = "cluster";
pub const PROVIDER_KIND: &str = "k8s-provider";
pub const PROVIDER_NAME: &str = "gke-k8s";

/// Cluster attributes only known after the provider creates it
pub const ENDPOINT: &str = "endpoint";
pub const CA_CERTIFICATE: &str = "caCertificate";
pub const LOCATION: &str = "location";

/// The provisioned cluster and the provider Kubernetes objects go through
#[derive(Debug, Clone)]
pub struct ClusterHandle {
    pub cluster: ResourceId,
    pub provider: ResourceId,
    pub context: Output<String>,
    pub kubeconfig: Output<String>,
}

impl ClusterHandle {
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            cluster: ResourceId::new(gcp::CLUSTER, CLUSTER_NAME),
            provider: ResourceId::new(PROVIDER_KIND, PROVIDER_NAME),
            context: Output::known("p_us-central1_cluster".to_string()),
            kubeconfig: Output::pending("gke-cluster/cluster", ENDPOINT),
        }
    }
}

/// `{project}_{location}_{name}`
pub fn context_name(project: &str, location: &str, name: &str) -> String {
    format!("{}_{}_{}", project, location, name)
}

/// Kubeconfig for a GKE cluster authenticating through the gcloud helper
pub fn kubeconfig(
    project: &str,
    name: &str,
    endpoint: &str,
    ca_certificate: &str,
    location: &str,
) -> String {
    let context = context_name(project, location, name);
    format!(
        r#"apiVersion: v1
clusters:
- cluster:
    certificate-authority-data: {ca_certificate}
    server: https://{endpoint}
  name: {context}
contexts:
- context:
    cluster: {context}
    user: {context}
  name: {context}
current-context: {context}
kind: Config
preferences: {{}}
users:
- name: {context}
  user:
    auth-provider:
      config:
        cmd-args: config config-helper --format=json
        cmd-path: gcloud
        expiry-key: '{{.credential.token_expiry}}'
        token-key: '{{.credential.access_token}}'
      name: gcp
"#
    )
}

/// Declare the cluster and its Kubernetes provider
pub fn provision(config: &StackConfig, inputs: &ComposeInputs) -> (Vec<Resource>, ClusterHandle) {
    let cluster_id = ResourceId::new(gcp::CLUSTER, CLUSTER_NAME);
    let cluster = gcp::resource(
        gcp::CLUSTER,
        CLUSTER_NAME,
        json!({
            "project": config.project.id,
            "location": config.project.region,
            "autopilot": { "enabled": true },
            "releaseChannel": { "channel": "REGULAR" },
            "workloadIdentityConfig": { "workloadPool": config.workload_pool() },
        }),
    );

    let key = cluster_id.to_string();
    let location = match inputs.output(&key, LOCATION) {
        Output::Known(location) => location,
        Output::Pending(_) => config.project.region.clone(),
    };
    let project = config.project.id.clone();
    let context = context_name(&project, &location, CLUSTER_NAME);
    let kubeconfig = inputs
        .output(&key, ENDPOINT)
        .zip(inputs.output(&key, CA_CERTIFICATE))
        .map(|(endpoint, ca)| kubeconfig(&project, CLUSTER_NAME, &endpoint, &ca, &location));

    let provider_id = ResourceId::new(PROVIDER_KIND, PROVIDER_NAME);
    let provider = Resource::new(
        provider_id.clone(),
        Provider::Kubernetes,
        json!({
            "context": context,
            "kubeconfig": "kubeconfig.yaml",
        }),
    )
    .depends_on(cluster_id.clone());

    let handle = ClusterHandle {
        cluster: cluster_id,
        provider: provider_id,
        context: Output::known(context),
        kubeconfig,
    };
    (vec![cluster, provider], handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config() -> StackConfig {
        let mut config = StackConfig::new("dev");
        config.project.id = "my-project".to_string();
        config
    }

    #[test]
    fn test_kubeconfig_single_context() {
        let yaml = kubeconfig("my-project", "cluster", "10.0.0.1", "Q0FEQVRB", "us-central1");
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        let context = "my-project_us-central1_cluster";
        assert_eq!(value["current-context"].as_str(), Some(context));
        assert_eq!(value["clusters"].as_sequence().map(|s| s.len()), Some(1));
        assert_eq!(value["contexts"][0]["name"].as_str(), Some(context));
        assert_eq!(value["users"][0]["name"].as_str(), Some(context));
        assert_eq!(
            value["clusters"][0]["cluster"]["server"].as_str(),
            Some("https://10.0.0.1")
        );
        assert_eq!(
            value["users"][0]["user"]["auth-provider"]["config"]["token-key"].as_str(),
            Some("{.credential.access_token}")
        );
    }

    #[test]
    fn test_kubeconfig_pending_until_endpoint_known() {
        let (resources, handle) = provision(&config(), &ComposeInputs::for_tests());
        assert_eq!(resources.len(), 2);
        assert!(resources[0].depends_on.is_empty());
        assert_eq!(resources[1].depends_on, vec![handle.cluster.clone()]);
        assert_eq!(
            handle.kubeconfig.pending_on().map(|p| p.key()),
            Some("gke-cluster/cluster.endpoint".to_string())
        );
    }

    #[test]
    fn test_kubeconfig_known_with_outputs() {
        let mut inputs = ComposeInputs::for_tests();
        inputs.outputs = BTreeMap::from([
            ("gke-cluster/cluster.endpoint".to_string(), json!("34.1.2.3")),
            ("gke-cluster/cluster.caCertificate".to_string(), json!("Q0E=")),
        ]);
        let (resources, handle) = provision(&config(), &inputs);

        let kubeconfig = handle.kubeconfig.into_option().unwrap();
        assert!(kubeconfig.contains("server: https://34.1.2.3"));
        assert!(kubeconfig.contains("certificate-authority-data: Q0E="));
        assert_eq!(resources[0].config["releaseChannel"]["channel"], "REGULAR");
        assert_eq!(
            resources[0].config["workloadIdentityConfig"]["workloadPool"],
            "my-project.svc.id.goog"
        );
    }
}
