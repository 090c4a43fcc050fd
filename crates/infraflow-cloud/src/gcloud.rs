//! gcloud CLI reader
//!
//! Reads provider outputs (cluster endpoint and CA, access tokens).
//! Never mutates cloud resources.

use crate::error::{CloudError, Result};
use crate::secret::Secret;
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;

/// Outputs of a GKE cluster needed for the kubeconfig
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    pub name: String,
    pub endpoint: String,
    /// Base64-encoded cluster CA certificate
    pub ca_certificate: String,
    pub location: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterDescribe {
    name: String,
    endpoint: String,
    location: String,
    master_auth: MasterAuth,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MasterAuth {
    cluster_ca_certificate: String,
}

/// gcloud CLI wrapper scoped to one project
pub struct Gcloud {
    project: String,
}

impl Gcloud {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
        }
    }

    /// Check that gcloud is installed
    pub async fn check_installed(&self) -> Result<()> {
        let which = Command::new("which").arg("gcloud").output().await?;
        if !which.status.success() {
            return Err(CloudError::ToolNotFound("gcloud".to_string()));
        }
        Ok(())
    }

    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("gcloud");
        cmd.args(args);
        cmd.arg("--project").arg(&self.project);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: gcloud {} --project {}", args.join(" "), self.project);

        let output = cmd.output().await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CloudError::ToolNotFound("gcloud".to_string()),
            _ => CloudError::Io(e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CloudError::CommandFailed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Describe a cluster; `None` if it does not exist yet
    pub async fn describe_cluster(&self, name: &str, location: &str) -> Result<Option<ClusterInfo>> {
        let result = self
            .run_command(&[
                "container",
                "clusters",
                "describe",
                name,
                "--location",
                location,
                "--format",
                "json",
            ])
            .await;

        match result {
            Ok(output) => parse_cluster_describe(&output).map(Some),
            Err(CloudError::CommandFailed(msg)) if is_not_found(&msg) => {
                tracing::debug!(cluster = %name, "Cluster not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Short-lived OAuth access token of the active account
    pub async fn print_access_token(&self) -> Result<Secret<String>> {
        let output = self.run_command(&["auth", "print-access-token"]).await?;
        let token = output.trim().to_string();
        if token.is_empty() {
            return Err(CloudError::CommandFailed(
                "gcloud returned an empty access token".to_string(),
            ));
        }
        Ok(Secret::new(token))
    }
}

fn is_not_found(message: &str) -> bool {
    message.contains("NOT_FOUND") || message.contains("was not found")
}

/// Parse `gcloud container clusters describe --format json`
pub fn parse_cluster_describe(json: &str) -> Result<ClusterInfo> {
    let described: ClusterDescribe = serde_json::from_str(json)?;
    Ok(ClusterInfo {
        name: described.name,
        endpoint: described.endpoint,
        ca_certificate: described.master_auth.cluster_ca_certificate,
        location: described.location,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cluster_describe() {
        let json = r#"{
            "name": "app-cluster",
            "endpoint": "34.1.2.3",
            "location": "us-central1",
            "autopilot": { "enabled": true },
            "masterAuth": { "clusterCaCertificate": "LS0tLS1CRUdJTg==" }
        }"#;

        let info = parse_cluster_describe(json).unwrap();
        assert_eq!(info.name, "app-cluster");
        assert_eq!(info.endpoint, "34.1.2.3");
        assert_eq!(info.ca_certificate, "LS0tLS1CRUdJTg==");
        assert_eq!(info.location, "us-central1");
    }

    #[test]
    fn test_parse_cluster_describe_missing_fields() {
        assert!(parse_cluster_describe(r#"{"name": "x"}"#).is_err());
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found("ERROR: (gcloud.container.clusters.describe) ResponseError: code=404, message=Not found: projects/p/locations/l/clusters/c was not found."));
        assert!(!is_not_found("permission denied"));
    }

    #[tokio::test]
    #[ignore] // requires gcloud with an authenticated account
    async fn test_print_access_token() {
        let gcloud = Gcloud::new("my-project");
        let token = gcloud.print_access_token().await.unwrap();
        assert!(!token.expose().is_empty());
    }
}
