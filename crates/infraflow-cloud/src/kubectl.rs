//! kubectl CLI reader for load-balancer addresses

use crate::error::{CloudError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

#[derive(Debug, Deserialize)]
struct ServiceStatusDoc {
    #[serde(default)]
    status: ServiceStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceStatus {
    #[serde(default)]
    load_balancer: LoadBalancerStatus,
}

#[derive(Debug, Default, Deserialize)]
struct LoadBalancerStatus {
    #[serde(default)]
    ingress: Vec<LoadBalancerIngress>,
}

#[derive(Debug, Deserialize)]
struct LoadBalancerIngress {
    ip: Option<String>,
    hostname: Option<String>,
}

/// kubectl CLI wrapper bound to one kubeconfig
pub struct Kubectl {
    kubeconfig: Option<PathBuf>,
}

impl Kubectl {
    pub fn new(kubeconfig: Option<&Path>) -> Self {
        Self {
            kubeconfig: kubeconfig.map(Path::to_path_buf),
        }
    }

    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("kubectl");
        if let Some(path) = &self.kubeconfig {
            cmd.arg("--kubeconfig").arg(path);
        }
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: kubectl {}", args.join(" "));

        let output = cmd.output().await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CloudError::ToolNotFound("kubectl".to_string()),
            _ => CloudError::Io(e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CloudError::CommandFailed(stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// External address of a LoadBalancer Service; `None` until assigned
    pub async fn service_address(&self, name: &str, namespace: &str) -> Result<Option<String>> {
        let result = self
            .run_command(&["get", "service", name, "--namespace", namespace, "--output", "json"])
            .await;
        match result {
            Ok(output) => parse_service_address(&output),
            Err(CloudError::CommandFailed(msg)) if msg.contains("NotFound") => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// First ingress IP (or hostname) from `kubectl get service -o json`
pub fn parse_service_address(json: &str) -> Result<Option<String>> {
    let doc: ServiceStatusDoc = serde_json::from_str(json)?;
    Ok(doc
        .status
        .load_balancer
        .ingress
        .into_iter()
        .find_map(|i| i.ip.or(i.hostname)))
}
