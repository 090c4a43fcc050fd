//! Cloud SQL proxy sidecar

use crate::kube;
use k8s_openapi::api::core::v1::Container;
use std::time::Duration;

pub const CONTAINER_NAME: &str = "cloudsql-proxy";
pub const IMAGE: &str = "gcr.io/cloudsql-docker/gce-proxy:1.28.1";
/// Buster variant ships GNU `timeout --preserve-status`
pub const JOB_IMAGE: &str = "gcr.io/cloudsql-docker/gce-proxy:1.28.1-buster";

/// How a proxy sidecar in a run-to-completion pod shuts itself down
///
/// The proxy is sent SIGTERM after `grace`, then waits up to `drain` for
/// open connections to close before exiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidecarShutdown {
    pub grace: Duration,
    pub drain: Duration,
}

impl Default for SidecarShutdown {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            drain: Duration::from_secs(3600),
        }
    }
}

fn seconds(duration: Duration) -> String {
    format!("{}s", duration.as_secs())
}

fn proxy_args(connection_name: &str, port: u16) -> Vec<String> {
    vec![
        "/cloud_sql_proxy".to_string(),
        format!("-instances={}=tcp:{}", connection_name, port),
        "-enable_iam_login".to_string(),
        "-structured_logs".to_string(),
    ]
}

/// Long-running sidecar; with `health_port` the proxy serves
/// `/liveness` and `/readiness` probes
pub fn sidecar(connection_name: &str, port: u16, health_port: Option<u16>) -> Container {
    let mut command = proxy_args(connection_name, port);
    let mut container = kube::container(CONTAINER_NAME, IMAGE);
    if let Some(health) = health_port {
        command.push("-use_http_health_check".to_string());
        container.liveness_probe = Some(kube::http_probe("/liveness", health, None, None));
        container.readiness_probe = Some(kube::http_probe("/readiness", health, None, None));
    }
    container.command = Some(command);
    container
}

/// Sidecar for a Job: terminates itself so the Job can complete
pub fn job_sidecar(connection_name: &str, port: u16, shutdown: &SidecarShutdown) -> Container {
    let mut command = vec![
        "timeout".to_string(),
        "--preserve-status".to_string(),
        "-s".to_string(),
        "SIGTERM".to_string(),
        seconds(shutdown.grace),
    ];
    command.extend(proxy_args(connection_name, port));
    command.push(format!("-term_timeout={}", seconds(shutdown.drain)));

    let mut container = kube::container(CONTAINER_NAME, JOB_IMAGE);
    container.command = Some(command);
    container
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_sidecar_command() {
        let container = job_sidecar("p:us-central1:web-db", 5432, &SidecarShutdown::default());
        assert_eq!(container.image.as_deref(), Some(JOB_IMAGE));
        assert_eq!(
            container.command.unwrap(),
            vec![
                "timeout",
                "--preserve-status",
                "-s",
                "SIGTERM",
                "30s",
                "/cloud_sql_proxy",
                "-instances=p:us-central1:web-db=tcp:5432",
                "-enable_iam_login",
                "-structured_logs",
                "-term_timeout=3600s",
            ]
        );
    }

    #[test]
    fn test_custom_shutdown_windows() {
        let shutdown = SidecarShutdown {
            grace: Duration::from_secs(45),
            drain: Duration::from_secs(600),
        };
        let command = job_sidecar("c", 5432, &shutdown).command.unwrap();
        assert!(command.contains(&"45s".to_string()));
        assert!(command.contains(&"-term_timeout=600s".to_string()));
    }

    #[test]
    fn test_sidecar_structured_logs_once() {
        let command = sidecar("c", 5432, None).command.unwrap();
        assert_eq!(command.iter().filter(|a| *a == "-structured_logs").count(), 1);
        assert!(!command.contains(&"-use_http_health_check".to_string()));
    }

    #[test]
    fn test_sidecar_health_probes() {
        let container = sidecar("c", 5432, Some(8090));
        assert!(container
            .command
            .unwrap()
            .contains(&"-use_http_health_check".to_string()));
        let readiness = serde_json::to_value(container.readiness_probe.unwrap()).unwrap();
        assert_eq!(readiness["httpGet"]["path"], "/readiness");
        assert_eq!(readiness["httpGet"]["port"], 8090);
    }
}
