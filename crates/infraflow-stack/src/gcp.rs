//! GCP resource descriptors

use infraflow_cloud::{Provider, Resource, ResourceId};
use serde_json::Value;

pub const SERVICE_ACCOUNT: &str = "gcp-service-account";
pub const IAM_MEMBER: &str = "gcp-iam-member";
pub const ARTIFACT_REGISTRY: &str = "artifact-registry";
pub const CLUSTER: &str = "gke-cluster";
pub const SQL_INSTANCE: &str = "sql-instance";
pub const SQL_DATABASE: &str = "sql-database";
pub const SQL_USER: &str = "sql-user";

/// Locally generated material
pub const RANDOM_PASSWORD: &str = "random-password";
pub const TLS_CERTIFICATE: &str = "tls-certificate";

/// Container image built and pushed before the workloads roll out
pub const IMAGE: &str = "image";

pub fn resource(kind: &str, name: &str, config: Value) -> Resource {
    Resource::new(ResourceId::new(kind, name), Provider::Gcp, config)
}

pub fn generated(kind: &str, name: &str, config: Value) -> Resource {
    Resource::new(ResourceId::new(kind, name), Provider::Generated, config)
}
