//! Kubernetes object builders
//!
//! Objects are built with the typed `k8s-openapi` structs and lowered to
//! JSON resource configs. Every object depends on the cluster's
//! Kubernetes provider resource.

use crate::cluster::ClusterHandle;
use crate::error::{Result, StackError};
use infraflow_cloud::{Provider, Resource, ResourceId, Secret};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, HTTPGetAction, Probe, Secret as KubeSecret,
    SecretKeySelector, Service, ServiceAccount, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Serialize;
use std::collections::BTreeMap;

pub const SERVICE_ACCOUNT: &str = "service-account";
pub const SECRET: &str = "secret";
pub const ROLE: &str = "role";
pub const ROLE_BINDING: &str = "role-binding";
pub const DEPLOYMENT: &str = "deployment";
pub const SERVICE: &str = "service";
pub const JOB: &str = "job";

/// Load-balancer ingress address recorded for a Service
pub const ADDRESS: &str = "address";

/// Annotation binding a Kubernetes SA to a GCP SA through workload identity
pub const WORKLOAD_IDENTITY_ANNOTATION: &str = "iam.gke.io/gcp-service-account";

pub type Labels = BTreeMap<String, String>;

/// `app={name}` pod labels
pub fn app_labels(name: &str) -> Labels {
    BTreeMap::from([("app".to_string(), name.to_string())])
}

pub fn metadata(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

pub fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

/// Env var read from a key of a Secret
pub fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn http_probe(path: &str, port: u16, initial_delay: Option<i32>, period: Option<i32>) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(i32::from(port)),
            ..Default::default()
        }),
        initial_delay_seconds: initial_delay,
        period_seconds: period,
        ..Default::default()
    }
}

/// Lower a typed object into a Kubernetes resource
pub fn object<T: Serialize>(
    kind: &str,
    name: &str,
    object: &T,
    cluster: &ClusterHandle,
) -> Result<Resource> {
    let config = serde_json::to_value(object).map_err(|e| StackError::Serialization {
        kind: kind.to_string(),
        name: name.to_string(),
        message: e.to_string(),
    })?;
    Ok(
        Resource::new(ResourceId::new(kind, name), Provider::Kubernetes, config)
            .depends_on(cluster.provider.clone()),
    )
}

/// Kubernetes SA annotated with the GCP SA it acts as
pub fn workload_service_account(
    name: &str,
    namespace: &str,
    gcp_email: &str,
    cluster: &ClusterHandle,
) -> Result<Resource> {
    let mut meta = metadata(name, namespace);
    meta.annotations = Some(BTreeMap::from([(
        WORKLOAD_IDENTITY_ANNOTATION.to_string(),
        gcp_email.to_string(),
    )]));
    let account = ServiceAccount {
        metadata: meta,
        ..Default::default()
    };
    object(SERVICE_ACCOUNT, name, &account, cluster)
}

/// Secret whose `stringData` mixes public values and secret values
///
/// Secret values are held out of the display config and filled in only
/// when the bundle is materialized.
pub fn secret(
    name: &str,
    namespace: &str,
    type_: &str,
    public: BTreeMap<String, String>,
    secrets: BTreeMap<String, Secret<String>>,
    cluster: &ClusterHandle,
) -> Result<Resource> {
    let mut string_data = public;
    for key in secrets.keys() {
        string_data.insert(key.clone(), Secret::<String>::mask().to_string());
    }
    let object_def = KubeSecret {
        metadata: metadata(name, namespace),
        string_data: Some(string_data),
        type_: Some(type_.to_string()),
        ..Default::default()
    };
    let mut resource = object(SECRET, name, &object_def, cluster)?;
    for (key, value) in secrets {
        resource = resource.with_secret(&format!("/stringData/{}", pointer_escape(&key)), value)?;
    }
    Ok(resource)
}

/// Service routing `port` to `target_port` on pods matching `selector`
pub fn service(
    name: &str,
    namespace: &str,
    type_: &str,
    port: u16,
    target_port: u16,
    selector: &Labels,
    cluster: &ClusterHandle,
) -> Result<Resource> {
    let mut meta = metadata(name, namespace);
    meta.labels = Some(selector.clone());
    let svc = Service {
        metadata: meta,
        spec: Some(ServiceSpec {
            type_: Some(type_.to_string()),
            ports: Some(vec![ServicePort {
                port: i32::from(port),
                target_port: Some(IntOrString::Int(i32::from(target_port))),
                ..Default::default()
            }]),
            selector: Some(selector.clone()),
            ..Default::default()
        }),
        ..Default::default()
    };
    object(SERVICE, name, &svc, cluster)
}

pub fn container(name: &str, image: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        ..Default::default()
    }
}

/// Escape a key for use as one JSON pointer segment
pub fn pointer_escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}
