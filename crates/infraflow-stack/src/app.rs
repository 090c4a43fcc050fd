//! API workload, its migration job and the public Service

use crate::cluster::ClusterHandle;
use crate::composition::{ComposeInputs, Composition, TOKEN_SIGNING_KEY};
use crate::database::Database;
use crate::embedded::{self, EmbeddedDatabase};
use crate::error::Result;
use crate::gcp;
use crate::identity::Identity;
use crate::images::Images;
use crate::kube::{self, Labels};
use crate::proxy::{self, SidecarShutdown};
use infraflow_cloud::{ResourceId, Secret};
use infraflow_core::StackConfig;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use serde_json::json;
use std::collections::BTreeMap;

pub const API_IMAGE: &str = "api";
pub const MIGRATIONS_IMAGE: &str = "migrations";
pub const DEPLOYMENT_NAME: &str = "app";
pub const SERVICE_NAME: &str = "app";
/// Container and `SERVICE_NAME` of the migration job
pub const JOB_NAME: &str = "migrations";

/// DNS-1123 label limit
const MAX_NAME_LEN: usize = 63;

/// `migrations-{tag}`: one Job per migrations image tag
///
/// Job pod templates are immutable, so a new release gets a new Job.
pub fn job_name(tag: &str) -> String {
    let mut name = String::with_capacity(JOB_NAME.len() + 1 + tag.len());
    name.push_str(JOB_NAME);
    name.push('-');
    for c in tag.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            name.push(c);
        } else if !name.ends_with('-') {
            name.push('-');
        }
    }
    name.truncate(MAX_NAME_LEN);
    name.trim_end_matches('-').to_string()
}

/// Handles shared by every workload in the stack
pub struct Workloads<'a> {
    pub config: &'a StackConfig,
    pub cluster: &'a ClusterHandle,
    pub identity: &'a Identity,
    pub database: &'a Database,
    pub images: &'a Images,
    pub embedded: Option<&'a EmbeddedDatabase>,
    pub shutdown: SidecarShutdown,
}

impl Workloads<'_> {
    fn namespace(&self) -> &str {
        &self.config.identity.namespace
    }

    pub(crate) fn ksa_id(&self) -> ResourceId {
        ResourceId::new(
            kube::SERVICE_ACCOUNT,
            &self.config.identity.kubernetes_service_account,
        )
    }

    fn version(&self) -> String {
        self.config
            .release
            .version
            .clone()
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// `VERSION`, `ENV`, `SERVICE_NAME`
    pub(crate) fn release_env(&self, service_name: &str) -> Vec<EnvVar> {
        vec![
            kube::env("VERSION", self.version()),
            kube::env("ENV", self.config.stack()),
            kube::env("SERVICE_NAME", service_name),
        ]
    }

    /// Connection settings for the proxy sidecar on localhost
    fn database_env(&self) -> Vec<EnvVar> {
        vec![
            kube::env("DB_HOST", "localhost"),
            kube::env("DB_PORT", self.config.network.proxy_port.to_string()),
            kube::env("DB_USERNAME", &self.database.user_name),
            kube::env("DB_DATABASE_NAME", &self.database.database_name),
        ]
    }

    /// Deployment with one set of pod labels used for both selector and template
    pub(crate) fn deployment(
        &self,
        name: &str,
        labels: &Labels,
        replicas: i32,
        containers: Vec<Container>,
    ) -> Deployment {
        let mut metadata = kube::metadata(name, self.namespace());
        metadata.labels = Some(labels.clone());
        Deployment {
            metadata,
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                selector: LabelSelector {
                    match_labels: Some(labels.clone()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels.clone()),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers,
                        service_account_name: Some(
                            self.config.identity.kubernetes_service_account.clone(),
                        ),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Kubernetes service account bound to the GCP identity, shared by every topology
pub fn service_account(workloads: &Workloads<'_>, composition: &mut Composition) -> Result<()> {
    let config = workloads.config;
    let ksa = kube::workload_service_account(
        &config.identity.kubernetes_service_account,
        workloads.namespace(),
        &workloads.identity.email,
        workloads.cluster,
    )?
    .depends_on_all(workloads.identity.bindings.iter().cloned());
    composition.push(ksa);
    Ok(())
}

/// Signing key, migration job, API Deployment and its LoadBalancer
pub fn compose(
    workloads: &Workloads<'_>,
    token_signing_key: &Secret<String>,
    inputs: &ComposeInputs,
    composition: &mut Composition,
) -> Result<()> {
    let config = workloads.config;
    let ns = workloads.namespace();
    let cluster = workloads.cluster;
    let ksa_id = workloads.ksa_id();

    let key_material = gcp::generated(
        gcp::RANDOM_PASSWORD,
        TOKEN_SIGNING_KEY,
        json!({ "length": 16, "special": false }),
    );
    let signing_secret = kube::secret(
        TOKEN_SIGNING_KEY,
        ns,
        "Opaque",
        BTreeMap::new(),
        BTreeMap::from([("key".to_string(), token_signing_key.clone())]),
        cluster,
    )?
    .depends_on(key_material.id.clone());
    let signing_secret_id = signing_secret.id.clone();
    composition.push(key_material);
    composition.push(signing_secret);

    let job = migration_job(workloads)?;
    let job_id = job.id.clone();
    composition.push(job);

    let labels = kube::app_labels(DEPLOYMENT_NAME);
    let containers = vec![
        proxy::sidecar(
            &workloads.database.connection_name,
            config.network.proxy_port,
            None,
        ),
        api_container(workloads)?,
    ];
    let mut deployment = kube::object(
        kube::DEPLOYMENT,
        DEPLOYMENT_NAME,
        &workloads.deployment(DEPLOYMENT_NAME, &labels, config.app.replicas, containers),
        cluster,
    )?
    .depends_on(workloads.images.id(API_IMAGE)?.clone())
    .depends_on(job_id)
    .depends_on(ksa_id)
    .depends_on(signing_secret_id);
    if let Some(embedded) = workloads.embedded {
        deployment = deployment
            .depends_on(embedded.service.clone())
            .depends_on(embedded.certificate_secret.clone());
    }
    let deployment_id = deployment.id.clone();
    composition.push(deployment);

    let service = kube::service(
        SERVICE_NAME,
        ns,
        "LoadBalancer",
        config.network.public_port,
        config.network.app_port,
        &labels,
        cluster,
    )?
    .depends_on(deployment_id);
    let address = inputs.output(&service.id.to_string(), kube::ADDRESS);
    composition.push(service);
    composition.exports.insert(SERVICE_NAME.to_string(), address);

    Ok(())
}

/// Run-to-completion migrations with a self-terminating proxy sidecar
fn migration_job(workloads: &Workloads<'_>) -> Result<infraflow_cloud::Resource> {
    let config = workloads.config;

    let mut migrations = kube::container(
        JOB_NAME,
        &workloads.images.reference(MIGRATIONS_IMAGE)?,
    );
    migrations.image_pull_policy = Some("IfNotPresent".to_string());
    let mut env = workloads.database_env();
    env.extend(workloads.release_env(JOB_NAME));
    migrations.env = Some(env);

    let name = job_name(workloads.images.tag(MIGRATIONS_IMAGE)?);
    let job = Job {
        metadata: kube::metadata(&name, workloads.namespace()),
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    containers: vec![
                        proxy::job_sidecar(
                            &workloads.database.connection_name,
                            config.network.proxy_port,
                            &workloads.shutdown,
                        ),
                        migrations,
                    ],
                    restart_policy: Some("Never".to_string()),
                    service_account_name: Some(config.identity.kubernetes_service_account.clone()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };

    Ok(kube::object(kube::JOB, &name, &job, workloads.cluster)?
        .depends_on(workloads.images.id(MIGRATIONS_IMAGE)?.clone())
        .depends_on(workloads.images.id(API_IMAGE)?.clone())
        .depends_on(workloads.ksa_id())
        .depends_on_all(workloads.database.dependencies()))
}

fn api_container(workloads: &Workloads<'_>) -> Result<Container> {
    let config = workloads.config;
    let port = config.network.app_port;

    let mut env = vec![
        kube::env("LOG_LEVEL", &config.release.log_level),
        kube::env("APP_PORT", port.to_string()),
        kube::env("APP_HOST", "0.0.0.0"),
    ];
    env.extend(workloads.release_env(API_IMAGE));
    env.extend(workloads.database_env());
    env.push(kube::secret_env("TOKEN_SIGNING_KEY", TOKEN_SIGNING_KEY, "key"));
    if let Some(embedded) = workloads.embedded {
        env.push(kube::env("EDGEDB_HOST", &embedded.host));
        env.push(kube::env("EDGEDB_PORT", embedded.port.to_string()));
        env.push(kube::secret_env(
            "EDGEDB_TLS_CA",
            embedded::CERTIFICATE_SECRET,
            embedded::TLS_CERT,
        ));
    }

    let mut container = kube::container(DEPLOYMENT_NAME, &workloads.images.reference(API_IMAGE)?);
    container.env = Some(env);
    container.ports = Some(vec![ContainerPort {
        container_port: i32::from(port),
        ..Default::default()
    }]);
    container.liveness_probe = Some(kube::http_probe("/health", port, Some(15), Some(10)));
    Ok(container)
}
