//! Composition entry point
//!
//! [`compose`] turns a resolved [`StackConfig`] into the desired-state
//! resources for one stack. Generated material and recorded provider
//! outputs come in through [`ComposeInputs`] so composing is a pure
//! function of its inputs.

use crate::app::{self, Workloads};
use crate::bench;
use crate::cluster;
use crate::database;
use crate::embedded::{self, EmbeddedMaterial};
use crate::error::Result;
use crate::identity;
use crate::images;
use crate::kube;
use crate::proxy::SidecarShutdown;
use crate::registry;
use infraflow_cloud::{
    CertificateMaterial, DeferredResource, Output, PasswordPolicy, Resource, ResourceGraph,
    ResourceId, Secret, SecretVault, lookup_output,
};
use infraflow_core::{StackConfig, Topology};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const TOKEN_SIGNING_KEY: &str = "token-signing-key";

/// Secrets generated once per stack and reused on every run
#[derive(Debug, Clone)]
pub struct GeneratedMaterial {
    pub db_password: Secret<String>,
    pub token_signing_key: Secret<String>,
    pub embedded: Option<EmbeddedMaterial>,
}

impl GeneratedMaterial {
    /// Load from (or generate into) the stack's vault
    pub fn generate(
        config: &StackConfig,
        vault: &mut SecretVault,
    ) -> infraflow_cloud::Result<Self> {
        let db_password = vault.password(
            database::PASSWORD_KEY,
            &PasswordPolicy::lower_digits_special(16),
        )?;
        let token_signing_key =
            vault.password(TOKEN_SIGNING_KEY, &PasswordPolicy::alphanumeric(16))?;

        let embedded = if config.embedded_database {
            let password =
                vault.password(embedded::PASSWORD_KEY, &PasswordPolicy::alphanumeric(8))?;
            let certificate: CertificateMaterial = vault.certificate(
                embedded::CERTIFICATE_KEY,
                embedded::NAME,
                &embedded::subject_alt_names(&config.identity.namespace),
            )?;
            Some(EmbeddedMaterial {
                password,
                certificate,
            })
        } else {
            None
        };

        Ok(Self {
            db_password,
            token_signing_key,
            embedded,
        })
    }
}

/// Everything [`compose`] needs besides the stack configuration
#[derive(Debug, Clone)]
pub struct ComposeInputs {
    pub material: GeneratedMaterial,
    /// Provider outputs recorded in state (`kind/name.attribute` keys)
    pub outputs: BTreeMap<String, serde_json::Value>,
    pub shutdown: SidecarShutdown,
}

impl ComposeInputs {
    pub fn new(material: GeneratedMaterial, outputs: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            material,
            outputs,
            shutdown: SidecarShutdown::default(),
        }
    }

    pub fn output(&self, resource: &str, attribute: &str) -> Output<String> {
        lookup_output(&self.outputs, resource, attribute)
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::new(
            GeneratedMaterial {
                db_password: Secret::new("db-pa$$word-0001".to_string()),
                token_signing_key: Secret::new("TokenSigningKey1".to_string()),
                embedded: None,
            },
            BTreeMap::new(),
        )
    }
}

/// The desired state of one stack
#[derive(Debug, Clone)]
pub struct Composition {
    pub resources: Vec<Resource>,
    /// Resources held back until a provider output is known
    pub deferred: Vec<DeferredResource>,
    /// Externally reachable addresses, keyed by Service name
    pub exports: BTreeMap<String, Output<String>>,
    pub kubeconfig: Output<String>,
}

impl Composition {
    fn new(kubeconfig: Output<String>) -> Self {
        Self {
            resources: Vec::new(),
            deferred: Vec::new(),
            exports: BTreeMap::new(),
            kubeconfig,
        }
    }

    pub(crate) fn push(&mut self, resource: Resource) {
        debug!(resource = %resource.id, "Declared resource");
        self.resources.push(resource);
    }

    pub(crate) fn extend(&mut self, resources: impl IntoIterator<Item = Resource>) {
        for resource in resources {
            self.push(resource);
        }
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.iter().find(|r| &r.id == id)
    }

    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources.iter().filter(move |r| r.id.kind == kind)
    }

    /// Services of type LoadBalancer whose addresses `refresh` records
    pub fn load_balancers(&self) -> Vec<ResourceId> {
        self.of_kind(kube::SERVICE)
            .filter(|r| r.config["spec"]["type"] == "LoadBalancer")
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn graph(&self) -> infraflow_cloud::Result<ResourceGraph> {
        self.clone().into_graph()
    }

    pub fn into_graph(self) -> infraflow_cloud::Result<ResourceGraph> {
        let mut graph = ResourceGraph::new();
        for resource in self.resources {
            graph.insert(resource)?;
        }
        graph.validate()?;
        Ok(graph)
    }
}

/// Compose the stack's resources
pub fn compose(config: &StackConfig, inputs: &ComposeInputs) -> Result<Composition> {
    info!(stack = %config.stack(), topology = %config.topology, "Composing stack");

    let (cluster_resources, cluster) = cluster::provision(config, inputs);
    let mut composition = Composition::new(cluster.kubeconfig.clone());
    composition.extend(cluster_resources);

    let registry = registry::repository(config);
    let registry_id = registry.id.clone();
    composition.push(registry);

    let (identity_resources, identity) = identity::declare(config, &cluster);
    composition.extend(identity_resources);

    let (db_resources, database) =
        database::provision(config, &identity, &inputs.material.db_password)?;
    composition.extend(db_resources);

    let (image_resources, images) = images::declare(config, &registry_id)?;
    composition.extend(image_resources);

    let embedded = match &inputs.material.embedded {
        Some(material) if config.embedded_database => {
            let (resources, handle) =
                embedded::provision(config, &cluster, &identity, &database, material)?;
            composition.extend(resources);
            Some(handle)
        }
        _ => None,
    };

    let workloads = Workloads {
        config,
        cluster: &cluster,
        identity: &identity,
        database: &database,
        images: &images,
        embedded: embedded.as_ref(),
        shutdown: inputs.shutdown,
    };
    app::service_account(&workloads, &mut composition)?;
    match config.topology {
        Topology::App => app::compose(
            &workloads,
            &inputs.material.token_signing_key,
            inputs,
            &mut composition,
        )?,
        Topology::Bench => bench::compose(&workloads, inputs, &mut composition)?,
    }

    info!(
        resources = composition.resources.len(),
        deferred = composition.deferred.len(),
        "Composition complete"
    );
    Ok(composition)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StackConfig {
        let mut config = StackConfig::new("dev");
        config.project.id = "my-project".to_string();
        config
    }

    #[test]
    fn test_generate_material_is_stable() {
        let config = config();
        let cipher = infraflow_cloud::SecretCipher::from_passphrase("pass");
        let mut vault = SecretVault::new(cipher, BTreeMap::new());
        let first = GeneratedMaterial::generate(&config, &mut vault).unwrap();
        let entries = vault.into_entries();

        let cipher = infraflow_cloud::SecretCipher::from_passphrase("pass");
        let mut vault = SecretVault::new(cipher, entries);
        let second = GeneratedMaterial::generate(&config, &mut vault).unwrap();

        assert_eq!(first.db_password.expose(), second.db_password.expose());
        assert_eq!(
            first.token_signing_key.expose(),
            second.token_signing_key.expose()
        );
        assert!(vault.generated().is_empty());
        assert!(second.embedded.is_none());
    }

    #[test]
    fn test_generate_embedded_material() {
        let mut config = config();
        config.embedded_database = true;
        let material = GeneratedMaterial::generate(&config, &mut SecretVault::ephemeral()).unwrap();

        let embedded = material.embedded.unwrap();
        assert_eq!(embedded.password.expose().len(), 8);
        assert!(embedded.certificate.certificate_pem.contains("BEGIN CERTIFICATE"));
    }

    #[test]
    fn test_compose_graph_is_valid() {
        let composition = compose(&config(), &ComposeInputs::for_tests()).unwrap();
        let graph = composition.graph().unwrap();
        assert_eq!(graph.len(), composition.resources.len());
        assert!(graph.topological_order().is_ok());
        assert!(composition.deferred.is_empty());
        assert!(!composition.kubeconfig.is_known());
    }

    #[test]
    fn test_bench_topology_replaces_api_workloads() {
        let mut config = config();
        config.topology = Topology::Bench;
        let composition = compose(&config, &ComposeInputs::for_tests()).unwrap();

        assert!(composition.get(&ResourceId::new(kube::DEPLOYMENT, "app")).is_none());
        assert!(composition.get(&ResourceId::new(kube::SERVICE, "app")).is_none());
        assert_eq!(composition.of_kind(kube::JOB).count(), 0);
        assert!(!composition.exports.contains_key("app"));
        assert!(composition
            .get(&ResourceId::new(kube::SERVICE_ACCOUNT, "app"))
            .is_some());
        assert_eq!(
            composition.load_balancers(),
            vec![
                ResourceId::new(kube::SERVICE, "gunicorn-service"),
                ResourceId::new(kube::SERVICE, "uvicorn-service"),
            ]
        );
        assert!(composition.graph().is_ok());
    }

    #[test]
    fn test_new_release_gets_new_migration_job() {
        let release = |version: &str| {
            let mut config = config();
            config.release.version = Some(version.to_string());
            config.release.git_hash = Some("abc1234".to_string());
            compose(&config, &ComposeInputs::for_tests()).unwrap()
        };
        let job_ids = |composition: &Composition| {
            composition
                .of_kind(kube::JOB)
                .map(|r| r.id.clone())
                .collect::<Vec<_>>()
        };

        let first = release("1.0.0");
        let second = release("2.0.0");
        assert_eq!(job_ids(&first), vec![ResourceId::new(kube::JOB, "migrations-1-0-0-abc1234")]);
        assert_eq!(job_ids(&second), vec![ResourceId::new(kube::JOB, "migrations-2-0-0-abc1234")]);

        // API waits for its own release's migrations
        let deployment = second
            .get(&ResourceId::new(kube::DEPLOYMENT, "app"))
            .unwrap();
        assert!(deployment.depends_on.contains(&job_ids(&second)[0]));
        assert!(!deployment.depends_on.contains(&job_ids(&first)[0]));

        // recorded job is replaced, never updated in place
        let mut state = infraflow_cloud::StackState::new();
        state.record_graph(&first.graph().unwrap()).unwrap();
        let plan = infraflow_cloud::Plan::diff(&second.graph().unwrap(), &state, Vec::new()).unwrap();
        let ids = |action_type| {
            plan.actions_by_type(action_type)
                .iter()
                .map(|a| a.resource_id.clone())
                .collect::<Vec<_>>()
        };
        assert!(ids(infraflow_cloud::ActionType::Create).contains(&job_ids(&second)[0]));
        assert!(ids(infraflow_cloud::ActionType::Delete).contains(&job_ids(&first)[0]));
        assert!(!ids(infraflow_cloud::ActionType::Update).iter().any(|id| id.kind == kube::JOB));
    }

    #[test]
    fn test_load_balancers() {
        let composition = compose(&config(), &ComposeInputs::for_tests()).unwrap();
        assert_eq!(
            composition.load_balancers(),
            vec![ResourceId::new(kube::SERVICE, "app")]
        );
    }
}
