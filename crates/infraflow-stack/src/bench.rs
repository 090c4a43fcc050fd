//! Benchmark topology: one public server per variant plus a load driver
//!
//! The load driver needs the external address of every variant Service.
//! Until those are recorded it is deferred rather than declared.

use crate::app::Workloads;
use crate::composition::{ComposeInputs, Composition};
use crate::error::{Result, StackError};
use crate::kube;
use infraflow_cloud::{DeferredResource, Output, ResourceId, output};
use infraflow_core::ServerVariant;
use k8s_openapi::api::core::v1::{ContainerPort, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;
use tracing::info;

pub const BENCH_NAME: &str = "bench";
pub const BENCH_SERVICE: &str = "bench-service";
/// Port the load driver listens on
pub const BENCH_PORT: u16 = 80;

pub fn deployment_name(variant: &ServerVariant) -> String {
    format!("{}-deployment", variant.name)
}

pub fn service_name(variant: &ServerVariant) -> String {
    format!("{}-service", variant.name)
}

pub fn compose(
    workloads: &Workloads<'_>,
    inputs: &ComposeInputs,
    composition: &mut Composition,
) -> Result<()> {
    let config = workloads.config;
    let variants = config.server_variants();
    if variants.is_empty() {
        return Err(StackError::Topology {
            topology: config.topology.to_string(),
            requirement: "at least one server variant".to_string(),
        });
    }

    let mut hosts = Vec::with_capacity(variants.len());
    for variant in &variants {
        let address = variant_server(workloads, variant, inputs, composition)?;
        hosts.push(address.map(|address| (variant.host_env_name(), format!("http://{}", address))));
    }

    let bench_id = ResourceId::new(kube::DEPLOYMENT, BENCH_NAME);
    let service_id = ResourceId::new(kube::SERVICE, BENCH_SERVICE);
    match output::all(hosts) {
        Output::Known(hosts) => load_driver(workloads, &hosts, &variants, inputs, composition),
        Output::Pending(waiting_on) => {
            info!(
                resource = %bench_id,
                waiting_on = %waiting_on,
                "Deferring load driver until variant addresses are known"
            );
            for id in [bench_id, service_id] {
                composition.deferred.push(DeferredResource {
                    id,
                    waiting_on: waiting_on.clone(),
                });
            }
            Ok(())
        }
    }
}

/// Declare one variant's Deployment and LoadBalancer; returns its address
fn variant_server(
    workloads: &Workloads<'_>,
    variant: &ServerVariant,
    inputs: &ComposeInputs,
    composition: &mut Composition,
) -> Result<Output<String>> {
    let config = workloads.config;
    let ns = &config.identity.namespace;
    let port = config.network.app_port;
    let labels = kube::app_labels(&variant.name);

    let mut container = kube::container(&variant.name, &workloads.images.reference(&variant.name)?);
    let mut env = vec![
        kube::env("APP_PORT", port.to_string()),
        kube::env("APP_HOST", "0.0.0.0"),
        kube::env("PROCESS_MODEL", variant.process_model.as_str()),
    ];
    env.extend(workloads.release_env(&variant.name));
    container.env = Some(env);
    container.ports = Some(vec![ContainerPort {
        container_port: i32::from(port),
        ..Default::default()
    }]);
    container.resources = Some(ResourceRequirements {
        requests: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity(variant.cpu.clone())),
            ("memory".to_string(), Quantity(variant.memory.clone())),
        ])),
        ..Default::default()
    });

    let name = deployment_name(variant);
    let deployment = kube::object(
        kube::DEPLOYMENT,
        &name,
        &workloads.deployment(&name, &labels, variant.replicas, vec![container]),
        workloads.cluster,
    )?
    .depends_on(workloads.images.id(&variant.name)?.clone())
    .depends_on(workloads.ksa_id());
    let deployment_id = deployment.id.clone();
    composition.push(deployment);

    let public_name = service_name(variant);
    let service = kube::service(
        &public_name,
        ns,
        "LoadBalancer",
        config.network.public_port,
        port,
        &labels,
        workloads.cluster,
    )?
    .depends_on(deployment_id);
    let address = inputs.output(&service.id.to_string(), kube::ADDRESS);
    composition.push(service);
    composition.exports.insert(public_name, address.clone());

    Ok(address)
}

fn load_driver(
    workloads: &Workloads<'_>,
    hosts: &[(String, String)],
    variants: &[ServerVariant],
    inputs: &ComposeInputs,
    composition: &mut Composition,
) -> Result<()> {
    let config = workloads.config;
    let labels = kube::app_labels(BENCH_NAME);

    let mut container = kube::container(BENCH_NAME, &workloads.images.reference(BENCH_NAME)?);
    let mut env: Vec<_> = hosts
        .iter()
        .map(|(name, url)| kube::env(name, url.clone()))
        .collect();
    env.extend(workloads.release_env(BENCH_NAME));
    container.env = Some(env);
    container.ports = Some(vec![ContainerPort {
        container_port: i32::from(BENCH_PORT),
        ..Default::default()
    }]);

    let deployment = kube::object(
        kube::DEPLOYMENT,
        BENCH_NAME,
        &workloads.deployment(BENCH_NAME, &labels, 1, vec![container]),
        workloads.cluster,
    )?
    .depends_on(workloads.images.id(BENCH_NAME)?.clone())
    .depends_on(workloads.ksa_id())
    .depends_on_all(
        variants
            .iter()
            .map(|v| ResourceId::new(kube::SERVICE, service_name(v))),
    );
    let deployment_id = deployment.id.clone();
    composition.push(deployment);

    let service = kube::service(
        BENCH_SERVICE,
        &config.identity.namespace,
        "LoadBalancer",
        config.network.public_port,
        BENCH_PORT,
        &labels,
        workloads.cluster,
    )?
    .depends_on(deployment_id);
    let address = inputs.output(&service.id.to_string(), kube::ADDRESS);
    composition.push(service);
    composition.exports.insert(BENCH_SERVICE.to_string(), address);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::compose;
    use infraflow_core::{StackConfig, Topology};
    use serde_json::json;

    fn config() -> StackConfig {
        let mut config = StackConfig::new("bench");
        config.project.id = "my-project".to_string();
        config.topology = Topology::Bench;
        config
    }

    #[test]
    fn test_variant_servers() {
        let composition = compose(&config(), &ComposeInputs::for_tests()).unwrap();

        let gunicorn = composition
            .get(&ResourceId::new(kube::DEPLOYMENT, "gunicorn-deployment"))
            .unwrap();
        assert_eq!(gunicorn.config["spec"]["replicas"], 1);
        let container = &gunicorn.config["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["resources"]["requests"]["cpu"], "4");
        assert_eq!(container["resources"]["requests"]["memory"], "4Gi");

        let uvicorn = composition
            .get(&ResourceId::new(kube::DEPLOYMENT, "uvicorn-deployment"))
            .unwrap();
        assert_eq!(uvicorn.config["spec"]["replicas"], 4);

        assert!(composition
            .get(&ResourceId::new(kube::SERVICE, "gunicorn-service"))
            .is_some());
        assert!(composition.exports.contains_key("uvicorn-service"));
    }

    #[test]
    fn test_load_driver_deferred_until_addresses_known() {
        let composition = compose(&config(), &ComposeInputs::for_tests()).unwrap();

        assert!(composition
            .get(&ResourceId::new(kube::DEPLOYMENT, BENCH_NAME))
            .is_none());
        let deferred: Vec<_> = composition.deferred.iter().map(|d| d.id.to_string()).collect();
        assert_eq!(deferred, vec!["deployment/bench", "service/bench-service"]);
        assert_eq!(
            composition.deferred[0].waiting_on.key(),
            "service/gunicorn-service.address"
        );
    }

    #[test]
    fn test_load_driver_declared_with_addresses() {
        let mut inputs = ComposeInputs::for_tests();
        inputs.outputs = BTreeMap::from([
            ("service/gunicorn-service.address".to_string(), json!("34.0.0.1")),
            ("service/uvicorn-service.address".to_string(), json!("34.0.0.2")),
        ]);
        let composition = compose(&config(), &inputs).unwrap();

        assert!(composition.deferred.is_empty());
        let bench = composition
            .get(&ResourceId::new(kube::DEPLOYMENT, BENCH_NAME))
            .unwrap();
        let env = &bench.config["spec"]["template"]["spec"]["containers"][0]["env"];
        assert_eq!(env[0], json!({ "name": "GUNICORN_HOST", "value": "http://34.0.0.1" }));
        assert_eq!(env[1], json!({ "name": "UVICORN_HOST", "value": "http://34.0.0.2" }));

        let service = composition
            .get(&ResourceId::new(kube::SERVICE, BENCH_SERVICE))
            .unwrap();
        assert_eq!(service.config["spec"]["selector"]["app"], "bench");
        assert_eq!(
            composition.exports["gunicorn-service"].value().map(String::as_str),
            Some("34.0.0.1")
        );
    }

    #[test]
    fn test_no_service_name_collision() {
        let mut inputs = ComposeInputs::for_tests();
        inputs.outputs = BTreeMap::from([
            ("service/gunicorn-service.address".to_string(), json!("a")),
            ("service/uvicorn-service.address".to_string(), json!("b")),
        ]);
        let composition = compose(&config(), &inputs).unwrap();
        assert!(composition.into_graph().is_ok());
    }
}
