//! project / identity / network / registry / release ノードのパース

use super::{bool_field, first_string, port_field, string_field};
use crate::error::{InfraError, Result};
use crate::model::StackConfig;
use kdl::KdlNode;

/// project ノードを適用
///
/// ```kdl
/// project "conduit" id="my-gcp-project" region="us-central1"
/// ```
pub fn apply_project(config: &mut StackConfig, node: &KdlNode) -> Result<()> {
    if let Some(name) = first_string(node) {
        config.project.name = name;
    }
    if let Some(id) = string_field(node, "id") {
        config.project.id = id;
    }
    if let Some(region) = string_field(node, "region") {
        config.project.region = region;
    }
    Ok(())
}

pub fn apply_identity(config: &mut StackConfig, node: &KdlNode) -> Result<()> {
    if let Some(sa) = string_field(node, "service-account") {
        config.identity.service_account = sa;
    }
    if let Some(ksa) = string_field(node, "kubernetes-service-account") {
        config.identity.kubernetes_service_account = ksa;
    }
    if let Some(namespace) = string_field(node, "namespace") {
        config.identity.namespace = namespace;
    }
    Ok(())
}

pub fn apply_network(config: &mut StackConfig, node: &KdlNode) -> Result<()> {
    let network = &mut config.network;
    if let Some(port) = port_field(node, "app-port")? {
        network.app_port = port;
    }
    if let Some(port) = port_field(node, "proxy-port")? {
        network.proxy_port = port;
    }
    if let Some(port) = port_field(node, "proxy-health-port")? {
        network.proxy_health_port = port;
    }
    if let Some(port) = port_field(node, "embedded-port")? {
        network.embedded_port = port;
    }
    if let Some(port) = port_field(node, "public-port")? {
        network.public_port = port;
    }
    Ok(())
}

pub fn apply_registry(config: &mut StackConfig, node: &KdlNode) -> Result<()> {
    if let Some(host) = string_field(node, "host") {
        if host.contains('/') {
            return Err(InfraError::InvalidConfig(format!(
                "registry host must not contain a path: {}",
                host
            )));
        }
        config.registry.host = host;
    }
    if let Some(repository) = string_field(node, "repository").or_else(|| first_string(node)) {
        config.registry.repository = repository;
    }
    Ok(())
}

/// release ノードを適用
///
/// ```kdl
/// release version="1.2.0" git-hash="abc1234" log-level="DEBUG"
/// ```
pub fn apply_release(config: &mut StackConfig, node: &KdlNode) -> Result<()> {
    if let Some(version) = string_field(node, "version") {
        config.release.version = Some(version);
    }
    if let Some(hash) = string_field(node, "git-hash") {
        config.release.git_hash = Some(hash);
    }
    if let Some(level) = string_field(node, "log-level") {
        config.release.log_level = level.to_uppercase();
    }
    // debug=#true は log-level="DEBUG" の省略形
    if bool_field(node, "debug") == Some(true) {
        config.release.log_level = "DEBUG".to_string();
    }
    Ok(())
}
