//! Artifact Registry repository

use crate::gcp;
use infraflow_cloud::{Resource, ResourceId};
use infraflow_core::StackConfig;
use serde_json::json;

/// Docker-format repository in the registry host's multi-region
pub fn repository(config: &StackConfig) -> Resource {
    gcp::resource(
        gcp::ARTIFACT_REGISTRY,
        &config.registry.repository,
        json!({
            "project": config.project.id,
            "location": config.registry.location(),
            "repositoryId": config.registry.repository,
            "format": "DOCKER",
        }),
    )
}

pub fn repository_id(config: &StackConfig) -> ResourceId {
    ResourceId::new(gcp::ARTIFACT_REGISTRY, &config.registry.repository)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_location() {
        let mut config = StackConfig::new("dev");
        config.project.id = "my-project".to_string();
        config.registry.host = "europe-docker.pkg.dev".to_string();

        let repo = repository(&config);
        assert_eq!(repo.id, repository_id(&config));
        assert_eq!(repo.config["location"], "europe");
        assert_eq!(repo.config["format"], "DOCKER");
    }
}
