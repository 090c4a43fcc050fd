//! Container images built for the stack

use crate::error::{Result, StackError};
use crate::gcp;
use infraflow_build::{ImageRef, stack_images};
use infraflow_cloud::{Provider, Resource, ResourceId};
use infraflow_core::StackConfig;
use serde_json::json;
use std::collections::BTreeMap;

/// Image resources by image name
#[derive(Debug, Clone, Default)]
pub struct Images {
    images: BTreeMap<String, (ResourceId, ImageRef)>,
}

impl Images {
    pub fn id(&self, name: &str) -> Result<&ResourceId> {
        self.images
            .get(name)
            .map(|(id, _)| id)
            .ok_or_else(|| StackError::MissingImage(name.to_string()))
    }

    /// Release tag of the image (`{version}-{hash}` or `latest`)
    pub fn tag(&self, name: &str) -> Result<&str> {
        self.images
            .get(name)
            .map(|(_, image)| image.tag.as_str())
            .ok_or_else(|| StackError::MissingImage(name.to_string()))
    }

    /// Registry-qualified `name:tag`
    pub fn reference(&self, name: &str) -> Result<String> {
        self.images
            .get(name)
            .map(|(_, image)| image.to_string())
            .ok_or_else(|| StackError::MissingImage(name.to_string()))
    }
}

pub fn declare(config: &StackConfig, registry: &ResourceId) -> Result<(Vec<Resource>, Images)> {
    let mut resources = Vec::new();
    let mut images = Images::default();

    for image in stack_images(config)? {
        let resource = Resource::new(
            ResourceId::new(gcp::IMAGE, &image.name),
            Provider::Docker,
            json!({
                "imageName": image.reference.to_string(),
                "context": image.spec.context.display().to_string(),
                "target": image.spec.target,
            }),
        )
        .depends_on(registry.clone());

        images
            .images
            .insert(image.name, (resource.id.clone(), image.reference));
        resources.push(resource);
    }

    Ok((resources, images))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_images() {
        let mut config = StackConfig::new("dev");
        config.project.id = "my-project".to_string();
        config.release.version = Some("1.0.0".to_string());
        config.release.git_hash = Some("abc1234".to_string());
        let registry = ResourceId::new(gcp::ARTIFACT_REGISTRY, "docker");

        let (resources, images) = declare(&config, &registry).unwrap();
        assert_eq!(resources.len(), 2);
        assert!(resources.iter().all(|r| r.depends_on == vec![registry.clone()]));
        assert_eq!(
            images.reference("api").unwrap(),
            "us-docker.pkg.dev/my-project/docker/api:1.0.0-abc1234"
        );
        assert_eq!(resources[0].config["target"], "api");
        assert_eq!(images.tag("migrations").unwrap(), "1.0.0-abc1234");
        assert!(matches!(
            images.id("bench"),
            Err(StackError::MissingImage(_))
        ));
    }
}
