//! Composition error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error(transparent)]
    Cloud(#[from] infraflow_cloud::CloudError),

    #[error(transparent)]
    Build(#[from] infraflow_build::BuildError),

    #[error(transparent)]
    Config(#[from] infraflow_core::InfraError),

    #[error("Image '{0}' is not declared for this stack")]
    MissingImage(String),

    #[error("Topology '{topology}' requires {requirement}")]
    Topology {
        topology: String,
        requirement: String,
    },

    #[error("Failed to serialize {kind} '{name}': {message}")]
    Serialization {
        kind: String,
        name: String,
        message: String,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StackError>;
