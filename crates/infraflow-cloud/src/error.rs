//! Resource graph error types

use thiserror::Error;

/// Resource graph and state errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource declared twice: {0}")]
    DuplicateResource(String),

    #[error("Resource {resource} depends on undeclared resource {dependency}")]
    MissingDependency { resource: String, dependency: String },

    #[error("Circular dependency between: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),

    #[error("Output {resource}.{attribute} is not known yet (run `infra refresh` or `infra outputs set`)")]
    PendingOutput { resource: String, attribute: String },

    #[error("Invalid secret path '{0}' (expected a JSON pointer such as /data/password)")]
    InvalidSecretPath(String),

    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("INFRAFLOW_PASSPHRASE is not set; it is required to read or write secrets in state")]
    MissingPassphrase,

    #[error("Secret decryption failed: {0}")]
    Decryption(String),

    #[error("Secret encryption failed: {0}")]
    Encryption(String),

    #[error("Certificate generation failed: {0}")]
    Certificate(#[from] rcgen::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
