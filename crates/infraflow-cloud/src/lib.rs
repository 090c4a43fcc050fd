//! infraflow Cloud Resource Graph
//!
//! This crate holds the engine-facing side of infraflow: typed desired-state
//! resources, the dependency graph between them, the plan diff against the
//! last recorded snapshot, and the per-stack state file.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  infra CLI                       │
//! │          (preview / up / refresh / destroy)      │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               infraflow-cloud                    │
//! │  ┌──────────────┐  ┌──────────────────────────┐ │
//! │  │ Output/Secret│  │ Resource / ResourceGraph │ │
//! │  └──────────────┘  └──────────────────────────┘ │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │  Plan diff   │  │  State Mgmt  │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │    gcloud     │ │    kubectl    │
//! │  (read only)  │ │  (read only)  │
//! └───────────────┘ └───────────────┘
//! ```

pub mod action;
pub mod cipher;
pub mod error;
pub mod gcloud;
pub mod generate;
pub mod graph;
pub mod kubectl;
pub mod output;
pub mod resource;
pub mod secret;
pub mod state;

// Re-exports
pub use action::{Action, ActionType, DeferredResource, Plan, PlanSummary};
pub use cipher::SecretCipher;
pub use error::{CloudError, Result};
pub use gcloud::{ClusterInfo, Gcloud};
pub use generate::{CertificateMaterial, PasswordPolicy, SecretVault};
pub use graph::ResourceGraph;
pub use kubectl::Kubectl;
pub use output::{Output, PendingOutput, lookup_output};
pub use resource::{Provider, Resource, ResourceId};
pub use secret::Secret;
pub use state::{ResourceRecord, StackState, StateLock, StateManager};
