//! infraflow Stack Composition
//!
//! Turns a loaded [`infraflow_core::StackConfig`] into the desired-state
//! resource graph for one stack: service identity, image registry, GKE
//! cluster and kubeconfig, Cloud SQL, the optional in-cluster EdgeDB, and
//! the application or benchmark workloads on top.
//!
//! ```text
//! identity ─┐
//! registry ─┼─> database ─> embedded db ─> app / bench workloads
//! cluster ──┘
//! ```
//!
//! [`compose`] builds a [`Composition`], [`check`] runs structural checks
//! over it and [`Bundle`] renders it for the orchestration engine.

pub mod app;
pub mod bench;
pub mod checks;
pub mod cluster;
pub mod composition;
pub mod database;
pub mod embedded;
pub mod error;
pub mod gcp;
pub mod identity;
pub mod images;
pub mod kube;
pub mod proxy;
pub mod registry;
pub mod render;

pub use checks::{Check, CheckReport, CheckResult, CheckStatus, check};
pub use cluster::ClusterHandle;
pub use composition::{ComposeInputs, Composition, GeneratedMaterial, compose};
pub use database::SqlUserType;
pub use embedded::EmbeddedMaterial;
pub use error::{Result, StackError};
pub use proxy::SidecarShutdown;
pub use render::Bundle;
