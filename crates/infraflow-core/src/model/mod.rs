//! スタックのデータモデル

mod database;
mod identity;
mod project;
mod stack;
mod workload;

pub use database::{Availability, DatabaseConfig};
pub use identity::{IdentityConfig, NetworkConfig};
pub use project::{ProjectConfig, RegistryConfig, ReleaseConfig};
pub use stack::StackConfig;
pub use workload::{AppConfig, ImageSpec, ProcessModel, ServerVariant, Topology};
