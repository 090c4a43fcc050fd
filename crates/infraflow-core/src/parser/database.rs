//! database ノードのパース

use super::{bool_field, first_string, string_field};
use crate::error::{InfraError, Result};
use crate::model::{Availability, StackConfig};
use kdl::KdlNode;

/// database ノードを適用
///
/// ```kdl
/// database "conduit" instance="web-db" version="POSTGRES_14" tier="db-f1-micro" {
///     availability "zonal"
///     backups #false
/// }
/// ```
pub fn apply_database(config: &mut StackConfig, node: &KdlNode) -> Result<()> {
    let database = &mut config.database;

    if let Some(name) = first_string(node) {
        database.name = name;
    }
    if let Some(instance) = string_field(node, "instance") {
        database.instance = instance;
    }
    if let Some(version) = string_field(node, "version") {
        database.version = version.to_uppercase();
    }
    if let Some(tier) = string_field(node, "tier") {
        database.tier = tier;
    }
    if let Some(value) = string_field(node, "availability") {
        database.availability = Availability::parse(&value).ok_or_else(|| {
            InfraError::InvalidConfig(format!(
                "unknown availability '{}' (regional | zonal)",
                value
            ))
        })?;
    }
    if let Some(backups) = bool_field(node, "backups") {
        database.backups = backups;
    }
    if let Some(iam) = bool_field(node, "iam-authentication") {
        database.iam_authentication = iam;
    }
    Ok(())
}
