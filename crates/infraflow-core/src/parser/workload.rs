//! app / image / variant ノードのパース

use super::{first_string, integer_field, quantity_field, string_field};
use crate::error::{InfraError, Result};
use crate::model::{ImageSpec, ProcessModel, ServerVariant, StackConfig};
use kdl::KdlNode;
use std::path::PathBuf;

pub fn apply_app(config: &mut StackConfig, node: &KdlNode) -> Result<()> {
    if let Some(replicas) = integer_field(node, "replicas") {
        config.app.replicas = to_replicas("app", replicas)?;
    }
    if let Some(context) = string_field(node, "context") {
        config.app.context = PathBuf::from(context);
    }
    Ok(())
}

/// image ノードを適用
///
/// context 未指定時は app の context を使う。
pub fn apply_image(config: &mut StackConfig, node: &KdlNode) -> Result<()> {
    let name = first_string(node)
        .ok_or_else(|| InfraError::InvalidConfig("image requires a name".to_string()))?;

    let existing = config.images.get(&name).cloned();
    let context = string_field(node, "context")
        .map(PathBuf::from)
        .or_else(|| existing.as_ref().map(|s| s.context.clone()))
        .unwrap_or_else(|| config.app.context.clone());
    let target = string_field(node, "target")
        .or_else(|| existing.and_then(|s| s.target))
        .or_else(|| Some(name.clone()));

    config.images.insert(name, ImageSpec { context, target });
    Ok(())
}

/// variant ノードを適用（同名のバリアントは上書き）
///
/// ```kdl
/// variant "gunicorn" replicas=1 cpu="4" memory="4Gi" process-model="multi-process"
/// ```
pub fn apply_variant(config: &mut StackConfig, node: &KdlNode) -> Result<()> {
    let name = first_string(node)
        .ok_or_else(|| InfraError::InvalidConfig("variant requires a name".to_string()))?;

    let base = config
        .server_variants()
        .into_iter()
        .find(|v| v.name == name)
        .unwrap_or(ServerVariant {
            name: name.clone(),
            replicas: 1,
            cpu: "1".to_string(),
            memory: "1Gi".to_string(),
            process_model: ProcessModel::default(),
        });

    let mut variant = base;
    if let Some(replicas) = integer_field(node, "replicas") {
        variant.replicas = to_replicas(&name, replicas)?;
    }
    if let Some(cpu) = quantity_field(node, "cpu") {
        variant.cpu = cpu;
    }
    if let Some(memory) = quantity_field(node, "memory") {
        variant.memory = memory;
    }
    if let Some(model) = string_field(node, "process-model") {
        variant.process_model = ProcessModel::parse(&model).ok_or_else(|| {
            InfraError::InvalidConfig(format!(
                "unknown process-model '{}' (multi-process | single-process)",
                model
            ))
        })?;
    }

    config.upsert_variant(variant);
    Ok(())
}

fn to_replicas(what: &str, value: i128) -> Result<i32> {
    i32::try_from(value)
        .ok()
        .filter(|v| *v >= 0)
        .ok_or_else(|| InfraError::InvalidConfig(format!("{} replicas out of range: {}", what, value)))
}
