//! KDLパーサー
//!
//! infraflow のスタック定義（infra.kdl）をパースします。
//! 各ノードは既存の [`StackConfig`] に順に適用されるため、
//! 後から読み込んだファイルのノードが前の値を上書きします。

mod database;
mod project;
mod workload;

use database::apply_database;
use project::{apply_identity, apply_network, apply_project, apply_registry, apply_release};
use workload::{apply_app, apply_image, apply_variant};

use crate::error::{InfraError, Result};
use crate::model::{StackConfig, Topology};
use kdl::{KdlDocument, KdlNode};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// KDLファイルをパースしてスタック設定を生成
pub fn parse_kdl_file<P: AsRef<Path>>(path: P, stack: &str) -> Result<StackConfig> {
    let content = fs::read_to_string(path.as_ref()).map_err(|e| InfraError::IoError {
        path: path.as_ref().to_path_buf(),
        message: e.to_string(),
    })?;
    parse_kdl_string(&content, stack)
}

/// KDL文字列をパース（デフォルト値から開始）
pub fn parse_kdl_string(content: &str, stack: &str) -> Result<StackConfig> {
    let mut config = StackConfig::new(stack);
    apply_kdl_string(&mut config, content)?;
    Ok(config)
}

/// KDL文字列を既存の設定に適用
///
/// `stack "name" { ... }` ブロックは選択中のスタック（`config.stack()`）と
/// 名前が一致する場合のみ適用される。
pub fn apply_kdl_string(config: &mut StackConfig, content: &str) -> Result<()> {
    let doc: KdlDocument = content.parse()?;
    apply_nodes(config, &doc, true)
}

fn apply_nodes(config: &mut StackConfig, doc: &KdlDocument, top_level: bool) -> Result<()> {
    for node in doc.nodes() {
        match node.name().value() {
            "project" => apply_project(config, node)?,
            "database" => apply_database(config, node)?,
            "identity" => apply_identity(config, node)?,
            "network" => apply_network(config, node)?,
            "registry" => apply_registry(config, node)?,
            "release" => apply_release(config, node)?,
            "version" => {
                if let Some(version) = first_string(node) {
                    config.release.version = Some(version);
                }
            }
            "app" => apply_app(config, node)?,
            "image" => apply_image(config, node)?,
            "variant" => apply_variant(config, node)?,
            "topology" => {
                let value = first_string(node).ok_or_else(|| {
                    InfraError::InvalidConfig("topology requires a value (app | bench)".to_string())
                })?;
                config.topology = Topology::parse(&value).ok_or_else(|| {
                    InfraError::InvalidConfig(format!("unknown topology: {}", value))
                })?;
            }
            "embedded-database" | "embedded_database" => {
                config.embedded_database = node
                    .entries()
                    .first()
                    .and_then(|e| e.value().as_bool())
                    .unwrap_or(true);
            }
            "variables" => {
                if let Some(vars) = node.children() {
                    for var in vars.nodes() {
                        let key = var.name().value().to_string();
                        let value = first_string(var).unwrap_or_default();
                        config.variables.insert(key, value);
                    }
                }
            }
            "stack" => {
                if !top_level {
                    return Err(InfraError::InvalidConfig(
                        "stack blocks cannot be nested".to_string(),
                    ));
                }
                let name = first_string(node).ok_or_else(|| {
                    InfraError::InvalidConfig("stack requires a name".to_string())
                })?;
                if !config.declared_stacks.contains(&name) {
                    config.declared_stacks.push(name.clone());
                }
                if name == config.stack() {
                    debug!(stack = %name, "Applying stack block");
                    if let Some(children) = node.children() {
                        apply_nodes(config, children, false)?;
                    }
                }
            }
            other => {
                warn!(node = %other, "Unknown node ignored");
            }
        }
    }
    Ok(())
}

/// 先頭の引数を文字列として取得
pub(crate) fn first_string(node: &KdlNode) -> Option<String> {
    node.entries()
        .first()
        .filter(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// プロパティ（`key="v"`）または子ノード（`key "v"`）から文字列を取得
pub(crate) fn string_field(node: &KdlNode, key: &str) -> Option<String> {
    if let Some(value) = node.get(key).and_then(|v| v.as_string()) {
        return Some(value.to_string());
    }
    child(node, key).and_then(first_string)
}

/// 整数値を取得
pub(crate) fn integer_field(node: &KdlNode, key: &str) -> Option<i128> {
    if let Some(value) = node.get(key).and_then(|v| v.as_integer()) {
        return Some(value);
    }
    child(node, key)
        .and_then(|c| c.entries().first())
        .and_then(|e| e.value().as_integer())
}

/// 真偽値を取得
pub(crate) fn bool_field(node: &KdlNode, key: &str) -> Option<bool> {
    if let Some(value) = node.get(key).and_then(|v| v.as_bool()) {
        return Some(value);
    }
    child(node, key)
        .and_then(|c| c.entries().first())
        .and_then(|e| e.value().as_bool())
}

/// ポート番号を取得（範囲外はエラー）
pub(crate) fn port_field(node: &KdlNode, key: &str) -> Result<Option<u16>> {
    match integer_field(node, key) {
        None => Ok(None),
        Some(value) => u16::try_from(value)
            .map(Some)
            .map_err(|_| InfraError::InvalidConfig(format!("{} is out of range: {}", key, value))),
    }
}

/// CPU・メモリ量などを文字列で取得（整数指定も許可）
pub(crate) fn quantity_field(node: &KdlNode, key: &str) -> Option<String> {
    string_field(node, key).or_else(|| integer_field(node, key).map(|v| v.to_string()))
}

fn child<'a>(node: &'a KdlNode, key: &str) -> Option<&'a KdlNode> {
    node.children()
        .and_then(|children| children.nodes().iter().find(|c| c.name().value() == key))
}
