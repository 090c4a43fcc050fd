//! レジストリ修飾済みのイメージ参照

use crate::error::{BuildError, BuildResult};
use infraflow_core::{ImageSpec, StackConfig};
use serde::Serialize;
use std::fmt;

/// `{host}/{project}/{repository}/{name}:{tag}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    pub host: String,
    pub project: String,
    pub repository: String,
    pub name: String,
    pub tag: String,
}

impl ImageRef {
    /// `{version}-{hash}` タグのイメージ参照
    pub fn tagged(
        host: &str,
        project: &str,
        repository: &str,
        name: &str,
        version: &str,
        hash: &str,
    ) -> Self {
        Self {
            host: host.to_string(),
            project: project.to_string(),
            repository: repository.to_string(),
            name: name.to_string(),
            tag: format!("{}-{}", version, hash),
        }
    }

    /// `latest` タグのイメージ参照
    pub fn latest(host: &str, project: &str, repository: &str, name: &str) -> Self {
        Self {
            host: host.to_string(),
            project: project.to_string(),
            repository: repository.to_string(),
            name: name.to_string(),
            tag: "latest".to_string(),
        }
    }

    /// スタック設定からイメージ参照を作る（リリース情報がなければ latest）
    pub fn for_stack(config: &StackConfig, name: &str) -> Self {
        let host = &config.registry.host;
        let project = &config.project.id;
        let repository = &config.registry.repository;
        match (&config.release.version, &config.release.git_hash) {
            (Some(version), Some(hash)) => {
                Self::tagged(host, project, repository, name, version, hash)
            }
            _ => Self::latest(host, project, repository, name),
        }
    }

    /// タグなしのリポジトリパス
    pub fn repository_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.host, self.project, self.repository, self.name
        )
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository_path(), self.tag)
    }
}

/// スタックでビルドするイメージ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackImage {
    pub name: String,
    pub reference: ImageRef,
    pub spec: ImageSpec,
}

/// トポロジに応じたイメージ一覧（名前順）
pub fn stack_images(config: &StackConfig) -> BuildResult<Vec<StackImage>> {
    config
        .image_specs()
        .into_iter()
        .map(|(name, spec)| {
            let reference = ImageRef::for_stack(config, &name);
            validate_tag(&reference.tag)?;
            Ok(StackImage {
                name,
                reference,
                spec,
            })
        })
        .collect()
}

/// Docker タグの制約を検証
///
/// - 128文字以下
/// - 英数字、ピリオド、ハイフン、アンダースコアのみ
/// - 先頭はピリオドまたはハイフンではない
pub fn validate_tag(tag: &str) -> BuildResult<()> {
    if tag.is_empty() {
        return Err(BuildError::InvalidTag {
            tag: "(empty)".to_string(),
        });
    }

    if tag.len() > 128 {
        return Err(BuildError::InvalidTag {
            tag: format!("Tag too long ({} characters, max 128)", tag.len()),
        });
    }

    if tag.starts_with('.') || tag.starts_with('-') {
        return Err(BuildError::InvalidTag {
            tag: tag.to_string(),
        });
    }

    if let Some(c) = tag
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '.' && *c != '-' && *c != '_')
    {
        return Err(BuildError::InvalidTag {
            tag: format!("Invalid character '{}' in tag: {}", c, tag),
        });
    }

    Ok(())
}
