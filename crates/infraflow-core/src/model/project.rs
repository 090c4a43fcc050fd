//! プロジェクト・レジストリ・リリース定義

use serde::{Deserialize, Serialize};

/// GCPプロジェクト定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// プロジェクト名（表示用）
    pub name: String,
    /// GCPプロジェクトID
    pub id: String,
    /// リージョン（クラスタ・Cloud SQLの配置先）
    pub region: String,
    /// 環境名（選択したスタック名。ワークロードには ENV として渡す）
    pub environment: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "unnamed".to_string(),
            id: String::new(),
            region: "us-central1".to_string(),
            environment: "dev".to_string(),
        }
    }
}

/// Artifact Registry 定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// レジストリホスト（例: us-docker.pkg.dev）
    pub host: String,
    /// リポジトリID
    pub repository: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: "us-docker.pkg.dev".to_string(),
            repository: "docker".to_string(),
        }
    }
}

impl RegistryConfig {
    /// ホスト名からリポジトリのロケーションを求める
    ///
    /// `us-docker.pkg.dev` → `us`、`asia-northeast1-docker.pkg.dev` → `asia-northeast1`
    pub fn location(&self) -> &str {
        self.host
            .split_once("-docker.pkg.dev")
            .map(|(loc, _)| loc)
            .unwrap_or("us")
    }
}

/// リリース情報（イメージタグと ENV/VERSION 環境変数に使う）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// プロジェクトバージョン（VERSION.txt）
    pub version: Option<String>,
    /// git の短縮ハッシュ
    pub git_hash: Option<String>,
    /// アプリケーションのログレベル
    pub log_level: String,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            version: None,
            git_hash: None,
            log_level: "INFO".to_string(),
        }
    }
}

impl ReleaseConfig {
    /// `{version}-{git_hash}` 形式のタグ。どちらか欠けていれば None
    pub fn tag(&self) -> Option<String> {
        match (&self.version, &self.git_hash) {
            (Some(version), Some(hash)) => Some(format!("{}-{}", version, hash)),
            _ => None,
        }
    }
}
