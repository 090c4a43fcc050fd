//! ワークロード構成（トポロジ・サーバーバリアント・イメージ）

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// デプロイするワークロードの構成
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// API + マイグレーションジョブ（デフォルト）
    #[default]
    App,
    /// 2種類のサーバーバリアント + 負荷生成ワークロード
    Bench,
}

impl Topology {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "app" => Some(Self::App),
            "bench" | "benchmark" => Some(Self::Bench),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Bench => "bench",
        }
    }
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// サーバーのプロセスモデル
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessModel {
    /// ワーカープロセスを複数持つ（gunicorn 型）
    MultiProcess,
    /// 単一プロセス・イベントループ（uvicorn 型）
    #[default]
    SingleProcess,
}

impl ProcessModel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "multi-process" | "multi_process" => Some(Self::MultiProcess),
            "single-process" | "single_process" => Some(Self::SingleProcess),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MultiProcess => "multi-process",
            Self::SingleProcess => "single-process",
        }
    }
}

/// ベンチマーク対象のサーバーバリアント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerVariant {
    pub name: String,
    pub replicas: i32,
    /// Pod あたりの CPU 要求（例: "4", "500m"）
    pub cpu: String,
    /// Pod あたりのメモリ要求（例: "4Gi"）
    pub memory: String,
    pub process_model: ProcessModel,
}

impl ServerVariant {
    /// 組み込みのバリアント（gunicorn / uvicorn）
    pub fn defaults() -> Vec<ServerVariant> {
        vec![
            ServerVariant {
                name: "gunicorn".to_string(),
                replicas: 1,
                cpu: "4".to_string(),
                memory: "4Gi".to_string(),
                process_model: ProcessModel::MultiProcess,
            },
            ServerVariant {
                name: "uvicorn".to_string(),
                replicas: 4,
                cpu: "1".to_string(),
                memory: "1Gi".to_string(),
                process_model: ProcessModel::SingleProcess,
            },
        ]
    }

    /// ベンチマークワークロードに渡す環境変数名（`GUNICORN_HOST` など）
    pub fn host_env_name(&self) -> String {
        format!("{}_HOST", self.name.to_uppercase().replace('-', "_"))
    }
}

/// コンテナイメージのビルド定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    /// ビルドコンテキスト（プロジェクトルートからの相対パス）
    pub context: PathBuf,
    /// マルチステージビルドのターゲット
    pub target: Option<String>,
}

impl ImageSpec {
    pub fn new(context: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            target: Some(target.into()),
        }
    }
}

/// API ワークロードの設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// API Deployment のレプリカ数
    pub replicas: i32,
    /// アプリケーションのビルドコンテキスト
    pub context: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            replicas: 2,
            context: PathBuf::from("../app"),
        }
    }
}
