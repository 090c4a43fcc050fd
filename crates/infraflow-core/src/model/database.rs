//! データベース定義

use serde::{Deserialize, Serialize};

/// Cloud SQL の可用性設定
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Availability {
    /// リージョン冗長（デフォルト）
    #[default]
    Regional,
    /// 単一ゾーン
    Zonal,
}

impl Availability {
    /// 文字列からパース
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "regional" => Some(Self::Regional),
            "zonal" => Some(Self::Zonal),
            _ => None,
        }
    }

    /// Cloud SQL Admin API で使う文字列
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::Regional => "REGIONAL",
            Self::Zonal => "ZONAL",
        }
    }
}

/// マネージドデータベース定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// インスタンス名
    pub instance: String,
    /// 論理データベース名
    pub name: String,
    /// エンジンバージョン
    pub version: String,
    /// マシンティア
    pub tier: String,
    pub availability: Availability,
    /// 自動バックアップ
    pub backups: bool,
    /// `cloudsql.iam_authentication` フラグ
    pub iam_authentication: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            instance: "web-db".to_string(),
            name: "app".to_string(),
            version: "POSTGRES_14".to_string(),
            tier: "db-f1-micro".to_string(),
            availability: Availability::Regional,
            backups: true,
            iam_authentication: true,
        }
    }
}
