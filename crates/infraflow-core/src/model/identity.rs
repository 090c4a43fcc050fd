//! サービスアカウント定義

use serde::{Deserialize, Serialize};

/// ワークロードが使うIDの定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// GCPサービスアカウントID（メールのローカル部）
    pub service_account: String,
    /// Kubernetes側のサービスアカウント名
    pub kubernetes_service_account: String,
    /// ワークロードを配置する名前空間
    pub namespace: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            service_account: "app".to_string(),
            kubernetes_service_account: "app".to_string(),
            namespace: "default".to_string(),
        }
    }
}

/// ネットワークポート定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// アプリケーションのコンテナポート
    pub app_port: u16,
    /// Cloud SQL プロキシの待受ポート
    pub proxy_port: u16,
    /// プロキシのヘルスチェックポート
    pub proxy_health_port: u16,
    /// 組み込みデータベースのポート
    pub embedded_port: u16,
    /// 外部公開ポート
    pub public_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            app_port: 8000,
            proxy_port: 5432,
            proxy_health_port: 8090,
            embedded_port: 5655,
            public_port: 80,
        }
    }
}
