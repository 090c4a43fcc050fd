//! 解決済みのスタック設定

use super::{
    AppConfig, DatabaseConfig, IdentityConfig, ImageSpec, NetworkConfig, ProjectConfig,
    RegistryConfig, ReleaseConfig, ServerVariant, Topology,
};
use crate::error::{InfraError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

static DNS_LABEL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").ok());

static SERVICE_ACCOUNT_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z]([-a-z0-9]{4,28}[a-z0-9])$").ok());

/// スタック全体の設定
///
/// `infra.kdl` → `infra.{stack}.kdl` → `infra.local.kdl` の順に適用された結果。
/// 構成の組み立て時にはイミュータブルに扱う。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    pub project: ProjectConfig,
    pub database: DatabaseConfig,
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub registry: RegistryConfig,
    pub release: ReleaseConfig,
    pub app: AppConfig,
    /// 明示的に定義されたイメージ（デフォルトを上書き）
    pub images: BTreeMap<String, ImageSpec>,
    pub topology: Topology,
    /// 組み込みデータベース（EdgeDB）を追加するか
    pub embedded_database: bool,
    /// 明示的に定義されたサーバーバリアント（空ならデフォルト）
    pub variants: Vec<ServerVariant>,
    /// プロジェクトレベルの変数
    pub variables: HashMap<String, String>,
    /// 定義ファイル内で見つかった `stack "..." {}` ブロック名
    pub declared_stacks: Vec<String>,
}

impl StackConfig {
    /// デフォルト値でスタック設定を作成
    pub fn new(stack: impl Into<String>) -> Self {
        Self {
            project: ProjectConfig {
                environment: stack.into(),
                ..ProjectConfig::default()
            },
            database: DatabaseConfig::default(),
            identity: IdentityConfig::default(),
            network: NetworkConfig::default(),
            registry: RegistryConfig::default(),
            release: ReleaseConfig::default(),
            app: AppConfig::default(),
            images: BTreeMap::new(),
            topology: Topology::default(),
            embedded_database: false,
            variants: Vec::new(),
            variables: HashMap::new(),
            declared_stacks: Vec::new(),
        }
    }

    /// 選択されたスタック名
    pub fn stack(&self) -> &str {
        &self.project.environment
    }

    /// `{sa}@{project}.iam.gserviceaccount.com`
    pub fn service_account_email(&self) -> String {
        format!(
            "{}@{}.iam.gserviceaccount.com",
            self.identity.service_account, self.project.id
        )
    }

    /// `{project}.svc.id.goog`
    pub fn workload_pool(&self) -> String {
        format!("{}.svc.id.goog", self.project.id)
    }

    /// `{project}:{region}:{instance}`
    pub fn instance_connection_name(&self) -> String {
        format!(
            "{}:{}:{}",
            self.project.id, self.project.region, self.database.instance
        )
    }

    /// ワークロードIDのメンバー文字列
    pub fn workload_identity_member(&self) -> String {
        format!(
            "serviceAccount:{}[{}/{}]",
            self.workload_pool(),
            self.identity.namespace,
            self.identity.kubernetes_service_account
        )
    }

    /// トポロジに応じたイメージ定義（デフォルト + 明示定義）
    pub fn image_specs(&self) -> BTreeMap<String, ImageSpec> {
        let context = &self.app.context;
        let mut specs = BTreeMap::new();
        let defaults: &[&str] = match self.topology {
            Topology::App => &["api", "migrations"],
            Topology::Bench => &["api", "migrations", "bench"],
        };
        for name in defaults {
            specs.insert(name.to_string(), ImageSpec::new(context.clone(), *name));
        }
        if self.topology == Topology::Bench {
            for variant in self.server_variants() {
                specs.insert(
                    variant.name.clone(),
                    ImageSpec::new(context.clone(), variant.name.as_str()),
                );
            }
        }
        for (name, spec) in &self.images {
            specs.insert(name.clone(), spec.clone());
        }
        specs
    }

    /// 有効なサーバーバリアント（未定義なら gunicorn / uvicorn）
    pub fn server_variants(&self) -> Vec<ServerVariant> {
        if self.variants.is_empty() {
            ServerVariant::defaults()
        } else {
            self.variants.clone()
        }
    }

    /// バリアントを名前で追加・上書き
    pub fn upsert_variant(&mut self, variant: ServerVariant) {
        if self.variants.is_empty() {
            self.variants = ServerVariant::defaults();
        }
        match self.variants.iter_mut().find(|v| v.name == variant.name) {
            Some(existing) => *existing = variant,
            None => self.variants.push(variant),
        }
    }

    /// 設定の整合性を検証
    pub fn validate(&self) -> Result<()> {
        if self.project.id.trim().is_empty() {
            return Err(InfraError::InvalidConfig(
                "project の id が指定されていません（例: project \"app\" id=\"my-gcp-project\"）"
                    .to_string(),
            ));
        }

        check_dns_label("database instance", &self.database.instance)?;
        check_dns_label("namespace", &self.identity.namespace)?;
        check_dns_label(
            "kubernetes service account",
            &self.identity.kubernetes_service_account,
        )?;

        let sa_ok = SERVICE_ACCOUNT_ID
            .as_ref()
            .is_some_and(|re| re.is_match(&self.identity.service_account));
        if !sa_ok {
            return Err(InfraError::InvalidConfig(format!(
                "service-account '{}' は 6〜30 文字の小文字英数字とハイフンで指定してください",
                self.identity.service_account
            )));
        }

        let ports = [
            ("app-port", self.network.app_port),
            ("proxy-port", self.network.proxy_port),
            ("proxy-health-port", self.network.proxy_health_port),
            ("embedded-port", self.network.embedded_port),
            ("public-port", self.network.public_port),
        ];
        for (name, port) in ports {
            if port == 0 {
                return Err(InfraError::InvalidConfig(format!(
                    "{} に 0 は指定できません",
                    name
                )));
            }
        }

        if self.app.replicas < 1 {
            return Err(InfraError::InvalidConfig(format!(
                "app replicas は 1 以上を指定してください: {}",
                self.app.replicas
            )));
        }

        let mut seen = HashSet::new();
        for variant in &self.variants {
            check_dns_label("variant", &variant.name)?;
            if !seen.insert(variant.name.as_str()) {
                return Err(InfraError::InvalidConfig(format!(
                    "variant '{}' が重複しています",
                    variant.name
                )));
            }
            if variant.replicas < 1 {
                return Err(InfraError::InvalidConfig(format!(
                    "variant '{}' の replicas は 1 以上を指定してください",
                    variant.name
                )));
            }
        }

        if self.topology == Topology::Bench && self.server_variants().is_empty() {
            return Err(InfraError::InvalidConfig(
                "bench トポロジには少なくとも1つの variant が必要です".to_string(),
            ));
        }

        for name in self.images.keys() {
            check_dns_label("image", name)?;
        }

        Ok(())
    }
}

/// DNS-1123 ラベルとして有効か検証
fn check_dns_label(what: &str, value: &str) -> Result<()> {
    let ok = value.len() <= 63 && DNS_LABEL.as_ref().is_some_and(|re| re.is_match(value));
    if ok {
        Ok(())
    } else {
        Err(InfraError::InvalidConfig(format!(
            "{} '{}' は DNS-1123 ラベル（小文字英数字とハイフン、63文字以内）で指定してください",
            what, value
        )))
    }
}
