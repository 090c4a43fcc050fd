//! 選択中のスタックとその周辺（ルート、設定、状態ファイル）

use anyhow::Context;
use colored::Colorize;
use infraflow_cloud::{CloudError, SecretCipher, SecretVault, StackState, StateManager};
use infraflow_config::Settings;
use infraflow_core::StackConfig;
use infraflow_stack::{ComposeInputs, Composition, GeneratedMaterial, compose};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct Project {
    pub root: PathBuf,
    pub stack: String,
    pub config: StackConfig,
    pub settings: Settings,
    pub state: StateManager,
}

impl Project {
    /// カレントディレクトリからプロジェクトを探し、スタックを読み込む
    pub fn load(stack: Option<String>) -> anyhow::Result<Self> {
        let root = infraflow_core::find_project_root()?;
        let settings = Settings::load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load user settings, using defaults");
            Settings::default()
        });
        let stack = crate::utils::determine_stack_name(stack, &settings)?;
        Self::load_from(root, stack, settings)
    }

    pub fn load_from(root: PathBuf, stack: String, settings: Settings) -> anyhow::Result<Self> {
        let config = infraflow_core::load_project_from_root(&root, &stack)
            .with_context(|| format!("スタック '{}' の読み込みに失敗しました", stack))?;
        let state = StateManager::new(&root, &stack);
        debug!(root = %root.display(), stack = %stack, "Project loaded");
        Ok(Self {
            root,
            stack,
            config,
            settings,
            state,
        })
    }

    /// バンドルの出力先（`--out` 指定が優先）
    pub fn output_dir(&self, out: Option<&Path>) -> PathBuf {
        match out {
            Some(dir) => dir.to_path_buf(),
            None => self
                .root
                .join(self.settings.output_dir_or_default())
                .join(&self.stack),
        }
    }

    /// 状態ファイルのシークレットを開く
    ///
    /// パスフレーズがない場合、`required` でなければ使い捨ての値で代用する。
    pub fn vault(&self, state: &StackState, required: bool) -> anyhow::Result<SecretVault> {
        match SecretCipher::from_env() {
            Ok(cipher) => Ok(SecretVault::new(cipher, state.secrets.clone())),
            Err(CloudError::MissingPassphrase) if !required => {
                // stdout はマニフェストや kubeconfig の出力に使う
                if !state.secrets.is_empty() {
                    eprintln!(
                        "{}",
                        "⚠ INFRAFLOW_PASSPHRASE が未設定のため、シークレットは一時的な値で代用します"
                            .yellow()
                    );
                }
                Ok(SecretVault::ephemeral())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 記録済みの出力とシークレットを使ってスタックを組み立てる
    pub fn compose(&self, state: &StackState, vault: &mut SecretVault) -> anyhow::Result<Composition> {
        let material = GeneratedMaterial::generate(&self.config, vault)?;
        let inputs = ComposeInputs::new(material, state.outputs.clone());
        Ok(compose(&self.config, &inputs)?)
    }
}
