pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SETTINGS_FILE: &str = "settings.yaml";

/// infraflowの設定ディレクトリを取得（なければ作成）
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("infraflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// ユーザー設定 (~/.config/infraflow/settings.yaml)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// スタック未指定時に使うスタック名
    #[serde(default)]
    pub default_stack: Option<String>,
    /// バンドルの出力先（プロジェクトルートからの相対パス）
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Settings {
    /// 設定ディレクトリから読み込む。ファイルがなければデフォルト
    pub fn load() -> Result<Self> {
        let dir = get_config_dir()?;
        Self::load_from(&dir.join(SETTINGS_FILE))
    }

    /// 指定パスから読み込む
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Settings file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    /// 出力ディレクトリ（未設定時は .infraflow/out）
    pub fn output_dir_or_default(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(".infraflow/out"))
    }
}
