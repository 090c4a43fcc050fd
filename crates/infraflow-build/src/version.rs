//! リリース情報（VERSION.txt と git ハッシュ）

use crate::error::{BuildError, BuildResult};
use std::path::Path;

pub use infraflow_core::loader::git_short_hash;

/// VERSION.txt を読み込む（前後の空白を除去）
pub fn read_version(path: &Path) -> BuildResult<String> {
    let content = std::fs::read_to_string(path).map_err(|e| BuildError::VersionFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let version = content.trim();
    if version.is_empty() {
        return Err(BuildError::VersionFile {
            path: path.to_path_buf(),
            message: "file is empty".to_string(),
        });
    }
    Ok(version.to_string())
}
