//! ファイル自動発見機能
//!
//! プロジェクトルートからスタック定義ファイル群を発見します。

use crate::error::{InfraError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 発見されたファイル群
#[derive(Debug, Clone, Default)]
pub struct DiscoveredFiles {
    /// ルートファイル (infra.kdl)
    pub root: Option<PathBuf>,
    /// スタック固有オーバーライドファイル (infra.{stack}.kdl)
    pub stack_override: Option<PathBuf>,
    /// ローカルオーバーライドファイル (infra.local.kdl)
    pub local_override: Option<PathBuf>,
    /// 環境変数ファイル (.env)
    pub env_file: Option<PathBuf>,
    /// スタック固有の環境変数ファイル (.env.{stack})
    pub stack_env_file: Option<PathBuf>,
    /// バージョンファイル (VERSION.txt。ルートまたは親ディレクトリ)
    pub version_file: Option<PathBuf>,
}

impl DiscoveredFiles {
    /// 適用順に並べた KDL ファイル
    pub fn kdl_files(&self) -> Vec<&Path> {
        [&self.root, &self.stack_override, &self.local_override]
            .into_iter()
            .flatten()
            .map(PathBuf::as_path)
            .collect()
    }
}

/// プロジェクトルートを検出
///
/// 以下の優先順位で検索:
/// 1. 環境変数 INFRAFLOW_PROJECT_ROOT
/// 2. カレントディレクトリから上に向かって以下を探す:
///    - infra.kdl
///    - .infraflow/infra.kdl
#[tracing::instrument]
pub fn find_project_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var("INFRAFLOW_PROJECT_ROOT") {
        let path = PathBuf::from(&root);
        debug!(env_root = %root, "Checking INFRAFLOW_PROJECT_ROOT");
        if is_project_root(&path) {
            info!(project_root = %path.display(), "Found project root from environment variable");
            return Ok(path);
        }
        warn!(env_root = %root, "INFRAFLOW_PROJECT_ROOT has no infra.kdl, searching upwards");
    }

    let start_dir = std::env::current_dir()?;
    find_project_root_from(&start_dir)
}

/// 指定ディレクトリから上に向かってプロジェクトルートを探す
pub fn find_project_root_from(start_dir: &Path) -> Result<PathBuf> {
    let mut current = start_dir.to_path_buf();
    loop {
        debug!(checking = %current.display(), "Looking for infra.kdl");
        if is_project_root(&current) {
            info!(project_root = %current.display(), "Found project root");
            return Ok(current);
        }
        if !current.pop() {
            break;
        }
    }

    warn!(start_dir = %start_dir.display(), "Project root not found");
    Err(InfraError::ProjectRootNotFound(start_dir.to_path_buf()))
}

fn is_project_root(dir: &Path) -> bool {
    dir.join("infra.kdl").exists() || dir.join(".infraflow/infra.kdl").exists()
}

/// プロジェクトルートからファイルを自動発見
///
/// 各ファイルはルート直下を優先し、なければ `.infraflow/` 内を探す。
#[tracing::instrument(skip(project_root), fields(project_root = %project_root.display()))]
pub fn discover_files(project_root: &Path, stack: &str) -> Result<DiscoveredFiles> {
    debug!("Starting file discovery");
    let lookup = |name: &str| -> Option<PathBuf> {
        let direct = project_root.join(name);
        if direct.exists() {
            return Some(direct);
        }
        let nested = project_root.join(".infraflow").join(name);
        nested.exists().then_some(nested)
    };

    let discovered = DiscoveredFiles {
        root: lookup("infra.kdl"),
        stack_override: lookup(&format!("infra.{}.kdl", stack)),
        local_override: lookup("infra.local.kdl"),
        env_file: lookup(".env"),
        stack_env_file: lookup(&format!(".env.{}", stack)),
        version_file: find_version_file(project_root),
    };

    if discovered.root.is_none() {
        return Err(InfraError::ProjectRootNotFound(project_root.to_path_buf()));
    }

    info!(
        stack = %stack,
        kdl_files = discovered.kdl_files().len(),
        has_env = discovered.env_file.is_some(),
        "File discovery complete"
    );
    Ok(discovered)
}

/// VERSION.txt をルート、次に親ディレクトリで探す
fn find_version_file(project_root: &Path) -> Option<PathBuf> {
    let candidates = [
        Some(project_root.join("VERSION.txt")),
        project_root.parent().map(|p| p.join("VERSION.txt")),
    ];
    candidates.into_iter().flatten().find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_project() -> TempDir {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::write(root.join("infra.kdl"), r#"project "test" id="p""#).unwrap();
        fs::write(root.join("infra.prod.kdl"), r#"app replicas=4"#).unwrap();
        fs::write(root.join("infra.local.kdl"), r#"release log-level="DEBUG""#).unwrap();
        fs::write(root.join(".env"), "A=1\n").unwrap();
        fs::write(root.join(".env.prod"), "A=2\n").unwrap();
        temp
    }

    #[test]
    fn test_discover_files() -> Result<()> {
        let temp = create_test_project();
        let discovered = discover_files(temp.path(), "prod")?;

        assert!(discovered.root.is_some());
        assert!(discovered.stack_override.is_some());
        assert!(discovered.local_override.is_some());
        assert!(discovered.env_file.is_some());
        assert!(discovered.stack_env_file.is_some());

        let order: Vec<_> = discovered
            .kdl_files()
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect();
        assert_eq!(order, vec!["infra.kdl", "infra.prod.kdl", "infra.local.kdl"]);
        Ok(())
    }

    #[test]
    fn test_discover_files_other_stack() -> Result<()> {
        let temp = create_test_project();
        let discovered = discover_files(temp.path(), "dev")?;
        assert!(discovered.stack_override.is_none());
        assert!(discovered.stack_env_file.is_none());
        Ok(())
    }

    #[test]
    fn test_discover_files_in_infraflow_dir() -> Result<()> {
        let temp = tempfile::tempdir().unwrap();
        let infra_dir = temp.path().join(".infraflow");
        fs::create_dir(&infra_dir).unwrap();
        fs::write(infra_dir.join("infra.kdl"), "// nested").unwrap();

        let discovered = discover_files(temp.path(), "dev")?;
        assert!(discovered.root.unwrap().ends_with(".infraflow/infra.kdl"));
        Ok(())
    }

    #[test]
    fn test_discover_files_without_root() {
        let temp = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_files(temp.path(), "dev"),
            Err(InfraError::ProjectRootNotFound(_))
        ));
    }

    #[test]
    fn test_version_file_in_parent() -> Result<()> {
        let temp = tempfile::tempdir().unwrap();
        let infra = temp.path().join("infra");
        fs::create_dir(&infra).unwrap();
        fs::write(infra.join("infra.kdl"), "// root").unwrap();
        fs::write(temp.path().join("VERSION.txt"), "1.0.0\n").unwrap();

        let discovered = discover_files(&infra, "dev")?;
        assert_eq!(discovered.version_file, Some(temp.path().join("VERSION.txt")));
        Ok(())
    }

    #[test]
    fn test_find_project_root_walks_up() -> Result<()> {
        let temp = create_test_project();
        let nested = temp.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();

        let root = find_project_root_from(&nested)?;
        assert_eq!(root, temp.path());
        Ok(())
    }

    #[test]
    #[serial_test::serial]
    fn test_find_project_root_env_override() {
        let temp = create_test_project();
        let root = temp_env::with_var(
            "INFRAFLOW_PROJECT_ROOT",
            Some(temp.path().as_os_str()),
            find_project_root,
        )
        .unwrap();
        assert_eq!(root, temp.path());
    }
}
