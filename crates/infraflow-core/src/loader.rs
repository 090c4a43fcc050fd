//! 統合ローダー
//!
//! ファイル発見、テンプレート展開、パース、リリース情報の補完を統合

use crate::discovery::{DiscoveredFiles, discover_files, find_project_root};
use crate::error::{InfraError, Result};
use crate::model::StackConfig;
use crate::parser::apply_kdl_string;
use crate::template::{TemplateProcessor, Variables, extract_variables};
use std::path::Path;
use std::process::Command;
use tracing::{debug, info, instrument, warn};

/// カレントディレクトリからプロジェクトを探してロード
#[instrument]
pub fn load_project(stack: &str) -> Result<StackConfig> {
    info!("Starting project load");
    let project_root = find_project_root()?;
    load_project_from_root(&project_root, stack)
}

/// 指定されたルートディレクトリからスタック設定をロード
///
/// 以下の処理を実行:
/// 1. ファイルの発見（infra.kdl → infra.{stack}.kdl → infra.local.kdl）
/// 2. 変数の収集とテンプレート展開
/// 3. KDLパース（ファイル順に上書き適用）
/// 4. バージョン・git ハッシュの補完
/// 5. 検証
#[instrument(skip(project_root), fields(project_root = %project_root.display()))]
pub fn load_project_from_root(project_root: &Path, stack: &str) -> Result<StackConfig> {
    debug!("Step 1: Discovering files");
    let discovered = discover_files(project_root, stack)?;

    debug!("Step 2: Preparing template processor");
    let mut processor = prepare_template_processor(&discovered, project_root, stack)?;

    debug!("Step 3: Rendering and applying KDL files");
    let mut config = StackConfig::new(stack);
    config.project.name = project_root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();

    for file in discovered.kdl_files() {
        debug!(file = %file.display(), "Rendering file");
        let rendered = processor.render_file(file)?;
        apply_kdl_string(&mut config, &rendered).map_err(|e| match e {
            InfraError::KdlParse(err) => InfraError::InvalidConfig(format!(
                "{} のパースに失敗しました: {}",
                file.display(),
                err
            )),
            other => other,
        })?;
    }

    if !config.declared_stacks.is_empty()
        && !config.declared_stacks.iter().any(|s| s == stack)
        && discovered.stack_override.is_none()
    {
        warn!(
            stack = %stack,
            declared = ?config.declared_stacks,
            "Selected stack has no stack block or override file; using defaults"
        );
    }

    debug!("Step 4: Filling release information");
    fill_release(&mut config, &discovered, project_root);

    debug!("Step 5: Validating");
    config.validate()?;

    info!(
        stack = %stack,
        project = %config.project.id,
        topology = %config.topology,
        embedded_database = config.embedded_database,
        "Project loaded successfully"
    );
    Ok(config)
}

/// テンプレートプロセッサを準備
fn prepare_template_processor(
    discovered: &DiscoveredFiles,
    project_root: &Path,
    stack: &str,
) -> Result<TemplateProcessor> {
    let mut processor = TemplateProcessor::new();

    processor.add_variable(
        "PROJECT_ROOT",
        serde_json::Value::String(project_root.to_string_lossy().to_string()),
    );
    processor.add_variable("STACK", serde_json::Value::String(stack.to_string()));

    // variables ブロック（後のファイルが前を上書き）
    let mut variables = Variables::new();
    for file in discovered.kdl_files() {
        let content = std::fs::read_to_string(file).map_err(|e| InfraError::IoError {
            path: file.to_path_buf(),
            message: e.to_string(),
        })?;
        variables.extend(extract_variables(&content, Some(stack))?);
    }
    debug!(count = variables.len(), "Collected variables blocks");
    processor.add_variables(variables);

    if let Some(env_file) = &discovered.env_file {
        processor.add_env_file_variables(env_file)?;
    }
    if let Some(stack_env_file) = &discovered.stack_env_file {
        processor.add_env_file_variables(stack_env_file)?;
    }

    // 環境変数が最優先
    processor.add_env_variables();

    Ok(processor)
}

/// VERSION.txt と git からリリース情報を補完
fn fill_release(config: &mut StackConfig, discovered: &DiscoveredFiles, project_root: &Path) {
    if config.release.version.is_none()
        && let Some(path) = &discovered.version_file
    {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let version = content.trim();
                if !version.is_empty() {
                    config.release.version = Some(version.to_string());
                }
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to read VERSION.txt"),
        }
    }

    if let Ok(hash) = std::env::var("INFRA_GIT_HASH")
        && !hash.trim().is_empty()
    {
        config.release.git_hash = Some(hash.trim().to_string());
    }
    if config.release.git_hash.is_none() {
        config.release.git_hash = git_short_hash(project_root);
    }

    if config.release.tag().is_none() {
        warn!("Release version or git hash is unknown; image tags will fall back to 'latest'");
    }
}

/// `git rev-parse --short HEAD`（失敗時は None）
pub fn git_short_hash(dir: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .current_dir(dir)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!hash.is_empty()).then_some(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)]) -> TempDir {
        let temp = tempfile::tempdir().unwrap();
        for (name, content) in files {
            fs::write(temp.path().join(name), content).unwrap();
        }
        temp
    }

    #[test]
    #[serial]
    fn test_load_with_overrides_in_order() {
        let temp = project(&[
            (
                "infra.kdl",
                r#"
                project "conduit" id="base-project"
                release version="1.0.0" git-hash="aaaaaaa"
                app replicas=2
                "#,
            ),
            ("infra.prod.kdl", r#"app replicas=5"#),
            ("infra.local.kdl", r#"release log-level="DEBUG""#),
        ]);

        let config = temp_env::with_var_unset("INFRA_GIT_HASH", || {
            load_project_from_root(temp.path(), "prod")
        })
        .unwrap();
        assert_eq!(config.project.id, "base-project");
        assert_eq!(config.app.replicas, 5);
        assert_eq!(config.release.log_level, "DEBUG");
        assert_eq!(config.project.environment, "prod");
        assert_eq!(config.release.tag().as_deref(), Some("1.0.0-aaaaaaa"));
    }

    #[test]
    #[serial]
    fn test_load_template_from_variables_and_env_file() {
        let temp = project(&[
            (
                "infra.kdl",
                r#"
                variables {
                    REGION "us-east1"
                }
                project "conduit" id="{{ PROJECT_ID }}" region="{{ REGION }}"
                release version="1.0.0" git-hash="bbbbbbb"
                "#,
            ),
            (".env", "PROJECT_ID=from-dotenv\n"),
            (".env.prod", "PROJECT_ID=from-prod-env\n"),
        ]);

        let dev = load_project_from_root(temp.path(), "dev").unwrap();
        assert_eq!(dev.project.id, "from-dotenv");
        assert_eq!(dev.project.region, "us-east1");

        let prod = load_project_from_root(temp.path(), "prod").unwrap();
        assert_eq!(prod.project.id, "from-prod-env");
    }

    #[test]
    #[serial]
    fn test_environment_variable_wins() {
        let temp = project(&[
            (
                "infra.kdl",
                r#"
                variables {
                    INFRA_REGION "us-east1"
                }
                project "conduit" id="p-1" region="{{ INFRA_REGION }}"
                "#,
            ),
        ]);

        let config = temp_env::with_var("INFRA_REGION", Some("europe-west4"), || {
            load_project_from_root(temp.path(), "dev")
        })
        .unwrap();
        assert_eq!(config.project.region, "europe-west4");
    }

    #[test]
    #[serial]
    fn test_version_from_file_and_hash_from_env() {
        let temp = project(&[
            ("infra.kdl", r#"project "conduit" id="p-1""#),
            ("VERSION.txt", "2.3.4\n"),
        ]);

        let config = temp_env::with_var("INFRA_GIT_HASH", Some("cafe123"), || {
            load_project_from_root(temp.path(), "dev")
        })
        .unwrap();
        assert_eq!(config.release.version.as_deref(), Some("2.3.4"));
        assert_eq!(config.release.git_hash.as_deref(), Some("cafe123"));
    }

    #[test]
    #[serial]
    fn test_validation_error_surfaces() {
        let temp = project(&[("infra.kdl", r#"project "conduit""#)]);
        let result = load_project_from_root(temp.path(), "dev");
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
    }

    #[test]
    #[serial]
    fn test_undefined_template_variable() {
        let temp = project(&[("infra.kdl", r#"project "conduit" id="{{ NOPE }}""#)]);
        let result = load_project_from_root(temp.path(), "dev");
        assert!(matches!(result, Err(InfraError::TemplateError { .. })));
    }
}
