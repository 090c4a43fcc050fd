use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Dockerfile not found: {0}")]
    DockerfileNotFound(PathBuf),

    #[error("Build context directory not found: {0}")]
    ContextNotFound(PathBuf),

    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Push failed: {message}")]
    PushFailed { message: String },

    #[error("Invalid image tag: {tag}")]
    InvalidTag { tag: String },

    #[error("Unknown image: {0}")]
    UnknownImage(String),

    #[error("Version file error: {path}: {message}")]
    VersionFile { path: PathBuf, message: String },

    #[error("Invalid build configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::DockerfileNotFound(path) => {
                format!(
                    "Dockerfileが見つかりません: {}\n\
                     \n\
                     解決方法:\n\
                     1. ビルドコンテキストの直下に Dockerfile を置いてください\n\
                     2. infra.kdl の image ノードで context を確認してください:\n\
                        image \"api\" context=\"../app\" target=\"api\"",
                    path.display()
                )
            }
            BuildError::ContextNotFound(path) => {
                format!(
                    "ビルドコンテキストが見つかりません: {}\n\
                     \n\
                     infra.kdl の app / image ノードの context パスを確認してください。",
                    path.display()
                )
            }
            BuildError::BuildFailed(msg) => {
                format!(
                    "ビルドに失敗しました: {}\n\
                     \n\
                     Dockerfile の内容とターゲットステージ名を確認してください。",
                    msg
                )
            }
            BuildError::PushFailed { message } => {
                format!(
                    "プッシュに失敗しました: {}\n\
                     \n\
                     解決方法:\n\
                     1. gcloud auth login で認証してください\n\
                     2. Artifact Registry のリポジトリが存在するか確認してください",
                    message
                )
            }
            BuildError::DockerConnection(_) => {
                format!(
                    "{}\n\nDocker デーモンが起動しているか確認してください。",
                    self
                )
            }
            _ => format!("{}", self),
        }
    }
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;
