use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InfraError {
    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("テンプレートエラー: {file}\n理由: {message}")]
    TemplateError { file: PathBuf, message: String },

    #[error("テンプレート展開エラー: {0}")]
    TemplateRenderError(String),

    #[error(
        "プロジェクトルートが見つかりません\n探索開始位置: {0}\nヒント: infra.kdl ファイルを含むディレクトリで実行してください"
    )]
    ProjectRootNotFound(PathBuf),

    #[error("スタックが見つかりません: {0}")]
    StackNotFound(String),
}

pub type Result<T> = std::result::Result<T, InfraError>;
