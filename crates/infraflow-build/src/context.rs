use crate::error::{BuildError, BuildResult};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::Path;
use tar::Builder;

const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024; // 500MB

pub struct ContextBuilder;

impl ContextBuilder {
    /// ビルドコンテキストをtar.gzアーカイブとして作成
    ///
    /// Dockerfile はコンテキストの直下にある前提。
    pub fn create_context(context_path: &Path) -> BuildResult<Vec<u8>> {
        if !context_path.is_dir() {
            return Err(BuildError::ContextNotFound(context_path.to_path_buf()));
        }
        let dockerfile = context_path.join("Dockerfile");
        if !dockerfile.is_file() {
            return Err(BuildError::DockerfileNotFound(dockerfile));
        }

        tracing::debug!("Creating build context from: {}", context_path.display());

        let mut archive_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(encoder);
            tar.append_dir_all(".", context_path)?;
            tar.into_inner()?.finish()?;
        }

        tracing::debug!("Build context created: {} bytes", archive_data.len());
        Self::check_context_size(archive_data.len());

        Ok(archive_data)
    }

    fn check_context_size(size: usize) {
        if size > MAX_CONTEXT_SIZE {
            tracing::warn!(
                "警告: ビルドコンテキストが大きすぎます（{}MB）\n\
                 .dockerignoreファイルで不要なファイルを除外することを推奨します。",
                size / 1024 / 1024
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_create_context() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("main.py"), "print('ok')").unwrap();
        let subdir = temp_dir.path().join("app");
        fs::create_dir(&subdir).unwrap();
        fs::write(subdir.join("settings.py"), "DEBUG = False").unwrap();
        fs::write(
            temp_dir.path().join("Dockerfile"),
            "FROM python:3.11 AS api\nCOPY . /app",
        )
        .unwrap();

        let archive = ContextBuilder::create_context(temp_dir.path()).unwrap();
        assert!(!archive.is_empty());

        // tarアーカイブとして展開できるか確認
        let extract_dir = tempdir().unwrap();
        let decoder = flate2::read::GzDecoder::new(std::io::Cursor::new(archive));
        tar::Archive::new(decoder).unpack(extract_dir.path()).unwrap();

        assert!(extract_dir.path().join("Dockerfile").exists());
        assert!(extract_dir.path().join("app/settings.py").exists());
    }

    #[test]
    fn test_create_context_missing_dockerfile() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("main.py"), "").unwrap();

        assert!(matches!(
            ContextBuilder::create_context(temp_dir.path()),
            Err(BuildError::DockerfileNotFound(_))
        ));
    }

    #[test]
    fn test_create_context_missing_dir() {
        let temp_dir = tempdir().unwrap();
        assert!(matches!(
            ContextBuilder::create_context(&temp_dir.path().join("nope")),
            Err(BuildError::ContextNotFound(_))
        ));
    }
}
