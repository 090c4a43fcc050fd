//! Docker API によるイメージビルド
//!
//! マルチステージの Dockerfile から `target` ステージだけをビルドする。

use crate::error::{BuildError, BuildResult};
use bollard::Docker;
use bollard::image::BuildImageOptions;
use bytes::Bytes;
use colored::Colorize;
use futures_util::stream::StreamExt;
use http_body_util::{Either, Full};
use std::collections::HashMap;

/// bollard 経由でイメージをビルドする
pub struct ImageBuilder {
    docker: Docker,
}

impl ImageBuilder {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// イメージをビルド
    pub async fn build_image(
        &self,
        context_data: Vec<u8>,
        tag: &str,
        target: Option<&str>,
        no_cache: bool,
    ) -> BuildResult<()> {
        tracing::info!(image = %tag, target = ?target, "Building image");

        let options = BuildImageOptions {
            dockerfile: "Dockerfile",
            t: tag,
            buildargs: HashMap::new(),
            target: target.unwrap_or(""),
            nocache: no_cache,
            rm: true,      // 中間コンテナを削除
            forcerm: true, // ビルド失敗時も中間コンテナを削除
            pull: true,    // ベースイメージを常にpull
            ..Default::default()
        };

        let body = Full::new(Bytes::from(context_data));
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        while let Some(msg) = stream.next().await {
            self.handle_build_output(msg?)?;
        }

        tracing::info!(image = %tag, "Successfully built");
        Ok(())
    }

    /// ビルド出力の処理
    fn handle_build_output(&self, output: bollard::models::BuildInfo) -> BuildResult<()> {
        if let Some(stream) = output.stream {
            print!("{}", stream);
        }

        if let Some(error) = output.error {
            return Err(BuildError::BuildFailed(error));
        }

        if let Some(error_detail) = output.error_detail {
            let error_msg = error_detail
                .message
                .unwrap_or_else(|| "Unknown build error".to_string());
            return Err(BuildError::BuildFailed(error_msg));
        }

        // pull などのステータスメッセージ
        if let Some(status) = output.status {
            println!("{}", status.cyan());
        }

        Ok(())
    }

    /// イメージの存在確認
    pub async fn image_exists(&self, image_tag: &str) -> BuildResult<bool> {
        match self.docker.inspect_image(image_tag).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(BuildError::DockerConnection(e)),
        }
    }
}
