//! イメージプッシュ処理
//!
//! ビルドしたイメージを Artifact Registry にプッシュします。

use crate::error::{BuildError, BuildResult};
use crate::image::validate_tag;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::models::PushImageInfo;
use colored::Colorize;
use futures_util::StreamExt;
use std::io::Write;

/// Artifact Registry にアクセストークンで認証するときのユーザー名
pub const ACCESS_TOKEN_USERNAME: &str = "oauth2accesstoken";

/// イメージプッシュを実行するハンドラ
pub struct ImagePusher {
    docker: Docker,
    credentials: Option<DockerCredentials>,
}

impl ImagePusher {
    pub fn new(docker: Docker, credentials: Option<DockerCredentials>) -> Self {
        Self {
            docker,
            credentials,
        }
    }

    /// イメージをレジストリにプッシュ
    ///
    /// # Arguments
    /// * `image` - イメージ名（レジストリ込み、タグなし）
    /// * `tag` - イメージタグ
    ///
    /// # Returns
    /// プッシュ成功時は完全なイメージ名を返す
    pub async fn push(&self, image: &str, tag: &str) -> BuildResult<String> {
        let full_image = format!("{}:{}", image, tag);
        validate_tag(tag)?;

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> {
            tag: tag.to_string(),
        };

        println!("  → {}", full_image.cyan());

        #[allow(deprecated)]
        let mut stream = self
            .docker
            .push_image(image, Some(options), self.credentials.clone());

        let mut last_status = String::new();
        let mut error_message: Option<String> = None;

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(err) = info.error {
                        error_message = Some(err);
                    } else {
                        handle_progress(&info, &mut last_status);
                    }
                }
                Err(e) => {
                    return Err(BuildError::PushFailed {
                        message: e.to_string(),
                    });
                }
            }
        }

        println!();

        if let Some(err) = error_message {
            return Err(BuildError::PushFailed { message: err });
        }

        tracing::info!(image = %full_image, "Pushed image");
        Ok(full_image)
    }
}

fn handle_progress(info: &PushImageInfo, last_status: &mut String) {
    let Some(status) = &info.status else {
        return;
    };
    let progress = info.progress.as_deref().unwrap_or("");

    match status.as_str() {
        "Pushing" => {
            print!("\r  ↑ {} {}     ", status, progress);
            std::io::stdout().flush().ok();
        }
        "Pushed" => {
            println!("\r  {} Pushed                    ", "✓".green());
        }
        "Layer already exists" => {
            println!("\r  {} Layer already exists      ", "✓".green());
        }
        "Preparing" | "Waiting" => {}
        _ => {
            if status != last_status {
                println!("\r  ℹ {}                    ", status);
                *last_status = status.clone();
            }
        }
    }
}

/// gcloud のアクセストークンから Artifact Registry 用の認証情報を作る
pub fn artifact_registry_credentials(host: &str, access_token: &str) -> DockerCredentials {
    DockerCredentials {
        username: Some(ACCESS_TOKEN_USERNAME.to_string()),
        password: Some(access_token.to_string()),
        serveraddress: Some(format!("https://{}", host)),
        ..Default::default()
    }
}

/// イメージ名とタグを分離
///
/// # Examples
/// - `us-docker.pkg.dev/p/docker/api:1.0-abc` -> `("us-docker.pkg.dev/p/docker/api", "1.0-abc")`
/// - `us-docker.pkg.dev/p/docker/api` -> `("us-docker.pkg.dev/p/docker/api", "latest")`
/// - `localhost:5000/app` -> `("localhost:5000/app", "latest")`
pub fn split_image_tag(image: &str) -> (String, String) {
    if let Some(pos) = image.rfind(':') {
        let potential_tag = &image[pos + 1..];
        let potential_image = &image[..pos];

        // ポート番号は / を含まない純粋な数字
        if !potential_tag.contains('/') && !potential_tag.chars().all(|c| c.is_ascii_digit()) {
            return (potential_image.to_string(), potential_tag.to_string());
        }
    }

    (image.to_string(), "latest".to_string())
}
