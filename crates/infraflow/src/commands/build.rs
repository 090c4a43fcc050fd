use crate::project::Project;
use colored::Colorize;
use infraflow_build::{
    BuildProgress, ContextBuilder, ImageBuilder, ImagePusher, StackImage,
    artifact_registry_credentials, stack_images,
};
use infraflow_cloud::Gcloud;

pub async fn handle(
    project: &Project,
    image: Option<&str>,
    push: bool,
    no_cache: bool,
) -> anyhow::Result<()> {
    println!(
        "{}",
        format!("スタック '{}' のイメージをビルド中...", project.stack)
            .blue()
            .bold()
    );
    let pushed = build_images(project, image, push, no_cache).await?;

    println!();
    if push {
        println!("{}", format!("✓ {} 個のイメージをプッシュしました", pushed.len()).green().bold());
    } else {
        println!("{}", format!("✓ {} 個のイメージをビルドしました", pushed.len()).green().bold());
    }
    Ok(())
}

/// スタックのイメージをビルド（`push` ならプッシュも）し、参照の一覧を返す
pub async fn build_images(
    project: &Project,
    only: Option<&str>,
    push: bool,
    no_cache: bool,
) -> anyhow::Result<Vec<String>> {
    let images = select_images(stack_images(&project.config)?, only)?;

    let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
        anyhow::anyhow!(
            "Dockerに接続できません: {}\nヒント: Docker デーモンが起動しているか確認してください",
            e
        )
    })?;
    let builder = ImageBuilder::new(docker.clone());

    let pusher = if push {
        println!("{}", "Artifact Registry の認証情報を取得中...".blue());
        let token = Gcloud::new(&project.config.project.id)
            .print_access_token()
            .await?;
        let credentials = artifact_registry_credentials(&project.config.registry.host, token.expose());
        Some(ImagePusher::new(docker, Some(credentials)))
    } else {
        None
    };

    let mut references = Vec::with_capacity(images.len());
    for image in images {
        let reference = image.reference.to_string();
        println!();
        println!("{} {}", "▶".blue(), reference.cyan().bold());

        let context_path = project.root.join(&image.spec.context);
        let progress = BuildProgress::new(&image.name);
        progress.set_message("ビルドコンテキストを作成中...");
        let context = match ContextBuilder::create_context(&context_path) {
            Ok(context) => {
                progress.finish_success();
                context
            }
            Err(e) => {
                progress.finish_error(&e.to_string());
                return Err(anyhow::anyhow!(e.user_message()));
            }
        };

        builder
            .build_image(context, &reference, image.spec.target.as_deref(), no_cache)
            .await?;

        if let Some(pusher) = &pusher {
            pusher
                .push(&image.reference.repository_path(), &image.reference.tag)
                .await?;
        }
        references.push(reference);
    }
    Ok(references)
}

fn select_images(images: Vec<StackImage>, only: Option<&str>) -> anyhow::Result<Vec<StackImage>> {
    let Some(name) = only else {
        return Ok(images);
    };
    let available: Vec<String> = images.iter().map(|i| i.name.clone()).collect();
    let selected: Vec<StackImage> = images.into_iter().filter(|i| i.name == name).collect();
    if selected.is_empty() {
        anyhow::bail!(
            "イメージ '{}' はこのスタックにありません。利用可能: {}",
            name,
            available.join(", ")
        );
    }
    Ok(selected)
}
