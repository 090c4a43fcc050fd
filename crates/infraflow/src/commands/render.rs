use crate::project::Project;
use clap::ValueEnum;
use infraflow_stack::Bundle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RenderFormat {
    /// Kubernetes マニフェスト（マルチドキュメント YAML）
    Yaml,
    /// バンドル全体（Kubernetes / GCP / イメージ）
    Json,
}

/// シークレットを伏せたままマニフェストを表示
pub async fn handle(project: &Project, format: RenderFormat) -> anyhow::Result<()> {
    let state = project.state.load().await?;
    let mut vault = project.vault(&state, false)?;
    let composition = project.compose(&state, &mut vault)?;

    let kubeconfig = composition.kubeconfig.clone();
    let graph = composition.into_graph()?;
    let bundle = Bundle::display(&graph, &kubeconfig)?;

    match format {
        RenderFormat::Yaml => print!("{}", bundle.kubernetes_yaml()?),
        RenderFormat::Json => println!("{}", bundle.to_json()?),
    }
    Ok(())
}
