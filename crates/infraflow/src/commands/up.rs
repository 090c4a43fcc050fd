use crate::commands::build;
use crate::project::Project;
use crate::utils;
use colored::Colorize;
use infraflow_cloud::Plan;
use infraflow_stack::Bundle;
use std::path::PathBuf;

pub struct UpOptions {
    pub out: Option<PathBuf>,
    pub build: bool,
    pub push: bool,
    pub yes: bool,
}

/// 組み立て・検証・バンドル出力・スナップショット記録
pub async fn handle(project: &Project, options: UpOptions) -> anyhow::Result<()> {
    println!(
        "{}",
        format!("スタック '{}' を展開中...", project.stack).blue().bold()
    );

    let lock = project.state.acquire_lock().await?;
    let result = run(project, &options).await;
    lock.release().await?;
    result
}

async fn run(project: &Project, options: &UpOptions) -> anyhow::Result<()> {
    let mut state = project.state.load().await?;
    // 生成したシークレットを保存できないと実行のたびに値が変わる
    let mut vault = project.vault(&state, true)?;
    let composition = project.compose(&state, &mut vault)?;

    let report = infraflow_stack::check(&composition);
    utils::print_report(&report);
    if !report.is_ok() {
        anyhow::bail!("構造チェックに失敗しました。バンドルは書き出していません");
    }

    let exports = composition.exports.clone();
    let kubeconfig = composition.kubeconfig.clone();
    let deferred = composition.deferred.clone();
    let graph = composition.into_graph()?;
    let plan = Plan::diff(&graph, &state, deferred.clone())?;
    utils::print_plan(&plan);

    if !options.yes {
        println!();
        println!("実行するには --yes オプションを指定してください");
        return Ok(());
    }

    if options.build || options.push {
        println!();
        println!("{}", "イメージをビルド中...".blue());
        build::build_images(project, None, options.push, false).await?;
    }

    let dir = project.output_dir(options.out.as_deref());
    let bundle = Bundle::from_graph(&graph, &kubeconfig)?;
    let written = bundle.write_to(&dir)?;

    let keep: Vec<_> = deferred.iter().map(|d| d.id.clone()).collect();
    state.record_graph_keeping(&graph, &keep)?;
    state.secrets = vault.into_entries();
    project.state.save(&state).await?;

    println!();
    println!("{}", "✓ バンドルを書き出しました:".green().bold());
    for path in &written {
        println!("  • {}", path.display().to_string().cyan());
    }
    utils::print_exports(&exports);

    if !deferred.is_empty() {
        println!();
        println!(
            "{}",
            format!(
                "ℹ {} 個のリソースは出力の記録待ちです。infra refresh の後にもう一度 up を実行してください",
                deferred.len()
            )
            .yellow()
        );
    }
    Ok(())
}
