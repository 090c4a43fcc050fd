use crate::project::Project;
use crate::utils;
use colored::Colorize;
use infraflow_cloud::Plan;

pub async fn handle(project: &Project) -> anyhow::Result<()> {
    println!(
        "{}",
        format!("スタック '{}' の変更を確認中...", project.stack)
            .blue()
            .bold()
    );

    let state = project.state.load().await?;
    // 記録済みのシークレットを復号できないと、差分が常に更新扱いになる
    let mut vault = project.vault(&state, !state.secrets.is_empty())?;
    let composition = project.compose(&state, &mut vault)?;

    let report = infraflow_stack::check(&composition);
    utils::print_report(&report);
    if !report.is_ok() {
        anyhow::bail!("構造チェックに失敗しました");
    }

    let exports = composition.exports.clone();
    let deferred = composition.deferred.clone();
    let graph = composition.into_graph()?;
    let plan = Plan::diff(&graph, &state, deferred)?;
    utils::print_plan(&plan);
    utils::print_exports(&exports);
    Ok(())
}
