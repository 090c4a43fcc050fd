use crate::project::Project;
use crate::utils;
use colored::Colorize;

pub async fn handle(project: &Project) -> anyhow::Result<()> {
    println!(
        "{}",
        format!("スタック '{}' を検証中...", project.stack).blue()
    );

    let state = project.state.load().await?;
    let mut vault = project.vault(&state, false)?;
    let composition = project.compose(&state, &mut vault)?;

    let report = infraflow_stack::check(&composition);
    utils::print_report(&report);

    if !report.is_ok() {
        let failed = report.failures().count();
        anyhow::bail!("{}件のチェックに失敗しました", failed);
    }

    println!();
    println!(
        "{}",
        format!(
            "✓ {} 個のリソースはすべてのチェックを通過しました",
            composition.resources.len()
        )
        .green()
        .bold()
    );
    Ok(())
}
