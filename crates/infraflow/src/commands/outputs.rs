use crate::project::Project;
use crate::utils;
use colored::Colorize;
use infraflow_cloud::Output;

/// 記録済みのプロバイダー出力とエクスポートを一覧表示
pub async fn list(project: &Project) -> anyhow::Result<()> {
    let state = project.state.load().await?;

    println!("{}", "プロバイダー出力:".bold());
    if state.outputs.is_empty() {
        println!("  {}", "(なし)".dimmed());
    }
    for (key, value) in &state.outputs {
        println!("  {} = {}", key.cyan(), display_value(value));
    }

    let mut vault = project.vault(&state, false)?;
    let composition = project.compose(&state, &mut vault)?;
    utils::print_exports(&composition.exports);
    Ok(())
}

/// 出力キー（`kind/name.attribute`）またはエクスポート名の値を表示
pub async fn get(project: &Project, key: &str) -> anyhow::Result<()> {
    let state = project.state.load().await?;
    if let Some(value) = state.outputs.get(key) {
        println!("{}", display_value(value));
        return Ok(());
    }

    let mut vault = project.vault(&state, false)?;
    let composition = project.compose(&state, &mut vault)?;
    match composition.exports.get(key) {
        Some(Output::Known(value)) => {
            println!("{}", value);
            Ok(())
        }
        Some(Output::Pending(pending)) => Err(anyhow::anyhow!(
            "'{}' はまだ確定していません（{} が未記録）",
            key,
            pending
        )),
        None => Err(anyhow::anyhow!("出力 '{}' は見つかりません", key)),
    }
}

/// プロバイダー出力を手動で記録
pub async fn set(project: &Project, key: &str, value: &str) -> anyhow::Result<()> {
    let (resource, attribute) = utils::parse_output_key(key)?;

    let lock = project.state.acquire_lock().await?;
    let result = async {
        let mut state = project.state.load().await?;
        state.set_output(&resource, &attribute, serde_json::Value::String(value.to_string()));
        project.state.save(&state).await?;
        anyhow::Ok(())
    }
    .await;
    lock.release().await?;
    result?;

    println!("{} {} = {}", "✓".green(), key.cyan(), value);
    Ok(())
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
