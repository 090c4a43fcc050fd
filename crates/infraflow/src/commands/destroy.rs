use crate::project::Project;
use colored::Colorize;
use infraflow_cloud::ResourceRecord;
use serde_json::json;
use std::path::Path;

pub const DESTROY_FILE: &str = "destroy.json";

/// 削除対象を依存の逆順で書き出し、スナップショットを消去する
pub async fn handle(
    project: &Project,
    out: Option<&Path>,
    yes: bool,
    forget_secrets: bool,
) -> anyhow::Result<()> {
    println!(
        "{}",
        format!("スタック '{}' を削除します", project.stack)
            .yellow()
            .bold()
    );

    let lock = project.state.acquire_lock().await?;
    let result = run(project, out, yes, forget_secrets).await;
    lock.release().await?;
    result
}

async fn run(
    project: &Project,
    out: Option<&Path>,
    yes: bool,
    forget_secrets: bool,
) -> anyhow::Result<()> {
    let mut state = project.state.load().await?;
    if state.resources.is_empty() {
        println!("{}", "記録されたリソースはありません".dimmed());
        return Ok(());
    }

    let mut records: Vec<&ResourceRecord> = state.resources.values().collect();
    records.sort_by_key(|r| std::cmp::Reverse(r.order));

    println!();
    println!("{}", "削除対象（この順で削除）:".bold());
    for record in &records {
        println!("  {} {} ({})", "-".red(), record.id, record.provider);
    }

    if !yes {
        println!();
        println!(
            "{}",
            "⚠ 警告: 記録済みのリソースをすべて削除対象にします".red().bold()
        );
        println!("実行するには --yes オプションを指定してください");
        return Ok(());
    }

    let manifest: Vec<_> = records
        .iter()
        .map(|r| {
            json!({
                "id": r.id.to_string(),
                "provider": r.provider,
                "dependsOn": r.depends_on.iter().map(ToString::to_string).collect::<Vec<_>>(),
            })
        })
        .collect();
    let dir = project.output_dir(out);
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(DESTROY_FILE);
    tokio::fs::write(&path, serde_json::to_string_pretty(&manifest)?).await?;

    state.clear(forget_secrets);
    project.state.save(&state).await?;

    println!();
    println!("{} {}", "✓ 削除リストを書き出しました:".green(), path.display().to_string().cyan());
    if forget_secrets {
        println!("  生成済みシークレットも破棄しました");
    } else {
        println!("  生成済みシークレットは保持しています（--forget-secrets で破棄）");
    }
    Ok(())
}
