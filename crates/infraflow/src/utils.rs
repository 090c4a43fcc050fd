use colored::Colorize;
use infraflow_cloud::{ActionType, Output, Plan, ResourceId};
use infraflow_config::Settings;
use infraflow_stack::{CheckReport, CheckStatus};
use std::collections::BTreeMap;

/// スタック名を決定する（引数 → INFRA_STACK → ユーザー設定）
pub fn determine_stack_name(stack: Option<String>, settings: &Settings) -> anyhow::Result<String> {
    if let Some(stack) = stack.filter(|s| !s.is_empty()) {
        return Ok(stack);
    }
    if let Some(stack) = &settings.default_stack {
        return Ok(stack.clone());
    }
    Err(anyhow::anyhow!(
        "スタック名を指定してください: infra <command> <stack> または INFRA_STACK=<stack>"
    ))
}

/// `kind/name.attribute` を (`kind/name`, `attribute`) に分ける
pub fn parse_output_key(key: &str) -> anyhow::Result<(String, String)> {
    let (resource, attribute) = key
        .rsplit_once('.')
        .filter(|(_, attribute)| !attribute.is_empty())
        .ok_or_else(|| anyhow::anyhow!("出力キーは kind/name.attribute の形式です: {}", key))?;
    if ResourceId::parse(resource).is_none() {
        return Err(anyhow::anyhow!("リソースIDは kind/name の形式です: {}", resource));
    }
    Ok((resource.to_string(), attribute.to_string()))
}

pub fn print_report(report: &CheckReport) {
    println!("{}", "構造チェック:".bold());
    for result in &report.results {
        let description = result.check.description();
        match &result.status {
            CheckStatus::Passed => println!("  {} {}", "✓".green(), description),
            CheckStatus::Skipped { reason } => {
                println!("  {} {} ({})", "-".dimmed(), description, reason.dimmed())
            }
            CheckStatus::Failed { findings } => {
                println!("  {} {}", "✗".red(), description.red());
                for finding in findings {
                    println!("      {}", finding);
                }
            }
        }
    }
}

pub fn print_plan(plan: &Plan) {
    println!();
    println!("{}", "実行計画:".bold());
    for action in &plan.actions {
        let line = format!(
            "  {} {} ({})",
            action.action_type.symbol(),
            action.resource_id,
            action.provider
        );
        let line = match action.action_type {
            ActionType::Create => line.green(),
            ActionType::Update => line.yellow(),
            ActionType::Delete => line.red(),
            ActionType::NoOp => line.dimmed(),
        };
        println!("{}", line);
    }
    for deferred in &plan.deferred {
        println!(
            "  {} {} {}",
            "…".cyan(),
            deferred.id,
            format!("({} 待ち)", deferred.waiting_on).dimmed()
        );
    }
    println!();
    println!("{}", plan.summary().to_string().bold());
}

pub fn print_exports(exports: &BTreeMap<String, Output<String>>) {
    if exports.is_empty() {
        return;
    }
    println!();
    println!("{}", "エクスポート:".bold());
    for (name, address) in exports {
        match address {
            Output::Known(address) => println!("  {} = {}", name.cyan(), address),
            Output::Pending(pending) => println!(
                "  {} = {}",
                name.cyan(),
                format!("(未確定: {})", pending).dimmed()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determine_stack_name() {
        let settings = Settings {
            default_stack: Some("dev".to_string()),
            ..Default::default()
        };
        assert_eq!(
            determine_stack_name(Some("prod".to_string()), &settings).unwrap(),
            "prod"
        );
        assert_eq!(determine_stack_name(None, &settings).unwrap(), "dev");
        assert!(determine_stack_name(None, &Settings::default()).is_err());
    }

    #[test]
    fn test_parse_output_key() {
        assert_eq!(
            parse_output_key("gke-cluster/cluster.endpoint").unwrap(),
            ("gke-cluster/cluster".to_string(), "endpoint".to_string())
        );
        assert_eq!(
            parse_output_key("service/app.address").unwrap(),
            ("service/app".to_string(), "address".to_string())
        );
        assert!(parse_output_key("endpoint").is_err());
        assert!(parse_output_key("cluster.endpoint").is_err());
        assert!(parse_output_key("service/app.").is_err());
    }
}
