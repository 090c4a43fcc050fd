//! テンプレート展開機能
//!
//! Tera で infra.kdl を KDL パース前に展開します。
//! 変数の優先順位（後勝ち）: `variables {}` ブロック → .env → .env.{stack} → 環境変数

use crate::error::{InfraError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use tera::{Context, Tera};
use tracing::{debug, info};

/// 変数コンテキスト
pub type Variables = HashMap<String, serde_json::Value>;

/// テンプレートに取り込む環境変数のプレフィックス
pub const ENV_PREFIXES: &[&str] = &["INFRA_", "CI_"];

/// テンプレートプロセッサ
pub struct TemplateProcessor {
    tera: Tera,
    context: Context,
}

impl TemplateProcessor {
    pub fn new() -> Self {
        Self {
            tera: Tera::default(),
            context: Context::new(),
        }
    }

    /// 変数を追加
    pub fn add_variable(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.context.insert(key.into(), &value);
    }

    /// 複数の変数を追加
    pub fn add_variables(&mut self, variables: Variables) {
        for (key, value) in variables {
            self.context.insert(key, &value);
        }
    }

    /// INFRA_* / CI_* の環境変数を追加
    ///
    /// それ以外の環境変数は `{{ get_env(name="X") }}` で明示的に参照する。
    #[tracing::instrument(skip(self))]
    pub fn add_env_variables(&mut self) {
        let mut count = 0;
        for (key, value) in std::env::vars() {
            if ENV_PREFIXES.iter().any(|prefix| key.starts_with(prefix)) {
                debug!(key = %key, "Adding environment variable");
                self.context.insert(key, &serde_json::Value::String(value));
                count += 1;
            }
        }
        info!(env_var_count = count, "Added filtered environment variables");
    }

    /// .env 形式のファイルから変数を追加
    #[tracing::instrument(skip(self))]
    pub fn add_env_file_variables(&mut self, env_file_path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(env_file_path).map_err(|e| InfraError::IoError {
            path: env_file_path.to_path_buf(),
            message: e.to_string(),
        })?;

        let vars = parse_env_file(&content);
        info!(
            env_file = %env_file_path.display(),
            variable_count = vars.len(),
            "Loaded variables from env file"
        );
        for (key, value) in vars {
            self.context.insert(key, &serde_json::Value::String(value));
        }
        Ok(())
    }

    /// 文字列をテンプレートとして展開
    pub fn render_str(&mut self, template: &str) -> Result<String> {
        self.tera
            .render_str(template, &self.context)
            .map_err(|e| InfraError::TemplateRenderError(describe_tera_error(&e)))
    }

    /// ファイルを読み込んでテンプレート展開
    pub fn render_file(&mut self, path: &Path) -> Result<String> {
        let content = std::fs::read_to_string(path).map_err(|e| InfraError::IoError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        self.render_str(&content).map_err(|e| match e {
            InfraError::TemplateRenderError(message) => InfraError::TemplateError {
                file: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }
}

impl Default for TemplateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// `KEY=VALUE` 形式をパース（空行・`#` コメント・`export` 接頭辞に対応）
pub fn parse_env_file(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            Some((key.trim().to_string(), strip_quotes(value.trim()).to_string()))
        })
        .collect()
}

/// KDL テキストから `variables {}` ブロックを抽出
///
/// テンプレート展開前のテキストは KDL として不正な場合があるため、
/// ブロック単位で切り出してパースする。`stack` を指定すると
/// `stack "name" {}` 内の variables がトップレベルを上書きする。
pub fn extract_variables(kdl_content: &str, stack: Option<&str>) -> Result<Variables> {
    let stack_re = Regex::new(r#"stack\s+"([^"]+)"\s*\{"#)
        .map_err(|e| InfraError::InvalidConfig(format!("正規表現のコンパイルエラー: {}", e)))?;

    let mut top_level = String::with_capacity(kdl_content.len());
    let mut selected = Vec::new();
    let mut last_end = 0;
    for cap in stack_re.captures_iter(kdl_content) {
        let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        if whole.start() < last_end {
            continue;
        }
        let Some(close) = find_matching_brace(kdl_content, whole.end() - 1) else {
            continue;
        };
        top_level.push_str(&kdl_content[last_end..whole.start()]);
        if Some(name.as_str()) == stack {
            selected.push(&kdl_content[whole.end()..close]);
        }
        last_end = close + 1;
    }
    top_level.push_str(&kdl_content[last_end..]);

    let mut vars = variables_in(&top_level)?;
    for block in selected {
        vars.extend(variables_in(block)?);
    }
    Ok(vars)
}

fn variables_in(content: &str) -> Result<Variables> {
    let re = Regex::new(r"variables\s*\{")
        .map_err(|e| InfraError::InvalidConfig(format!("正規表現のコンパイルエラー: {}", e)))?;

    let mut vars = HashMap::new();
    for mat in re.find_iter(content) {
        let Some(close) = find_matching_brace(content, mat.end() - 1) else {
            continue;
        };
        let block = format!("variables {{\n{}\n}}", &content[mat.end()..close]);
        let doc: kdl::KdlDocument = block.parse().map_err(|e| {
            InfraError::InvalidConfig(format!("variables ブロックのパースエラー: {}", e))
        })?;
        let children = doc.nodes().first().and_then(|node| node.children());
        for var in children.iter().flat_map(|c| c.nodes()) {
            if let Some(entry) = var.entries().first() {
                vars.insert(var.name().value().to_string(), kdl_value_to_json(entry.value()));
            }
        }
    }
    Ok(vars)
}

/// 対応する閉じ波括弧の位置（文字列リテラル内は無視）
fn find_matching_brace(content: &str, open_pos: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    if bytes.get(open_pos) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &c) in bytes[open_pos..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(open_pos + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_quotes(s: &str) -> &str {
    let quoted = s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')));
    if quoted { &s[1..s.len() - 1] } else { s }
}

fn kdl_value_to_json(value: &kdl::KdlValue) -> serde_json::Value {
    if let Some(s) = value.as_string() {
        serde_json::Value::String(s.to_string())
    } else if let Some(i) = value.as_integer() {
        i64::try_from(i)
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::String(i.to_string()))
    } else if let Some(f) = value.as_float() {
        serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    } else if let Some(b) = value.as_bool() {
        serde_json::Value::Bool(b)
    } else {
        serde_json::Value::Null
    }
}

/// Tera のエラーチェーンから利用者向けのメッセージを作る
fn describe_tera_error(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }
    let full = details.join(" | ");

    let undefined = Regex::new(r"Variable `([^`]+)` not found in context")
        .ok()
        .and_then(|re| re.captures(&full))
        .and_then(|cap| cap.get(1).map(|m| m.as_str().to_string()));

    match undefined {
        Some(name) => format!(
            "未定義の変数: `{}`\nヒント: variables ブロック、.env、または INFRA_{} 環境変数で定義してください",
            name, name
        ),
        None => full,
    }
}
