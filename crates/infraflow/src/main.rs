mod commands;
mod project;
mod utils;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use commands::render::RenderFormat;
use commands::up::UpOptions;
use project::Project;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "infra")]
#[command(about = "GKE と Cloud SQL のスタックを KDL で宣言し、オーケストレーションエンジン向けに書き出す", long_about = None)]
struct Cli {
    /// デバッグログを表示
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// スタックの指定（位置引数、-s/--stack、INFRA_STACK）
#[derive(Args, Debug, Clone)]
struct StackArg {
    /// スタック名 (dev, staging, prod, bench ...)
    stack: Option<String>,
    /// スタック名 (-s/--stack フラグ、INFRA_STACK 環境変数)
    #[arg(
        short = 's',
        long = "stack",
        env = "INFRA_STACK",
        conflicts_with = "stack",
        hide = true
    )]
    stack_flag: Option<String>,
}

impl StackArg {
    fn name(self) -> Option<String> {
        self.stack.or(self.stack_flag)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// 組み立てて検証し、記録済みの状態との差分を表示
    Preview {
        #[command(flatten)]
        target: StackArg,
    },
    /// 検証してバンドルを書き出し、スナップショットを記録
    Up {
        #[command(flatten)]
        target: StackArg,
        /// バンドルの出力先（デフォルト: .infraflow/out/<stack>）
        #[arg(long)]
        out: Option<PathBuf>,
        /// 書き出し前にイメージをビルド
        #[arg(long)]
        build: bool,
        /// ビルドしたイメージを Artifact Registry にプッシュ
        #[arg(long)]
        push: bool,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// シークレットを伏せたマニフェストを表示
    Render {
        #[command(flatten)]
        target: StackArg,
        /// 出力形式
        #[arg(long, value_enum, default_value = "yaml")]
        format: RenderFormat,
    },
    /// 構造チェックを実行
    Check {
        #[command(flatten)]
        target: StackArg,
    },
    /// クラスタの kubeconfig を表示
    Kubeconfig {
        #[command(flatten)]
        target: StackArg,
    },
    /// Dockerイメージをビルド
    Build {
        #[command(flatten)]
        target: StackArg,
        /// ビルド対象のイメージ（省略時は全イメージ）
        #[arg(short = 'n', long)]
        image: Option<String>,
        /// ビルド後に Artifact Registry にプッシュ
        #[arg(long)]
        push: bool,
        /// キャッシュを使用しない
        #[arg(long)]
        no_cache: bool,
    },
    /// プロバイダー出力を表示・記録
    #[command(subcommand)]
    Outputs(OutputsCommands),
    /// gcloud / kubectl でクラスタとロードバランサーの出力を読み取る
    Refresh {
        #[command(flatten)]
        target: StackArg,
    },
    /// 削除リストを書き出してスナップショットを消去
    Destroy {
        #[command(flatten)]
        target: StackArg,
        /// 削除リストの出力先（デフォルト: .infraflow/out/<stack>）
        #[arg(long)]
        out: Option<PathBuf>,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
        /// 生成済みシークレットも破棄
        #[arg(long)]
        forget_secrets: bool,
    },
    /// バージョン情報を表示
    Version,
}

/// プロバイダー出力のサブコマンド
#[derive(Subcommand)]
enum OutputsCommands {
    /// 記録済みの出力とエクスポートを一覧表示
    List {
        #[command(flatten)]
        target: StackArg,
    },
    /// 出力（kind/name.attribute）またはエクスポートの値を表示
    Get {
        /// 出力キーまたはエクスポート名
        key: String,
        #[command(flatten)]
        target: StackArg,
    },
    /// 出力を手動で記録（例: gke-cluster/cluster.endpoint 34.1.2.3）
    Set {
        /// 出力キー（kind/name.attribute）
        key: String,
        /// 値
        value: String,
        #[command(flatten)]
        target: StackArg,
    },
}

impl Commands {
    fn stack(&self) -> Option<String> {
        let target = match self {
            Commands::Preview { target }
            | Commands::Up { target, .. }
            | Commands::Render { target, .. }
            | Commands::Check { target }
            | Commands::Kubeconfig { target }
            | Commands::Build { target, .. }
            | Commands::Refresh { target }
            | Commands::Destroy { target, .. } => target,
            Commands::Outputs(
                OutputsCommands::List { target }
                | OutputsCommands::Get { target, .. }
                | OutputsCommands::Set { target, .. },
            ) => target,
            Commands::Version => return None,
        };
        target.clone().name()
    }
}

fn init_tracing(verbose: bool) {
    // ログは stderr に出し、stdout はマニフェスト等の出力に使う
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("infraflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let project = match Project::load(cli.command.stack()) {
        Ok(project) => project,
        Err(e) => {
            if matches!(
                e.downcast_ref::<infraflow_core::InfraError>(),
                Some(infraflow_core::InfraError::ProjectRootNotFound(_))
            ) {
                eprintln!("{} {}", "✗".red().bold(), e);
                eprintln!();
                eprintln!("infra.kdl が存在するディレクトリで実行してください");
                std::process::exit(1);
            }
            return Err(e);
        }
    };

    match cli.command {
        Commands::Preview { .. } => commands::preview::handle(&project).await?,
        Commands::Up {
            out,
            build,
            push,
            yes,
            ..
        } => {
            let options = UpOptions {
                out,
                build,
                push,
                yes,
            };
            commands::up::handle(&project, options).await?;
        }
        Commands::Render { format, .. } => commands::render::handle(&project, format).await?,
        Commands::Check { .. } => commands::check::handle(&project).await?,
        Commands::Kubeconfig { .. } => commands::kubeconfig::handle(&project).await?,
        Commands::Build {
            image,
            push,
            no_cache,
            ..
        } => commands::build::handle(&project, image.as_deref(), push, no_cache).await?,
        Commands::Outputs(command) => match command {
            OutputsCommands::List { .. } => commands::outputs::list(&project).await?,
            OutputsCommands::Get { key, .. } => commands::outputs::get(&project, &key).await?,
            OutputsCommands::Set { key, value, .. } => {
                commands::outputs::set(&project, &key, &value).await?
            }
        },
        Commands::Refresh { .. } => commands::refresh::handle(&project).await?,
        Commands::Destroy {
            out,
            yes,
            forget_secrets,
            ..
        } => {
            commands::destroy::handle(&project, out.as_deref(), yes, forget_secrets).await?;
        }
        Commands::Version => {
            unreachable!("Version is handled before config loading");
        }
    }

    Ok(())
}
