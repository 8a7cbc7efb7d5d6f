mod commands;
mod docker;

use clap::{Args, Parser, Subcommand};
use ksail_core::Distribution;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ksail")]
#[command(about = "ミラーレジストリ付きのローカル Kubernetes クラスタ", long_about = None)]
struct Cli {
    /// 設定ファイルのパス（省略時は KSAIL_CONFIG、./ksail.yaml の順に探す）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// クラスタ名（設定ファイルの値を上書き）
    #[arg(long, env = "KSAIL_CLUSTER", global = true)]
    cluster: Option<String>,
    /// ディストリビューション (kind, k3d, talos, vcluster)
    #[arg(short, long, global = true)]
    distribution: Option<Distribution>,
    /// 詳細なログを出力
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// ミラーレジストリを管理
    #[command(subcommand)]
    Mirror(MirrorCommands),
    /// バージョン情報を表示
    Version,
}

/// ミラー定義の指定
#[derive(Args)]
pub struct MirrorArgs {
    /// ミラーレジストリ（[user:pass@]host[=upstream]、繰り返し指定可）
    ///
    /// 指定すると既存の設定を置き換える。空文字を指定するとミラーを無効化する。
    #[arg(
        short = 'm',
        long = "mirror-registry",
        env = "KSAIL_MIRROR_REGISTRY",
        value_delimiter = ','
    )]
    pub mirror_registry: Option<Vec<String>>,
    /// ディストリビューションのネイティブ設定ファイル（kind.yaml, k3d.yaml, talos パッチ）
    #[arg(short, long)]
    pub native_config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum MirrorCommands {
    /// クラスタ作成前のステージ（Registry → Network → Connect）を実行
    Up {
        #[command(flatten)]
        mirrors: MirrorArgs,
        /// 各ステージの期限（秒）
        #[arg(long)]
        timeout: Option<u64>,
        /// クラスタを作成するコマンド（-- 以降）。指定すると作成後のステージまで続けて実行する
        #[arg(last = true)]
        command: Vec<String>,
    },
    /// クラスタ作成後のステージ（PostClusterConnect）を実行
    Connect {
        #[command(flatten)]
        mirrors: MirrorArgs,
    },
    /// クラスタ削除に合わせてレジストリを片付ける
    Down {
        #[command(flatten)]
        mirrors: MirrorArgs,
        /// レジストリのボリュームも削除する
        #[arg(long)]
        delete_volumes: bool,
        /// クラスタを削除するコマンド（-- 以降）
        #[arg(last = true)]
        command: Vec<String>,
    },
    /// クラスタネットワーク上のレジストリを削除する
    Clean {
        /// レジストリのボリュームも削除する
        #[arg(long)]
        delete_volumes: bool,
    },
    /// レジストリの一覧を表示
    List {
        /// 全クラスタの KSail 管理レジストリを表示
        #[arg(short, long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログは stderr（stdout は進捗表示に使う）
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let command = match cli.command {
        Commands::Version => {
            println!("ksail {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Commands::Mirror(command) => command,
    };

    let cluster =
        commands::load_cluster(cli.config.as_deref(), cli.cluster, cli.distribution)?;

    match command {
        MirrorCommands::Up {
            mirrors,
            timeout,
            command,
        } => {
            commands::up::handle(&cluster, &mirrors, timeout, &command).await?;
        }
        MirrorCommands::Connect { mirrors } => {
            commands::up::handle_connect(&cluster, &mirrors).await?;
        }
        MirrorCommands::Down {
            mirrors,
            delete_volumes,
            command,
        } => {
            commands::down::handle(&cluster, &mirrors, delete_volumes, &command).await?;
        }
        MirrorCommands::Clean { delete_volumes } => {
            commands::down::handle_clean(&cluster, delete_volumes).await?;
        }
        MirrorCommands::List { all } => {
            commands::list::handle(&cluster, all).await?;
        }
    }

    Ok(())
}
