pub mod down;
pub mod list;
pub mod up;

use crate::MirrorArgs;
use colored::Colorize;
use ksail_container::HttpHealthProbe;
use ksail_core::{
    ClusterConfig, ConsoleNotifier, Distribution, HostsDirectory, MirrorSpec, NativeConfig,
    Notifier, load_cluster_config, load_native_config, resolve_mirror_specs,
};
use std::path::Path;
use std::sync::Arc;

/// 設定ファイルを読み込み、CLI フラグで上書きする
pub fn load_cluster(
    config: Option<&Path>,
    name: Option<String>,
    distribution: Option<Distribution>,
) -> anyhow::Result<ClusterConfig> {
    let mut cluster = load_cluster_config(config)?;
    if let Some(name) = name {
        cluster.name = name;
    }
    if let Some(distribution) = distribution {
        cluster.distribution = distribution;
    }
    Ok(cluster)
}

/// ネイティブ設定とミラー定義を読み込む
///
/// 既存のミラー（Kind の hosts.toml、Talos のマシン設定）はフラグが
/// 指定されていない場合のみ使われる。
pub fn load_mirrors(
    cluster: &ClusterConfig,
    args: &MirrorArgs,
) -> anyhow::Result<(NativeConfig, Vec<MirrorSpec>)> {
    let native = load_native_config(cluster.distribution, args.native_config.as_deref())?;

    // フラグは既存の設定を置き換えるため、hosts.toml は読まない
    let existing = match (cluster.distribution, &args.mirror_registry) {
        (Distribution::Kind, None) => HostsDirectory::new(&cluster.mirrors_dir).read_specs()?,
        _ => Vec::new(),
    };
    let talos_hosts = match &native {
        NativeConfig::Talos(config) => config.extract_mirror_hosts(),
        _ => Vec::new(),
    };

    let specs = resolve_mirror_specs(
        args.mirror_registry.as_deref(),
        &existing,
        &talos_hosts,
        cluster.provider,
    )?;
    Ok((native, specs))
}

pub fn print_cluster(cluster: &ClusterConfig, specs: &[MirrorSpec]) {
    println!(
        "クラスタ: {} ({})",
        cluster.name.cyan(),
        cluster.distribution.to_string().cyan()
    );
    println!("ネットワーク: {}", cluster.network_name().cyan());
    if specs.is_empty() {
        println!("ミラー: {}", "なし".dimmed());
    } else {
        println!("{}", format!("ミラー ({} 個):", specs.len()).bold());
        for spec in specs {
            println!("  • {} → {}", spec.host.cyan(), spec.remote);
        }
    }
}

/// クラスタの作成・削除コマンドを実行する
///
/// `native_config` があれば KSAIL_NATIVE_CONFIG でコマンドに渡す。
pub async fn run_cluster_command(
    notifier: &dyn Notifier,
    command: &[String],
    native_config: Option<&Path>,
) -> anyhow::Result<()> {
    let Some((program, rest)) = command.split_first() else {
        return Ok(());
    };
    notifier.activity(&command.join(" "));

    let mut process = tokio::process::Command::new(program);
    process.args(rest);
    if let Some(path) = native_config {
        process.env(NATIVE_CONFIG_ENV, path);
    }
    let status = process
        .status()
        .await
        .map_err(|e| anyhow::anyhow!("コマンドを実行できません: {}: {}", program, e))?;
    if !status.success() {
        return Err(anyhow::anyhow!(
            "コマンドが失敗しました: {}（{}）",
            command.join(" "),
            status
        ));
    }
    Ok(())
}

/// クラスタ作成コマンドに渡すネイティブ設定のパス
pub const NATIVE_CONFIG_ENV: &str = "KSAIL_NATIVE_CONFIG";

pub fn notifier() -> Arc<dyn Notifier> {
    Arc::new(ConsoleNotifier)
}

pub fn probe() -> Arc<HttpHealthProbe> {
    Arc::new(HttpHealthProbe::new())
}
