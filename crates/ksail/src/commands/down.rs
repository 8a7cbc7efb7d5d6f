use crate::MirrorArgs;
use crate::commands;
use crate::docker;
use colored::Colorize;
use ksail_core::ClusterConfig;
use ksail_mirror::RegistryCleanup;

pub async fn handle(
    cluster: &ClusterConfig,
    args: &MirrorArgs,
    delete_volumes: bool,
    delete_command: &[String],
) -> anyhow::Result<()> {
    println!("{}", "ミラーレジストリを片付け中...".yellow());
    let (_, specs) = commands::load_mirrors(cluster, args)?;
    commands::print_cluster(cluster, &specs);

    println!();
    println!("{}", "Dockerに接続中...".blue());
    let invoker = docker::init_docker_with_error_handling().await?;
    let notifier = commands::notifier();
    let cleanup = RegistryCleanup::new(invoker, commands::probe(), notifier.clone());

    // クラスタ削除でネットワークが消える場合は先に列挙して切断しておく
    let discovered = if cluster.distribution.requires_pre_discovery() {
        notifier.title("■ レジストリの事前探索");
        match cleanup.prediscover(cluster, &specs).await {
            Ok(discovered) => {
                notifier.activity(&format!(
                    "{} 個のレジストリをネットワークから切断しました",
                    discovered.registries().len()
                ));
                Some(discovered)
            }
            Err(e) => {
                notifier.warning(&format!("レジストリの事前探索に失敗しました: {}", e));
                None
            }
        }
    } else {
        None
    };

    if !delete_command.is_empty() {
        notifier.title("■ クラスタを削除");
        commands::run_cluster_command(notifier.as_ref(), delete_command, None).await?;
    }

    notifier.title("■ レジストリの削除");
    let summary = cleanup.cleanup(cluster, discovered, delete_volumes).await;

    if summary.has_fatal_failure() {
        return Err(anyhow::anyhow!("ローカルレジストリの削除に失敗しました"));
    }

    println!();
    println!("{}", "✓ 片付けが完了しました".green().bold());
    Ok(())
}

pub async fn handle_clean(cluster: &ClusterConfig, delete_volumes: bool) -> anyhow::Result<()> {
    let invoker = docker::init_docker_with_error_handling().await?;
    let notifier = commands::notifier();
    let cleanup = RegistryCleanup::new(invoker, commands::probe(), notifier.clone());

    notifier.title(&format!(
        "■ {} 上のレジストリを削除",
        cluster.network_name()
    ));
    let report = match cleanup
        .cleanup_registries_by_network(cluster, delete_volumes)
        .await
    {
        Ok(report) => report,
        Err(e) if e.is_no_registries_found() => {
            notifier.activity("削除するレジストリはありません");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    for name in &report.deleted {
        notifier.success(&format!("{} を削除しました", name));
    }
    for (name, user) in &report.skipped_in_use {
        notifier.warning(&format!("{} は {} が使用中のためスキップしました", name, user));
    }
    report.into_result()?;
    Ok(())
}
