use crate::MirrorArgs;
use crate::commands;
use crate::docker;
use colored::Colorize;
use ksail_core::{ClusterConfig, Distribution, HostsDirectory, NativeConfig};
use ksail_mirror::{MirrorPipeline, Role, StageOutcome};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

pub async fn handle(
    cluster: &ClusterConfig,
    args: &MirrorArgs,
    timeout: Option<u64>,
    create_command: &[String],
) -> anyhow::Result<()> {
    println!("{}", "ミラーレジストリを準備中...".green());
    let (mut native, specs) = commands::load_mirrors(cluster, args)?;
    commands::print_cluster(cluster, &specs);

    // ミラーなしではステージが動かないため、前回の hosts.toml をここで消す
    if specs.is_empty() && cluster.distribution == Distribution::Kind {
        HostsDirectory::new(&cluster.mirrors_dir).write_specs(&[], |_| String::new())?;
    }

    println!();
    println!("{}", "Dockerに接続中...".blue());
    let invoker = docker::init_docker_with_error_handling().await?;

    let notifier = commands::notifier();
    let mut pipeline = MirrorPipeline::new(invoker, commands::probe(), notifier.clone());
    if let Some(secs) = timeout {
        pipeline = pipeline.with_stage_timeout(Duration::from_secs(secs));
    }

    notifier.title("■ クラスタ作成前のステージ");
    let mut session = pipeline.session(cluster, &specs)?;
    let outcomes = session.run_through(Role::Connect, &mut native).await?;
    print_outcomes(&outcomes);

    write_native_config(&native, args.native_config.as_deref())?;

    if create_command.is_empty() {
        println!();
        println!("{}", "✓ ミラーレジストリの準備が完了しました".green().bold());
        println!(
            "  クラスタ作成後に {} を実行してください",
            "ksail mirror connect".cyan()
        );
        return Ok(());
    }

    notifier.title("■ クラスタを作成");
    // 認証情報を解決した設定は一時ファイルにだけ置き、コマンド終了後に消える
    let resolved = match native.to_resolved_yaml()? {
        Some(yaml) => {
            let mut file = tempfile::Builder::new()
                .prefix("ksail-native-")
                .suffix(".yaml")
                .tempfile()?;
            file.write_all(yaml.as_bytes())?;
            file.flush()?;
            Some(file)
        }
        None => None,
    };
    commands::run_cluster_command(
        notifier.as_ref(),
        create_command,
        resolved.as_ref().map(|file| file.path()),
    )
    .await?;
    drop(resolved);

    notifier.title("■ クラスタ作成後のステージ");
    let outcome = session
        .run_stage(Role::PostClusterConnect, &mut native)
        .await?;
    print_outcomes(&[outcome]);

    println!();
    println!("{}", "✓ クラスタとミラーレジストリの準備が完了しました".green().bold());
    Ok(())
}

pub async fn handle_connect(cluster: &ClusterConfig, args: &MirrorArgs) -> anyhow::Result<()> {
    let (mut native, specs) = commands::load_mirrors(cluster, args)?;
    commands::print_cluster(cluster, &specs);

    let invoker = docker::init_docker_with_error_handling().await?;
    let notifier = commands::notifier();
    let pipeline = MirrorPipeline::new(invoker, commands::probe(), notifier.clone());

    notifier.title("■ クラスタ作成後のステージ");
    let mut session = pipeline.session(cluster, &specs)?;
    let outcome = session
        .run_stage(Role::PostClusterConnect, &mut native)
        .await?;
    print_outcomes(&[outcome]);
    Ok(())
}

fn print_outcomes(outcomes: &[StageOutcome]) {
    for outcome in outcomes {
        if let StageOutcome::Skipped(role) = outcome {
            println!("  {} {} ステージ（変更なし）", "-".dimmed(), role);
        }
    }
}

/// 書き換えたネイティブ設定を保存する
///
/// パスの指定がなければ標準出力に出す。認証情報は `${VAR}` のまま書き出す。
fn write_native_config(native: &NativeConfig, path: Option<&Path>) -> anyhow::Result<()> {
    let Some(yaml) = native.to_yaml()? else {
        return Ok(());
    };

    match path {
        Some(path) => {
            std::fs::write(path, yaml)?;
            println!();
            println!(
                "  ✓ ネイティブ設定を更新しました: {}",
                path.display().to_string().cyan()
            );
        }
        None => {
            println!();
            println!("{}", "ネイティブ設定:".bold());
            print!("{}", yaml);
        }
    }
    Ok(())
}
