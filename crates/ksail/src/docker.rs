use colored::Colorize;
use ksail_container::{DockerInvoker, LocalDockerInvoker};
use std::sync::Arc;

/// Docker接続を初期化（エラーハンドリング付き）
pub async fn init_docker_with_error_handling() -> anyhow::Result<Arc<dyn DockerInvoker>> {
    let invoker = LocalDockerInvoker::new();
    match invoker.client().await {
        Ok(_) => Ok(Arc::new(invoker)),
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Docker接続エラー".red().bold());
            eprintln!();
            eprintln!("{}", "原因:".yellow());
            eprintln!("  {}", e);
            eprintln!();
            eprintln!("{}", "解決方法:".yellow());
            eprintln!("  • Dockerが起動しているか確認してください");
            eprintln!("  • docker ps コマンドが正常に動作するか確認してください");
            eprintln!("  • DOCKER_HOST を設定している場合は接続先を確認してください");
            Err(anyhow::anyhow!("Docker接続に失敗しました"))
        }
    }
}
