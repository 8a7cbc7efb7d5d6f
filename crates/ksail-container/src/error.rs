use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error(
        "Dockerに接続できません: {0}\n\nヒント:\n  • Dockerが起動しているか確認してください\n  • docker ps コマンドが正常に動作するか確認してください"
    )]
    DockerConnectionFailed(String),

    #[error("コンテナ '{container}' が見つかりません")]
    ContainerNotFound { container: String },

    #[error("ネットワーク '{network}' が見つかりません")]
    NetworkNotFound { network: String },

    #[error("Docker APIエラー: {0}")]
    DockerApiError(String),

    #[error(
        "レジストリ '{registry}' の準備完了を待機中にタイムアウトしました（{attempts}回試行）\n\nヒント:\n  • docker logs {registry} でレジストリのログを確認してください\n  • アップストリームに到達できるか確認してください"
    )]
    RegistryNotReady { registry: String, attempts: u32 },

    #[error("レジストリ '{registry}' の待機が中断されました（期限切れ）")]
    Cancelled { registry: String },

    #[error("{base} 以降に空きポートがありません")]
    PortExhausted { base: u16 },

    #[error("レジストリが見つかりません: {scope}")]
    NoRegistriesFound { scope: String },

    #[error("{} 個のレジストリの削除に失敗しました: {}", .failures.len(), format_failures(.failures))]
    CleanupFailed { failures: Vec<(String, String)> },

    #[error(transparent)]
    Config(#[from] ksail_core::CoreError),
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(name, reason)| format!("{} ({})", name, reason))
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<bollard::errors::Error> for ContainerError {
    fn from(err: bollard::errors::Error) -> Self {
        match &err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => {
                // 呼び出し側で対象の種類が分かる場合はそちらで詳細なエラーに変換する
                ContainerError::DockerApiError(format!("not found: {}", message))
            }
            _ => {
                let err_str = err.to_string();
                if err_str.contains("Connection refused")
                    || err_str.contains("No such file or directory")
                {
                    ContainerError::DockerConnectionFailed(err_str)
                } else {
                    ContainerError::DockerApiError(err_str)
                }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;
