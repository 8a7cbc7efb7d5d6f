use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("既存のホスト設定の読み込みに失敗しました: {path}\n理由: {message}")]
    HostsRead { path: PathBuf, message: String },

    #[error("ホスト設定の書き込みに失敗しました: {path}\n理由: {source}")]
    HostsWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "ミラーレジストリの指定が不正です: '{value}'\n\nヒント:\n  • 形式: [user:pass@]host[=upstream]\n  • 例: docker.io=https://registry-1.docker.io"
    )]
    InvalidMirrorSpec { value: String },

    #[error("不明なディストリビューション: '{0}' (kind, k3d, talos, vcluster)")]
    UnknownDistribution(String),

    #[error("不明なプロバイダー: '{0}' (docker, hetzner)")]
    UnknownProvider(String),

    #[error("CIDR が不正です: '{0}'")]
    InvalidCidr(String),

    #[error("CIDR '{cidr}' にレジストリ用のアドレスが不足しています（{index} 番目）")]
    AddressExhausted { cidr: String, index: usize },

    #[error("設定ファイルの解析に失敗しました: {path}\n理由: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("YAML エラー: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
