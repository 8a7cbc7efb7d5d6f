//! 設定ファイルのロード
//!
//! 検索順序:
//! 1. 明示的に指定されたパス（`--config`）
//! 2. 環境変数 KSAIL_CONFIG
//! 3. カレントディレクトリの ksail.yaml
//!
//! どれも見つからない場合は既定値（Docker 上の Kind）を使う。

use crate::error::{CoreError, Result};
use crate::model::{ClusterConfig, Distribution};
use crate::native::{KindConfig, NativeConfig, SimpleConfig, TalosMachineConfig};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// 設定ファイル名
pub const CONFIG_FILENAME: &str = "ksail.yaml";

/// 設定ファイルパスの環境変数
pub const CONFIG_PATH_ENV: &str = "KSAIL_CONFIG";

/// 設定ファイルを探す
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path_str) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(&path_str);
        debug!(env_path = %path_str, "Checking KSAIL_CONFIG");
        if path.exists() {
            return Some(path);
        }
    }

    let local = std::env::current_dir().ok()?.join(CONFIG_FILENAME);
    local.exists().then_some(local)
}

/// クラスタ設定をロードする
#[instrument]
pub fn load_cluster_config(explicit: Option<&Path>) -> Result<ClusterConfig> {
    match find_config_file(explicit) {
        Some(path) => {
            let config: ClusterConfig = read_yaml(&path)?;
            info!(
                path = %path.display(),
                cluster = %config.name,
                distribution = %config.distribution,
                "Loaded cluster configuration"
            );
            Ok(config)
        }
        None => {
            debug!("No configuration file found, using defaults");
            Ok(ClusterConfig::default())
        }
    }
}

/// ディストリビューションに応じたネイティブ設定をロードする
///
/// パスがない場合は既定の空設定を返す。
pub fn load_native_config(distribution: Distribution, path: Option<&Path>) -> Result<NativeConfig> {
    let native = match (distribution, path) {
        (Distribution::Kind, Some(p)) => NativeConfig::Kind(read_yaml::<KindConfig>(p)?),
        (Distribution::Kind, None) => NativeConfig::Kind(KindConfig::default()),
        (Distribution::K3d, Some(p)) => NativeConfig::K3d(read_yaml::<SimpleConfig>(p)?),
        (Distribution::K3d, None) => NativeConfig::K3d(SimpleConfig::default()),
        (Distribution::Talos, Some(p)) => NativeConfig::Talos(read_yaml::<TalosMachineConfig>(p)?),
        (Distribution::Talos, None) => NativeConfig::Talos(TalosMachineConfig::default()),
        (Distribution::VCluster, _) => NativeConfig::None,
    };
    Ok(native)
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(|e| CoreError::ConfigParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
