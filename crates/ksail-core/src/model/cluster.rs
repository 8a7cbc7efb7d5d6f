//! クラスタ設定

use super::distribution::{Distribution, Provider};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Talos 用ネットワークの既定 CIDR
pub const DEFAULT_TALOS_CIDR: &str = "10.5.0.0/24";

/// ローカルレジストリの既定ホストポート
pub const DEFAULT_LOCAL_REGISTRY_PORT: u16 = 5111;

/// クラスタ設定（読み取り専用の値オブジェクト）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// クラスタ名
    pub name: String,
    pub distribution: Distribution,
    pub provider: Provider,
    /// ローカルレジストリ設定
    pub local_registry: LocalRegistry,
    /// containerd の hosts.toml を保存するディレクトリ（Kind）
    pub mirrors_dir: PathBuf,
    /// Talos 固有の設定
    pub talos: TalosOptions,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: "ksail-default".to_string(),
            distribution: Distribution::default(),
            provider: Provider::default(),
            local_registry: LocalRegistry::default(),
            mirrors_dir: PathBuf::from("mirrors"),
            talos: TalosOptions::default(),
        }
    }
}

impl ClusterConfig {
    pub fn new(name: impl Into<String>, distribution: Distribution) -> Self {
        Self {
            name: name.into(),
            distribution,
            ..Default::default()
        }
    }

    /// クラスタの Docker ネットワーク名
    pub fn network_name(&self) -> String {
        self.distribution.network_name(&self.name)
    }

    /// ネットワークに割り当てる CIDR（Talos のみ）
    pub fn network_cidr(&self) -> Option<&str> {
        match self.distribution {
            Distribution::Talos => Some(self.talos.network_cidr.as_str()),
            _ => None,
        }
    }

    /// ミラーレジストリ名に付ける接頭辞
    ///
    /// クラスタ間でレジストリを共有するディストリビューションでは `None`。
    pub fn registry_name_prefix(&self) -> Option<&str> {
        self.distribution
            .prefixes_registry_names()
            .then_some(self.name.as_str())
    }

    /// ローカルレジストリのコンテナ名
    pub fn local_registry_name(&self) -> String {
        format!("{}-local-registry", self.name)
    }
}

/// ローカルレジストリ（プロキシではない通常のレジストリ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalRegistry {
    pub enabled: bool,
    pub port: u16,
}

impl Default for LocalRegistry {
    fn default() -> Self {
        Self {
            enabled: false,
            port: DEFAULT_LOCAL_REGISTRY_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TalosOptions {
    pub network_cidr: String,
}

impl Default for TalosOptions {
    fn default() -> Self {
        Self {
            network_cidr: DEFAULT_TALOS_CIDR.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_partial_yaml() {
        let config: ClusterConfig = serde_yaml::from_str("name: dev\ndistribution: talos\n").unwrap();
        assert_eq!(config.name, "dev");
        assert_eq!(config.distribution, Distribution::Talos);
        assert_eq!(config.provider, Provider::Docker);
        assert!(!config.local_registry.enabled);
        assert_eq!(config.network_cidr(), Some(DEFAULT_TALOS_CIDR));
    }

    #[test]
    fn test_network_cidr_only_for_talos() {
        let config = ClusterConfig::new("dev", Distribution::Kind);
        assert_eq!(config.network_cidr(), None);
        assert_eq!(config.network_name(), "kind");
        assert_eq!(config.local_registry_name(), "dev-local-registry");
    }
}
