//! ディストリビューションとプロバイダー

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// クラスタのディストリビューション
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    #[default]
    Kind,
    K3d,
    Talos,
    #[serde(rename = "vcluster")]
    VCluster,
}

impl Distribution {
    pub const ALL: [Distribution; 4] = [
        Distribution::Kind,
        Distribution::K3d,
        Distribution::Talos,
        Distribution::VCluster,
    ];

    /// クラスタが接続される Docker ネットワーク名
    ///
    /// - Kind: 全クラスタ共有の `kind`
    /// - K3d: `k3d-<cluster>`
    /// - Talos: `<cluster>`
    /// - VCluster: `vcluster.<cluster>`
    pub fn network_name(&self, cluster_name: &str) -> String {
        match self {
            Distribution::Kind => "kind".to_string(),
            Distribution::K3d => format!("k3d-{}", cluster_name),
            Distribution::Talos => cluster_name.to_string(),
            Distribution::VCluster => format!("vcluster.{}", cluster_name),
        }
    }

    /// レジストリのコンテナ名にクラスタ名を前置するか
    ///
    /// K3d と VCluster はクラスタ専用ネットワークを持つため、ホスト名そのままの
    /// コンテナをクラスタ間で共有する。
    pub fn prefixes_registry_names(&self) -> bool {
        matches!(self, Distribution::Kind | Distribution::Talos)
    }

    /// クラスタ削除でネットワークごと消えるため、削除前の列挙が必要か
    pub fn requires_pre_discovery(&self) -> bool {
        matches!(self, Distribution::Talos)
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Kind => write!(f, "kind"),
            Distribution::K3d => write!(f, "k3d"),
            Distribution::Talos => write!(f, "talos"),
            Distribution::VCluster => write!(f, "vcluster"),
        }
    }
}

impl FromStr for Distribution {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kind" => Ok(Distribution::Kind),
            "k3d" | "k3s" => Ok(Distribution::K3d),
            "talos" => Ok(Distribution::Talos),
            "vcluster" => Ok(Distribution::VCluster),
            _ => Err(CoreError::UnknownDistribution(s.to_string())),
        }
    }
}

/// クラスタを実行するプロバイダー
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Docker,
    Hetzner,
}

impl Provider {
    /// ホスト上の Docker コンテナにノードから到達できるか
    pub fn supports_local_mirrors(&self) -> bool {
        matches!(self, Provider::Docker)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Docker => write!(f, "docker"),
            Provider::Hetzner => write!(f, "hetzner"),
        }
    }
}

impl FromStr for Provider {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(Provider::Docker),
            "hetzner" => Ok(Provider::Hetzner),
            _ => Err(CoreError::UnknownProvider(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_names() {
        assert_eq!(Distribution::Kind.network_name("dev"), "kind");
        assert_eq!(Distribution::K3d.network_name("dev"), "k3d-dev");
        assert_eq!(Distribution::Talos.network_name("dev"), "dev");
        assert_eq!(Distribution::VCluster.network_name("dev"), "vcluster.dev");
    }

    #[test]
    fn test_parse_distribution() {
        assert_eq!("Kind".parse::<Distribution>().unwrap(), Distribution::Kind);
        assert_eq!("vcluster".parse::<Distribution>().unwrap(), Distribution::VCluster);
        assert!("minikube".parse::<Distribution>().is_err());
    }

    #[test]
    fn test_provider_local_mirrors() {
        assert!(Provider::Docker.supports_local_mirrors());
        assert!(!Provider::Hetzner.supports_local_mirrors());
    }
}
