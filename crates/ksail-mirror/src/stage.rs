//! パイプラインのステージとコンテキスト

use ksail_core::{ClusterConfig, HostsDirectory, MirrorSpec};
use std::fmt;

/// パイプライン上の位置（この順でしか実行しない）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    /// レジストリの作成と準備完了待機
    Registry,
    /// クラスタネットワークの事前作成
    Network,
    /// 準備完了したレジストリのネットワーク接続
    Connect,
    /// 起動後のノードへのミラー設定の書き込み
    PostClusterConnect,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Registry,
        Role::Network,
        Role::Connect,
        Role::PostClusterConnect,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Registry => write!(f, "registry"),
            Role::Network => write!(f, "network"),
            Role::Connect => write!(f, "connect"),
            Role::PostClusterConnect => write!(f, "post-cluster-connect"),
        }
    }
}

/// 1 回のステージ実行で共有する読み取り専用の情報
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub cluster: &'a ClusterConfig,
    pub specs: &'a [MirrorSpec],
}

impl<'a> StageContext<'a> {
    pub fn new(cluster: &'a ClusterConfig, specs: &'a [MirrorSpec]) -> Self {
        Self { cluster, specs }
    }

    pub fn has_mirrors(&self) -> bool {
        !self.specs.is_empty()
    }

    pub fn local_registry_enabled(&self) -> bool {
        self.cluster.local_registry.enabled
    }

    pub fn network_name(&self) -> String {
        self.cluster.network_name()
    }

    /// レジストリ名に付ける接頭辞（クラスタ間で共有する場合は `None`）
    pub fn name_prefix(&self) -> Option<&'a str> {
        self.cluster.registry_name_prefix()
    }

    pub fn hosts_directory(&self) -> HostsDirectory {
        HostsDirectory::new(&self.cluster.mirrors_dir)
    }
}

/// ステージの実行結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// 準備の結果、何もすることがなかった
    Skipped(Role),
    Completed(Role),
}

impl StageOutcome {
    pub fn role(&self) -> Role {
        match self {
            StageOutcome::Skipped(role) | StageOutcome::Completed(role) => *role,
        }
    }

    pub fn ran(&self) -> bool {
        matches!(self, StageOutcome::Completed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksail_core::Distribution;

    #[test]
    fn test_role_order() {
        assert!(Role::Registry < Role::Network);
        assert!(Role::Connect < Role::PostClusterConnect);
        assert_eq!(Role::PostClusterConnect.index(), 3);
        assert_eq!(Role::PostClusterConnect.to_string(), "post-cluster-connect");
    }

    #[test]
    fn test_name_prefix() {
        let specs = Vec::new();
        let kind = ClusterConfig::new("dev", Distribution::Kind);
        assert_eq!(StageContext::new(&kind, &specs).name_prefix(), Some("dev"));

        let k3d = ClusterConfig::new("dev", Distribution::K3d);
        assert_eq!(StageContext::new(&k3d, &specs).name_prefix(), None);
    }
}
