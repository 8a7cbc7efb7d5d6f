//! Kind クラスタ設定

use crate::hosts::CONTAINERD_CERTS_DIR;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// containerd に hosts.toml ディレクトリを参照させるパッチ
pub const CONTAINERD_CONFIG_PATH_PATCH: &str = "[plugins.\"io.containerd.grpc.v1.cri\".registry]\n  config_path = \"/etc/containerd/certs.d\"";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindConfig {
    pub kind: String,
    pub api_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<KindNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containerd_config_patches: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Default for KindConfig {
    fn default() -> Self {
        Self {
            kind: "Cluster".to_string(),
            api_version: "kind.x-k8s.io/v1alpha4".to_string(),
            name: None,
            nodes: Vec::new(),
            containerd_config_patches: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindNode {
    pub role: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_mounts: Vec<KindMount>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindMount {
    pub host_path: String,
    pub container_path: String,
}

impl KindConfig {
    /// hosts.toml ディレクトリを全ノードにマウントし、containerd のパッチを追加する
    ///
    /// 既に設定済みなら何もせず `false` を返す。
    pub fn apply_mirror_mounts(&mut self, hosts_dir: &Path) -> bool {
        let mut changed = false;

        if !self
            .containerd_config_patches
            .iter()
            .any(|p| p.contains("config_path"))
        {
            self.containerd_config_patches
                .push(CONTAINERD_CONFIG_PATH_PATCH.to_string());
            changed = true;
        }

        if self.nodes.is_empty() {
            self.nodes.push(KindNode {
                role: "control-plane".to_string(),
                extra_mounts: Vec::new(),
                extra: BTreeMap::new(),
            });
        }

        let host_path = hosts_dir.display().to_string();
        for node in &mut self.nodes {
            let mounted = node
                .extra_mounts
                .iter()
                .any(|m| m.container_path == CONTAINERD_CERTS_DIR);
            if !mounted {
                node.extra_mounts.push(KindMount {
                    host_path: host_path.clone(),
                    container_path: CONTAINERD_CERTS_DIR.to_string(),
                });
                changed = true;
            }
        }

        changed
    }
}
