//! クラスタ用 Docker ネットワークの事前作成
//!
//! クラスタのプロビジョナーより先にネットワークを作っておき、同じ名前・ラベルで
//! 再利用させる。

use crate::docker::{CLUSTER_LABEL, DockerApi, NetworkSpec};
use crate::error::Result;
use ksail_core::{Distribution, Ipv4Cidr};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// 作成するネットワークの MTU
pub const DEFAULT_MTU: u32 = 1500;

const MTU_OPTION: &str = "com.docker.network.driver.mtu";
const ICC_OPTION: &str = "com.docker.network.bridge.enable_icc";
const MASQUERADE_OPTION: &str = "com.docker.network.bridge.enable_ip_masquerade";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkOutcome {
    Created,
    AlreadyExists,
}

/// ディストリビューションごとの所有ラベル
///
/// Talos はクラスタ削除時に `talos.network.mtu` を読むため、空にしてはいけない。
pub fn ownership_labels(distribution: Distribution, cluster_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(CLUSTER_LABEL.to_string(), cluster_name.to_string());

    match distribution {
        Distribution::Talos => {
            labels.insert("talos.owned".to_string(), "true".to_string());
            labels.insert("talos.cluster.name".to_string(), cluster_name.to_string());
            labels.insert("talos.network.mtu".to_string(), DEFAULT_MTU.to_string());
        }
        Distribution::K3d => {
            labels.insert("app".to_string(), "k3d".to_string());
        }
        Distribution::Kind | Distribution::VCluster => {}
    }
    labels
}

/// ブリッジネットワークの作成パラメータを組み立てる
pub fn bridge_network_spec(
    name: &str,
    cidr: Option<&Ipv4Cidr>,
    labels: BTreeMap<String, String>,
) -> NetworkSpec {
    let mut options = BTreeMap::new();
    options.insert(ICC_OPTION.to_string(), "true".to_string());
    options.insert(MASQUERADE_OPTION.to_string(), "true".to_string());
    options.insert(MTU_OPTION.to_string(), DEFAULT_MTU.to_string());

    NetworkSpec {
        name: name.to_string(),
        driver: "bridge".to_string(),
        subnet: cidr.map(|c| c.to_string()),
        gateway: cidr.map(|c| c.gateway().to_string()),
        options,
        labels,
    }
}

/// ネットワークが存在することを保証する
///
/// 同名のネットワークがあれば何もしない。`cidr` が空なら Docker にサブネットを任せる。
#[instrument(skip(docker, labels))]
pub async fn ensure_network_exists(
    docker: &dyn DockerApi,
    name: &str,
    cidr: Option<&str>,
    labels: BTreeMap<String, String>,
) -> Result<NetworkOutcome> {
    let existing = docker.list_networks(name).await?;
    if !existing.is_empty() {
        debug!(network = %name, "Network already exists");
        return Ok(NetworkOutcome::AlreadyExists);
    }

    let cidr = cidr
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(Ipv4Cidr::parse)
        .transpose()?;

    let spec = bridge_network_spec(name, cidr.as_ref(), labels);
    docker.create_network(&spec).await?;
    info!(network = %name, subnet = ?spec.subnet, "Created network");
    Ok(NetworkOutcome::Created)
}
