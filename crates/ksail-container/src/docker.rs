//! Docker 操作の境界
//!
//! オーケストレーションが必要とする Docker 操作だけを [`DockerApi`] として切り出す。
//! 実装は bollard（[`crate::engine`]）と、テスト用のインメモリ実装（`mock`）。

use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;

/// レジストリコンテナの待ち受けポート
pub const REGISTRY_CONTAINER_PORT: u16 = 5000;

/// KSail が作成したレジストリに付けるラベル
pub const REGISTRY_LABEL: &str = "io.ksail.registry";
/// レジストリを作成したクラスタ名
pub const CLUSTER_LABEL: &str = "io.ksail.cluster";
/// ミラー対象のアップストリームホスト
pub const MIRROR_HOST_LABEL: &str = "io.ksail.registry.host";

/// ブリッジネットワークの作成パラメータ
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkSpec {
    pub name: String,
    pub driver: String,
    pub subnet: Option<String>,
    pub gateway: Option<String>,
    pub options: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
}

/// ネットワークに接続されているコンテナ
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkEndpoint {
    pub container_id: String,
    pub container_name: String,
    pub ipv4: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub private: u16,
    pub public: Option<u16>,
}

/// コンテナの状態（一覧と詳細で共通）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub labels: HashMap<String, String>,
    pub running: bool,
    /// ネットワーク名 → IPv4 アドレス
    pub networks: BTreeMap<String, Option<String>>,
    pub ports: Vec<PortMapping>,
}

impl ContainerInfo {
    /// レジストリポートに割り当てられたホストポート
    pub fn registry_host_port(&self) -> Option<u16> {
        self.ports
            .iter()
            .find(|p| p.private == REGISTRY_CONTAINER_PORT && p.public.is_some())
            .and_then(|p| p.public)
    }

    /// KSail が作成した、またはレジストリイメージから起動したコンテナか
    pub fn is_registry(&self) -> bool {
        if self.labels.contains_key(REGISTRY_LABEL) {
            return true;
        }
        let image = self.image.rsplit('/').next().unwrap_or(&self.image);
        image == "registry" || image.starts_with("registry:") || image.starts_with("registry@")
    }
}

/// コンテナ一覧の絞り込み条件
#[derive(Debug, Clone, Default)]
pub struct ContainerFilter {
    /// 停止中のコンテナも含める
    pub all: bool,
    /// `key` または `key=value`
    pub labels: Vec<String>,
    pub network: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostPortBinding {
    pub host_ip: String,
    pub host_port: u16,
    pub container_port: u16,
}

/// コンテナの作成パラメータ
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub port: Option<HostPortBinding>,
    /// 名前付きボリュームとマウント先
    pub volume: Option<(String, String)>,
}

/// 必要最小限の Docker 操作
#[async_trait]
pub trait DockerApi: Send + Sync {
    /// 名前が完全一致するネットワーク
    async fn list_networks(&self, name: &str) -> Result<Vec<NetworkSummary>>;
    async fn create_network(&self, spec: &NetworkSpec) -> Result<()>;
    /// ネットワークがない場合は `ContainerError::NetworkNotFound`
    async fn network_endpoints(&self, network: &str) -> Result<Vec<NetworkEndpoint>>;
    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerInfo>>;
    /// 存在しない場合は `None`
    async fn inspect_container(&self, name_or_id: &str) -> Result<Option<ContainerInfo>>;
    /// 作成したコンテナの ID を返す
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;
    async fn start_container(&self, id: &str) -> Result<()>;
    async fn stop_container(&self, id: &str) -> Result<()>;
    async fn remove_container(&self, id: &str, remove_volumes: bool) -> Result<()>;
    async fn remove_volume(&self, name: &str) -> Result<()>;
    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        ipv4: Option<Ipv4Addr>,
    ) -> Result<()>;
    async fn disconnect_network(&self, network: &str, container: &str) -> Result<()>;
    /// コンテナ内にファイルを書き込む（親ディレクトリは作成する）
    async fn write_file(&self, container: &str, path: &str, contents: &str) -> Result<()>;
}

/// 認証済みの Docker クライアントを供給する
///
/// クライアントの生成や認証は CLI 側の関心事で、オーケストレーションは
/// ここから受け取ったハンドルを使うだけにする。
#[async_trait]
pub trait DockerInvoker: Send + Sync {
    async fn client(&self) -> Result<Arc<dyn DockerApi>>;
}

/// 既存のクライアントをそのまま渡す
pub struct StaticInvoker {
    client: Arc<dyn DockerApi>,
}

impl StaticInvoker {
    pub fn new(client: Arc<dyn DockerApi>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DockerInvoker for StaticInvoker {
    async fn client(&self) -> Result<Arc<dyn DockerApi>> {
        Ok(self.client.clone())
    }
}
