//! テスト用のインメモリ Docker
//!
//! 呼び出しを順番に記録し、[`FakeProbe`] とログを共有する。
//! 作成 → 準備完了確認 → 接続の順序をテストから検証できる。

use crate::docker::{
    ContainerFilter, ContainerInfo, ContainerSpec, DockerApi, MIRROR_HOST_LABEL, NetworkEndpoint,
    NetworkSpec, NetworkSummary, PortMapping, REGISTRY_CONTAINER_PORT, REGISTRY_LABEL,
};
use crate::error::{ContainerError, Result};
use crate::waiter::{HealthProbe, ProbeTarget};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};

/// インメモリのコンテナ
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    pub running: bool,
    pub networks: BTreeMap<String, Option<String>>,
    pub host_port: Option<u16>,
}

impl FakeContainer {
    fn info(&self) -> ContainerInfo {
        ContainerInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            image: self.image.clone(),
            labels: self.labels.clone(),
            running: self.running,
            networks: self.networks.clone(),
            ports: self
                .host_port
                .map(|p| PortMapping {
                    private: REGISTRY_CONTAINER_PORT,
                    public: Some(p),
                })
                .into_iter()
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<String>,
    networks: BTreeMap<String, NetworkSpec>,
    containers: BTreeMap<String, FakeContainer>,
    files: BTreeMap<(String, String), String>,
    unhealthy: BTreeSet<String>,
    failing_removals: BTreeSet<String>,
    failing_disconnects: BTreeSet<String>,
    next_id: u32,
    next_ip: u8,
}

impl State {
    fn find(&self, name_or_id: &str) -> Option<&FakeContainer> {
        self.containers
            .get(name_or_id)
            .or_else(|| self.containers.values().find(|c| c.id == name_or_id))
    }

    fn find_name(&self, name_or_id: &str) -> Option<String> {
        self.find(name_or_id).map(|c| c.name.clone())
    }

    fn find_mut(&mut self, name_or_id: &str) -> Option<&mut FakeContainer> {
        let name = self.find_name(name_or_id)?;
        self.containers.get_mut(&name)
    }

    fn allocate_ip(&mut self) -> String {
        self.next_ip = self.next_ip.wrapping_add(1);
        format!("172.18.0.{}", self.next_ip.max(2))
    }
}

/// 呼び出しを記録するインメモリ Docker
#[derive(Debug, Clone, Default)]
pub struct FakeDocker {
    state: Arc<Mutex<State>>,
}

impl FakeDocker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }

    /// 呼び出しログを共有するヘルスチェック
    pub fn probe(&self) -> FakeProbe {
        FakeProbe {
            state: self.state.clone(),
        }
    }

    /// 記録された呼び出し（`create:<name>` など）
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// `prefix` で始まる呼び出しの回数
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// 最初に `call` が記録された位置
    pub fn position(&self, call: &str) -> Option<usize> {
        self.lock().calls.iter().position(|c| c == call)
    }

    pub fn add_network(&self, name: &str) {
        self.lock().networks.insert(
            name.to_string(),
            NetworkSpec {
                name: name.to_string(),
                driver: "bridge".to_string(),
                ..Default::default()
            },
        );
    }

    /// クラスタ削除などでネットワークが消えた状態を再現する
    pub fn remove_network(&self, name: &str) {
        let mut state = self.lock();
        state.networks.remove(name);
        for container in state.containers.values_mut() {
            container.networks.remove(name);
        }
    }

    pub fn network(&self, name: &str) -> Option<NetworkSpec> {
        self.lock().networks.get(name).cloned()
    }

    /// 稼働中のレジストリを追加する
    pub fn add_registry(&self, name: &str, host: &str, networks: &[&str]) {
        let mut labels = HashMap::new();
        labels.insert(REGISTRY_LABEL.to_string(), "true".to_string());
        labels.insert(MIRROR_HOST_LABEL.to_string(), host.to_string());
        self.insert_container(name, "registry:3", labels, networks);
    }

    /// 稼働中のクラスタノードを追加する
    pub fn add_node(&self, name: &str, networks: &[&str]) {
        self.add_node_with_labels(name, networks, &[]);
    }

    pub fn add_node_with_labels(&self, name: &str, networks: &[&str], labels: &[(&str, &str)]) {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.insert_container(name, "kindest/node:v1.31.0", labels, networks);
    }

    fn insert_container(
        &self,
        name: &str,
        image: &str,
        labels: HashMap<String, String>,
        networks: &[&str],
    ) {
        let mut state = self.lock();
        state.next_id += 1;
        let id = format!("id-{}", state.next_id);
        let mut attached = BTreeMap::new();
        for network in networks {
            let ip = state.allocate_ip();
            attached.insert(network.to_string(), Some(ip));
        }
        state.containers.insert(
            name.to_string(),
            FakeContainer {
                id,
                name: name.to_string(),
                image: image.to_string(),
                labels,
                running: true,
                networks: attached,
                ..Default::default()
            },
        );
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.lock().containers.get(name).cloned()
    }

    pub fn container_names(&self) -> Vec<String> {
        self.lock().containers.keys().cloned().collect()
    }

    /// コンテナに書き込まれたファイル
    pub fn file(&self, container: &str, path: &str) -> Option<String> {
        self.lock()
            .files
            .get(&(container.to_string(), path.to_string()))
            .cloned()
    }

    /// ヘルスチェックに応答しないレジストリ
    pub fn set_unhealthy(&self, name: &str) {
        self.lock().unhealthy.insert(name.to_string());
    }

    /// 削除に失敗するコンテナ
    pub fn fail_removal(&self, name: &str) {
        self.lock().failing_removals.insert(name.to_string());
    }

    /// ネットワークからの切断に失敗するコンテナ
    pub fn fail_disconnect(&self, name: &str) {
        self.lock().failing_disconnects.insert(name.to_string());
    }
}

#[async_trait]
impl DockerApi for FakeDocker {
    async fn list_networks(&self, name: &str) -> Result<Vec<NetworkSummary>> {
        Ok(self
            .lock()
            .networks
            .get(name)
            .map(|n| NetworkSummary {
                id: format!("net-{}", n.name),
                name: n.name.clone(),
            })
            .into_iter()
            .collect())
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("network-create:{}", spec.name));
        state.networks.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    async fn network_endpoints(&self, network: &str) -> Result<Vec<NetworkEndpoint>> {
        let state = self.lock();
        if !state.networks.contains_key(network) {
            return Err(ContainerError::NetworkNotFound {
                network: network.to_string(),
            });
        }
        Ok(state
            .containers
            .values()
            .filter_map(|c| {
                c.networks.get(network).map(|ip| NetworkEndpoint {
                    container_id: c.id.clone(),
                    container_name: c.name.clone(),
                    ipv4: ip.clone(),
                })
            })
            .collect())
    }

    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerInfo>> {
        let state = self.lock();
        Ok(state
            .containers
            .values()
            .filter(|c| filter.all || c.running)
            .filter(|c| {
                filter.labels.iter().all(|label| match label.split_once('=') {
                    Some((k, v)) => c.labels.get(k).map(String::as_str) == Some(v),
                    None => c.labels.contains_key(label),
                })
            })
            .filter(|c| {
                filter
                    .network
                    .as_ref()
                    .is_none_or(|n| c.networks.contains_key(n))
            })
            .map(FakeContainer::info)
            .collect())
    }

    async fn inspect_container(&self, name_or_id: &str) -> Result<Option<ContainerInfo>> {
        Ok(self.lock().find(name_or_id).map(FakeContainer::info))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.lock();
        state.calls.push(format!("create:{}", spec.name));
        state.next_id += 1;
        let id = format!("id-{}", state.next_id);
        state.containers.insert(
            spec.name.clone(),
            FakeContainer {
                id: id.clone(),
                name: spec.name.clone(),
                image: spec.image.clone(),
                env: spec.env.clone(),
                labels: spec.labels.clone().into_iter().collect(),
                running: false,
                networks: BTreeMap::new(),
                host_port: spec.port.as_ref().map(|p| p.host_port),
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        let container = state
            .find_mut(id)
            .ok_or_else(|| ContainerError::ContainerNotFound {
                container: id.to_string(),
            })?;
        container.running = true;
        let call = format!("start:{}", container.name);
        state.calls.push(call);
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        let container = state
            .find_mut(id)
            .ok_or_else(|| ContainerError::ContainerNotFound {
                container: id.to_string(),
            })?;
        container.running = false;
        let call = format!("stop:{}", container.name);
        state.calls.push(call);
        Ok(())
    }

    async fn remove_container(&self, id: &str, _remove_volumes: bool) -> Result<()> {
        let mut state = self.lock();
        let name = state
            .find_name(id)
            .ok_or_else(|| ContainerError::ContainerNotFound {
                container: id.to_string(),
            })?;
        if state.failing_removals.contains(&name) {
            return Err(ContainerError::DockerApiError(format!(
                "removal of {} is in progress",
                name
            )));
        }
        state.calls.push(format!("remove:{}", name));
        state.containers.remove(&name);
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        self.record(format!("volume-rm:{}", name));
        Ok(())
    }

    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        ipv4: Option<Ipv4Addr>,
    ) -> Result<()> {
        let mut state = self.lock();
        if !state.networks.contains_key(network) {
            return Err(ContainerError::NetworkNotFound {
                network: network.to_string(),
            });
        }
        let ip = match ipv4 {
            Some(ip) => ip.to_string(),
            None => state.allocate_ip(),
        };
        let target = state
            .find_mut(container)
            .ok_or_else(|| ContainerError::ContainerNotFound {
                container: container.to_string(),
            })?;
        target.networks.insert(network.to_string(), Some(ip));
        let call = format!("connect:{}:{}", network, target.name);
        state.calls.push(call);
        Ok(())
    }

    async fn disconnect_network(&self, network: &str, container: &str) -> Result<()> {
        let mut state = self.lock();
        if !state.networks.contains_key(network) {
            return Err(ContainerError::NetworkNotFound {
                network: network.to_string(),
            });
        }
        let name = state
            .find_name(container)
            .ok_or_else(|| ContainerError::ContainerNotFound {
                container: container.to_string(),
            })?;
        if state.failing_disconnects.contains(&name) {
            return Err(ContainerError::DockerApiError(format!(
                "failed to disconnect {} from {}",
                name, network
            )));
        }
        let target = state
            .containers
            .get_mut(&name)
            .ok_or_else(|| ContainerError::ContainerNotFound {
                container: container.to_string(),
            })?;
        if target.networks.remove(network).is_none() {
            return Err(ContainerError::DockerApiError(format!(
                "container {} is not connected to network {}",
                name, network
            )));
        }
        state.calls.push(format!("disconnect:{}:{}", network, name));
        Ok(())
    }

    async fn write_file(&self, container: &str, path: &str, contents: &str) -> Result<()> {
        let mut state = self.lock();
        let name = state
            .find_name(container)
            .ok_or_else(|| ContainerError::ContainerNotFound {
                container: container.to_string(),
            })?;
        state.calls.push(format!("write:{}:{}", name, path));
        state
            .files
            .insert((name, path.to_string()), contents.to_string());
        Ok(())
    }
}

/// [`FakeDocker`] の状態を見て応答するヘルスチェック
///
/// 起動済みで `set_unhealthy` されていないコンテナだけを準備完了とみなす。
#[derive(Debug, Clone)]
pub struct FakeProbe {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl HealthProbe for FakeProbe {
    async fn is_ready(&self, target: &ProbeTarget) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.calls.push(format!("probe:{}", target.name));
        let running = state.find(&target.name).is_some_and(|c| c.running);
        running && !state.unhealthy.contains(&target.name)
    }
}
