//! ミラーレジストリコンテナの管理
//!
//! レジストリは「作成 → 準備完了 → ネットワーク接続」の順でしか扱えない。
//! 準備完了前にクラスタネットワークへ接続すると、Docker の内部 DNS が
//! アップストリームのホスト名（例: `ghcr.io`）をレジストリ自身に解決してしまい、
//! プロキシが自分自身から取得しようとして起動に失敗する。
//!
//! そのため接続は [`ReadyRegistry`] しか受け取らず、[`ReadyRegistry`] は
//! [`RegistryManager::wait_for_registries_ready`] からしか得られない。

use crate::docker::{
    CLUSTER_LABEL, ContainerInfo, ContainerSpec, DockerApi, HostPortBinding, MIRROR_HOST_LABEL,
    REGISTRY_CONTAINER_PORT, REGISTRY_LABEL,
};
use crate::error::{ContainerError, Result};
use crate::info::RegistryInfo;
use crate::waiter::{HealthProbe, ProbeTarget, WaitConfig, wait_for_registry};
use ksail_core::{Credentials, Ipv4Cidr};
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// プルスルーキャッシュに使うイメージ
pub const REGISTRY_IMAGE: &str = "registry:3";

const REGISTRY_DATA_PATH: &str = "/var/lib/registry";

/// Docker の既定ネットワーク（利用中判定の対象外）
const DEFAULT_NETWORKS: [&str; 3] = ["bridge", "host", "none"];

/// 作成済み（未確認）のレジストリ
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedRegistry {
    info: RegistryInfo,
    container_id: String,
}

impl CreatedRegistry {
    pub fn info(&self) -> &RegistryInfo {
        &self.info
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }
}

/// 準備完了が確認されたレジストリ
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyRegistry {
    info: RegistryInfo,
    container_id: String,
}

impl ReadyRegistry {
    pub fn info(&self) -> &RegistryInfo {
        &self.info
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }
}

/// ネットワーク上で見つかったレジストリ
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredRegistry {
    pub id: String,
    pub name: String,
    /// ミラー対象のホスト（ラベルがあれば）
    pub host: Option<String>,
    pub port: Option<u16>,
    pub ipv4: Option<String>,
}

impl From<&RegistryInfo> for DiscoveredRegistry {
    fn from(info: &RegistryInfo) -> Self {
        Self {
            id: info.name.clone(),
            name: info.name.clone(),
            host: Some(info.host.clone()),
            port: Some(info.port),
            ipv4: None,
        }
    }
}

/// 削除処理の結果（レジストリごと）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    /// （レジストリ名, 利用中のコンテナ）
    pub skipped_in_use: Vec<(String, String)>,
    /// （レジストリ名, 失敗理由）
    pub failures: Vec<(String, String)>,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.skipped_in_use.is_empty() && self.failures.is_empty()
    }

    /// 失敗が 1 件でもあれば `ContainerError::CleanupFailed`
    pub fn into_result(self) -> Result<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(ContainerError::CleanupFailed {
                failures: self.failures,
            })
        }
    }
}

/// ミラーレジストリのコンテナ操作
pub struct RegistryManager {
    docker: Arc<dyn DockerApi>,
    probe: Arc<dyn HealthProbe>,
    wait: WaitConfig,
}

impl RegistryManager {
    pub fn new(docker: Arc<dyn DockerApi>, probe: Arc<dyn HealthProbe>) -> Self {
        Self {
            docker,
            probe,
            wait: WaitConfig::default(),
        }
    }

    pub fn with_wait_config(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    pub fn docker(&self) -> &Arc<dyn DockerApi> {
        &self.docker
    }

    /// プルスルーキャッシュとしてレジストリを作成・起動する
    ///
    /// 同名のコンテナが既にあれば再利用する。`upstream_override` があれば
    /// すべてのレジストリのプロキシ先をそれに置き換える。
    #[instrument(skip(self, infos), fields(count = infos.len()))]
    pub async fn setup_registries(
        &self,
        infos: &[RegistryInfo],
        cluster_name: &str,
        upstream_override: Option<&str>,
    ) -> Result<Vec<CreatedRegistry>> {
        let mut created = Vec::with_capacity(infos.len());
        for info in infos {
            let upstream = upstream_override.unwrap_or(&info.upstream);
            let spec = proxy_container_spec(info, cluster_name, upstream);
            let container_id = self.ensure_container(&spec).await?;
            created.push(CreatedRegistry {
                info: info.clone(),
                container_id,
            });
        }
        Ok(created)
    }

    /// プロキシではない通常のレジストリを作成・起動する
    #[instrument(skip(self))]
    pub async fn setup_local_registry(
        &self,
        name: &str,
        port: u16,
        cluster_name: &str,
    ) -> Result<CreatedRegistry> {
        let info = RegistryInfo {
            name: name.to_string(),
            host: name.to_string(),
            port,
            upstream: String::new(),
            credentials: Credentials::default(),
        };
        let mut spec = proxy_container_spec(&info, cluster_name, "");
        spec.env.clear();
        spec.labels.remove(MIRROR_HOST_LABEL);

        let container_id = self.ensure_container(&spec).await?;
        Ok(CreatedRegistry { info, container_id })
    }

    async fn ensure_container(&self, spec: &ContainerSpec) -> Result<String> {
        let id = match self.docker.inspect_container(&spec.name).await? {
            Some(existing) => {
                debug!(registry = %spec.name, "Reusing existing registry container");
                if existing.running {
                    return Ok(existing.id);
                }
                existing.id
            }
            None => {
                let id = self.docker.create_container(spec).await?;
                info!(registry = %spec.name, image = %spec.image, "Created registry container");
                id
            }
        };
        self.docker.start_container(&id).await?;
        Ok(id)
    }

    /// 既に作成されているレジストリを取得する
    pub async fn existing_registries(&self, infos: &[RegistryInfo]) -> Result<Vec<CreatedRegistry>> {
        let mut found = Vec::with_capacity(infos.len());
        for info in infos {
            let container = self
                .docker
                .inspect_container(&info.name)
                .await?
                .ok_or_else(|| ContainerError::ContainerNotFound {
                    container: info.name.clone(),
                })?;
            found.push(CreatedRegistry {
                info: info.clone(),
                container_id: container.id,
            });
        }
        Ok(found)
    }

    /// すべてのレジストリが応答するまで待機する
    ///
    /// `name_to_ip` に IP がないレジストリは公開ポート経由で確認する。
    #[instrument(skip_all, fields(count = created.len()))]
    pub async fn wait_for_registries_ready(
        &self,
        created: Vec<CreatedRegistry>,
        name_to_ip: &HashMap<String, String>,
    ) -> Result<Vec<ReadyRegistry>> {
        let mut ready = Vec::with_capacity(created.len());
        for registry in created {
            let target = ProbeTarget {
                name: registry.info.name.clone(),
                ip: name_to_ip.get(&registry.info.name).cloned(),
                host_port: registry.info.port,
            };
            wait_for_registry(self.probe.as_ref(), &target, &self.wait).await?;
            ready.push(ReadyRegistry {
                info: registry.info,
                container_id: registry.container_id,
            });
        }
        Ok(ready)
    }

    /// 準備完了したレジストリをネットワークに接続する
    ///
    /// `cidr` があれば、各レジストリにサブネット末尾側から固定 IP を割り当てる。
    /// 既に接続済みのレジストリはそのまま。
    #[instrument(skip(self, ready), fields(count = ready.len()))]
    pub async fn connect_registries_to_network(
        &self,
        ready: &[ReadyRegistry],
        network: &str,
        cidr: Option<&str>,
    ) -> Result<BTreeMap<String, Option<Ipv4Addr>>> {
        let cidr = cidr
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(Ipv4Cidr::parse)
            .transpose()?;

        let mut ips = BTreeMap::new();
        for (index, registry) in ready.iter().enumerate() {
            let name = &registry.info.name;

            let attached = self
                .docker
                .inspect_container(&registry.container_id)
                .await?
                .and_then(|c| c.networks.get(network).cloned());
            if let Some(ip) = attached {
                debug!(registry = %name, network, "Already connected");
                ips.insert(name.clone(), ip.and_then(|ip| ip.parse().ok()));
                continue;
            }

            let ip = cidr.map(|c| c.registry_address(index)).transpose()?;
            self.docker
                .connect_network(network, &registry.container_id, ip)
                .await?;
            info!(registry = %name, network, ip = ?ip, "Connected registry to network");
            ips.insert(name.clone(), ip);
        }
        Ok(ips)
    }

    /// ネットワークに接続されているレジストリを列挙する
    pub async fn list_registries_on_network(
        &self,
        network: &str,
    ) -> Result<Vec<DiscoveredRegistry>> {
        let endpoints = self.docker.network_endpoints(network).await?;

        let mut registries = Vec::new();
        for endpoint in endpoints {
            let Some(container) = self.docker.inspect_container(&endpoint.container_id).await?
            else {
                continue;
            };
            if !container.is_registry() {
                continue;
            }
            registries.push(DiscoveredRegistry {
                id: container.id.clone(),
                name: container.name.clone(),
                host: container.labels.get(MIRROR_HOST_LABEL).cloned(),
                port: container.registry_host_port(),
                ipv4: endpoint.ipv4,
            });
        }
        Ok(registries)
    }

    /// 他のコンテナがまだレジストリを使っているか
    ///
    /// レジストリが接続しているネットワーク（`excluding_network` と既定ネットワークを除く）に
    /// 稼働中の別コンテナがいれば利用中とみなし、そのコンテナ名を返す。
    pub async fn is_registry_in_use(
        &self,
        name: &str,
        excluding_network: Option<&str>,
    ) -> Result<Option<String>> {
        let Some(container) = self.docker.inspect_container(name).await? else {
            return Ok(None);
        };

        for network in container.networks.keys() {
            if DEFAULT_NETWORKS.contains(&network.as_str())
                || Some(network.as_str()) == excluding_network
            {
                continue;
            }
            let endpoints = match self.docker.network_endpoints(network).await {
                Ok(endpoints) => endpoints,
                Err(ContainerError::NetworkNotFound { .. }) => continue,
                Err(e) => return Err(e),
            };
            for endpoint in endpoints {
                if endpoint.container_id == container.id {
                    continue;
                }
                let user = self.docker.inspect_container(&endpoint.container_id).await?;
                if let Some(user) = user.filter(|u| u.running && !u.is_registry()) {
                    return Ok(Some(user.name));
                }
            }
        }
        Ok(None)
    }

    /// レジストリを停止・削除する
    ///
    /// 1 件の失敗で中断せず、すべてのレジストリを試してから結果をまとめて返す。
    #[instrument(skip(self, targets), fields(count = targets.len()))]
    pub async fn delete_registries(
        &self,
        targets: &[DiscoveredRegistry],
        excluding_network: Option<&str>,
        delete_volumes: bool,
    ) -> CleanupReport {
        let mut report = CleanupReport::default();
        for target in targets {
            match self.is_registry_in_use(&target.name, excluding_network).await {
                Ok(Some(user)) => {
                    info!(registry = %target.name, used_by = %user, "Registry still in use, skipping");
                    report.skipped_in_use.push((target.name.clone(), user));
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    report.failures.push((target.name.clone(), e.to_string()));
                    continue;
                }
            }

            match self.remove_registry(target, delete_volumes).await {
                Ok(()) => report.deleted.push(target.name.clone()),
                Err(e) => {
                    warn!(registry = %target.name, error = %e, "Failed to delete registry");
                    report.failures.push((target.name.clone(), e.to_string()));
                }
            }
        }
        report
    }

    async fn remove_registry(&self, target: &DiscoveredRegistry, delete_volumes: bool) -> Result<()> {
        match self.docker.stop_container(&target.id).await {
            Ok(()) | Err(ContainerError::ContainerNotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        match self.docker.remove_container(&target.id, delete_volumes).await {
            Ok(()) | Err(ContainerError::ContainerNotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        if delete_volumes {
            // データは名前付きボリュームに置いているため個別に削除する
            self.docker.remove_volume(&target.name).await?;
        }
        info!(registry = %target.name, "Deleted registry");
        Ok(())
    }

    /// 識別情報からレジストリを削除する
    pub async fn delete_registries_by_info(
        &self,
        infos: &[RegistryInfo],
        excluding_network: Option<&str>,
        delete_volumes: bool,
    ) -> CleanupReport {
        let targets: Vec<DiscoveredRegistry> = infos.iter().map(DiscoveredRegistry::from).collect();
        self.delete_registries(&targets, excluding_network, delete_volumes)
            .await
    }

    /// ネットワーク上のレジストリを削除する
    ///
    /// `prefix` があれば `<prefix>-` で始まるレジストリだけを対象にする。
    /// 対象がなければ `ContainerError::NoRegistriesFound`。
    pub async fn delete_registries_on_network(
        &self,
        network: &str,
        prefix: Option<&str>,
        delete_volumes: bool,
    ) -> Result<CleanupReport> {
        let registries = self.list_registries_on_network(network).await?;
        let targets = filter_by_prefix(registries, prefix);
        if targets.is_empty() {
            return Err(ContainerError::NoRegistriesFound {
                scope: network.to_string(),
            });
        }
        Ok(self
            .delete_registries(&targets, Some(network), delete_volumes)
            .await)
    }

    /// 指定したコンテナをネットワークから切断する
    ///
    /// 既に切断済み・存在しないものは無視する。
    pub async fn disconnect_registries(&self, names: &[String], network: &str) -> Result<Vec<String>> {
        let mut disconnected = Vec::new();
        let mut failures = Vec::new();
        for name in names {
            match self.docker.disconnect_network(network, name).await {
                Ok(()) => disconnected.push(name.clone()),
                Err(ContainerError::NetworkNotFound { .. })
                | Err(ContainerError::ContainerNotFound { .. }) => {
                    debug!(container = %name, network, "Nothing to disconnect");
                }
                Err(e) => failures.push((name.clone(), e.to_string())),
            }
        }
        if failures.is_empty() {
            Ok(disconnected)
        } else {
            Err(ContainerError::CleanupFailed { failures })
        }
    }

    /// ネットワーク上のすべてのコンテナを切断する
    ///
    /// KSail が作成していないコンテナも切断される。レジストリ名を特定できない
    /// クラスタ削除時の最終手段としてのみ使う。
    pub async fn disconnect_all_from_network(&self, network: &str) -> Result<Vec<String>> {
        let endpoints = match self.docker.network_endpoints(network).await {
            Ok(endpoints) => endpoints,
            Err(ContainerError::NetworkNotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let names: Vec<String> = endpoints.into_iter().map(|e| e.container_name).collect();
        if !names.is_empty() {
            warn!(
                network,
                count = names.len(),
                "Disconnecting every container from the network"
            );
        }
        self.disconnect_registries(&names, network).await
    }

    /// ローカルレジストリを削除する。存在しなければ `false`
    pub async fn delete_local_registry(&self, name: &str, delete_volumes: bool) -> Result<bool> {
        let Some(container) = self.docker.inspect_container(name).await? else {
            return Ok(false);
        };
        let target = DiscoveredRegistry {
            id: container.id,
            name: name.to_string(),
            host: None,
            port: None,
            ipv4: None,
        };
        self.remove_registry(&target, delete_volumes).await?;
        Ok(true)
    }

    /// KSail が作成したレジストリ（全クラスタ分）
    pub async fn list_managed_registries(&self) -> Result<Vec<ContainerInfo>> {
        let filter = crate::docker::ContainerFilter {
            all: true,
            labels: vec![REGISTRY_LABEL.to_string()],
            network: None,
        };
        self.docker.list_containers(&filter).await
    }
}

/// `<prefix>-` で始まるレジストリに絞り込む
pub fn filter_by_prefix(
    registries: Vec<DiscoveredRegistry>,
    prefix: Option<&str>,
) -> Vec<DiscoveredRegistry> {
    match prefix {
        Some(prefix) => {
            let prefix = format!("{}-", prefix);
            registries
                .into_iter()
                .filter(|r| r.name.starts_with(&prefix))
                .collect()
        }
        None => registries,
    }
}

fn proxy_container_spec(info: &RegistryInfo, cluster_name: &str, upstream: &str) -> ContainerSpec {
    let mut env = vec![format!("REGISTRY_PROXY_REMOTEURL={}", upstream)];
    // 認証情報は作成時にだけ解決する
    if let Some(username) = info.credentials.username().filter(|u| !u.is_empty()) {
        env.push(format!("REGISTRY_PROXY_USERNAME={}", username));
    }
    if let Some(password) = info.credentials.password().filter(|p| !p.is_empty()) {
        env.push(format!("REGISTRY_PROXY_PASSWORD={}", password));
    }

    let mut labels = BTreeMap::new();
    labels.insert(REGISTRY_LABEL.to_string(), "true".to_string());
    labels.insert(CLUSTER_LABEL.to_string(), cluster_name.to_string());
    labels.insert(MIRROR_HOST_LABEL.to_string(), info.host.clone());

    ContainerSpec {
        name: info.name.clone(),
        image: REGISTRY_IMAGE.to_string(),
        env,
        labels,
        port: Some(HostPortBinding {
            host_ip: "127.0.0.1".to_string(),
            host_port: info.port,
            container_port: REGISTRY_CONTAINER_PORT,
        }),
        volume: Some((info.name.clone(), REGISTRY_DATA_PATH.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FakeDocker, FakeProbe};
    use ksail_core::MirrorSpec;

    fn info(name: &str, host: &str, port: u16) -> RegistryInfo {
        RegistryInfo {
            name: name.into(),
            host: host.into(),
            port,
            upstream: format!("https://{}", host),
            credentials: Credentials::default(),
        }
    }

    fn manager(docker: &FakeDocker) -> RegistryManager {
        RegistryManager::new(Arc::new(docker.clone()), Arc::new(docker.probe()))
            .with_wait_config(WaitConfig {
                max_retries: 2,
                initial_delay_ms: 1,
                max_delay_ms: 1,
                multiplier: 1.0,
                deadline: None,
            })
    }

    #[test]
    fn test_proxy_spec_resolves_credentials() {
        let spec = MirrorSpec::for_host("ghcr.io").with_credentials(Credentials::new(
            Some("${KSAIL_REG_USER}".into()),
            Some("${KSAIL_REG_TOKEN}".into()),
        ));
        let mut registry = info("dev-ghcr.io", "ghcr.io", 5000);
        registry.credentials = spec.credentials.clone();

        let spec = temp_env::with_vars(
            [
                ("KSAIL_REG_USER", Some("bot")),
                ("KSAIL_REG_TOKEN", Some("secret")),
            ],
            || proxy_container_spec(&registry, "dev", "https://ghcr.io"),
        );

        assert!(spec.env.contains(&"REGISTRY_PROXY_REMOTEURL=https://ghcr.io".to_string()));
        assert!(spec.env.contains(&"REGISTRY_PROXY_USERNAME=bot".to_string()));
        assert!(spec.env.contains(&"REGISTRY_PROXY_PASSWORD=secret".to_string()));
        assert_eq!(spec.labels[MIRROR_HOST_LABEL], "ghcr.io");
        assert_eq!(
            spec.volume,
            Some(("dev-ghcr.io".to_string(), REGISTRY_DATA_PATH.to_string()))
        );
    }

    #[tokio::test]
    async fn test_setup_reuses_existing_container() {
        let docker = FakeDocker::new();
        let manager = manager(&docker);
        let infos = vec![info("dev-docker.io", "docker.io", 5000)];

        let first = manager.setup_registries(&infos, "dev", None).await.unwrap();
        let second = manager.setup_registries(&infos, "dev", None).await.unwrap();

        assert_eq!(first[0].container_id(), second[0].container_id());
        assert_eq!(docker.count_calls("create:dev-docker.io"), 1);
    }

    #[tokio::test]
    async fn test_upstream_override() {
        let docker = FakeDocker::new();
        let manager = manager(&docker);
        manager
            .setup_registries(
                &[info("dev-docker.io", "docker.io", 5000)],
                "dev",
                Some("http://proxy.corp:5000"),
            )
            .await
            .unwrap();

        let container = docker.container("dev-docker.io").unwrap();
        assert!(
            container
                .env
                .contains(&"REGISTRY_PROXY_REMOTEURL=http://proxy.corp:5000".to_string())
        );
    }

    #[tokio::test]
    async fn test_connect_assigns_static_ips() {
        let docker = FakeDocker::new();
        docker.add_network("dev");
        let manager = manager(&docker);
        let infos = vec![
            info("dev-docker.io", "docker.io", 5000),
            info("dev-ghcr.io", "ghcr.io", 5001),
        ];

        let created = manager.setup_registries(&infos, "dev", None).await.unwrap();
        let ready = manager
            .wait_for_registries_ready(created, &HashMap::new())
            .await
            .unwrap();
        let ips = manager
            .connect_registries_to_network(&ready, "dev", Some("10.5.0.0/24"))
            .await
            .unwrap();

        assert_eq!(ips["dev-docker.io"], Some(Ipv4Addr::new(10, 5, 0, 254)));
        assert_eq!(ips["dev-ghcr.io"], Some(Ipv4Addr::new(10, 5, 0, 253)));

        // 2 回目は接続済みのため何もしない
        manager
            .connect_registries_to_network(&ready, "dev", Some("10.5.0.0/24"))
            .await
            .unwrap();
        assert_eq!(docker.count_calls("connect:dev:"), 2);
    }

    #[tokio::test]
    async fn test_wait_failure_is_not_docker_error() {
        let docker = FakeDocker::new();
        docker.set_unhealthy("dev-quay.io");
        let manager = manager(&docker);

        let created = manager
            .setup_registries(&[info("dev-quay.io", "quay.io", 5000)], "dev", None)
            .await
            .unwrap();
        let err = manager
            .wait_for_registries_ready(created, &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ContainerError::RegistryNotReady { .. }));
    }

    #[tokio::test]
    async fn test_in_use_detection() {
        let docker = FakeDocker::new();
        docker.add_network("k3d-a");
        docker.add_network("k3d-b");
        docker.add_registry("docker.io", "docker.io", &["k3d-a", "k3d-b"]);
        docker.add_node("k3d-b-server-0", &["k3d-b"]);
        let manager = manager(&docker);

        let user = manager
            .is_registry_in_use("docker.io", Some("k3d-a"))
            .await
            .unwrap();
        assert_eq!(user.as_deref(), Some("k3d-b-server-0"));

        let report = manager
            .delete_registries_on_network("k3d-a", None, false)
            .await
            .unwrap();
        assert_eq!(report.skipped_in_use.len(), 1);
        assert!(report.deleted.is_empty());
        assert_eq!(docker.count_calls("remove:"), 0);
    }

    #[tokio::test]
    async fn test_delete_continues_after_failure() {
        let docker = FakeDocker::new();
        docker.add_network("kind");
        docker.add_registry("dev-docker.io", "docker.io", &["kind"]);
        docker.add_registry("dev-ghcr.io", "ghcr.io", &["kind"]);
        docker.fail_removal("dev-docker.io");
        let manager = manager(&docker);

        let report = manager
            .delete_registries_on_network("kind", Some("dev"), true)
            .await
            .unwrap();
        assert_eq!(report.deleted, vec!["dev-ghcr.io"]);
        assert_eq!(report.failures.len(), 1);
        assert!(docker.container("dev-ghcr.io").is_none());

        let err = report.into_result().unwrap_err();
        assert!(matches!(err, ContainerError::CleanupFailed { .. }));
    }

    #[tokio::test]
    async fn test_delete_by_info_removes_volumes() {
        let docker = FakeDocker::new();
        docker.add_network("dev");
        docker.add_registry("dev-docker.io", "docker.io", &["dev"]);
        let manager = manager(&docker);

        let report = manager
            .delete_registries_by_info(&[info("dev-docker.io", "docker.io", 5000)], None, true)
            .await;
        assert_eq!(report.deleted, vec!["dev-docker.io"]);
        assert!(docker.container("dev-docker.io").is_none());
        assert!(docker.position("volume-rm:dev-docker.io").is_some());
    }

    #[tokio::test]
    async fn test_no_registries_found_is_named() {
        let docker = FakeDocker::new();
        docker.add_network("kind");
        let manager = manager(&docker);

        let err = manager
            .delete_registries_on_network("kind", Some("dev"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, ContainerError::NoRegistriesFound { .. }));
    }

    #[tokio::test]
    async fn test_disconnect_all_from_network() {
        let docker = FakeDocker::new();
        docker.add_network("dev");
        docker.add_registry("dev-docker.io", "docker.io", &["dev"]);
        docker.add_node("unrelated", &["dev"]);
        let manager = manager(&docker);

        let mut disconnected = manager.disconnect_all_from_network("dev").await.unwrap();
        disconnected.sort();
        assert_eq!(disconnected, vec!["dev-docker.io", "unrelated"]);

        // ネットワークがなければ何もしない
        assert!(
            manager
                .disconnect_all_from_network("gone")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_filter_by_prefix() {
        let registries = vec![
            DiscoveredRegistry::from(&info("cluster-a-ghcr.io", "ghcr.io", 5000)),
            DiscoveredRegistry::from(&info("cluster-b-ghcr.io", "ghcr.io", 5001)),
        ];
        let filtered = filter_by_prefix(registries, Some("cluster-a"));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "cluster-a-ghcr.io");
    }
}
