//! クラスタ削除時のレジストリ片付け
//!
//! 2 つの方法がある。
//!
//! - 削除後の探索（Kind / K3d / VCluster）: クラスタ削除後もネットワークが残るので、
//!   そこに接続されているレジストリを探して削除する。
//! - 削除前の探索（Talos）: クラスタ削除でネットワークごと消えるため、削除前に
//!   レジストリを列挙してネットワークから切断し、削除後にその一覧から削除する。
//!
//! 片付けの失敗でクラスタ削除を止めることはない。

use crate::error::Result;
use ksail_container::{
    CleanupReport, ContainerError, DiscoveredRegistry, DockerInvoker, HealthProbe,
    RegistryManager, filter_by_prefix, registry_name,
};
use ksail_core::{ClusterConfig, Distribution, MirrorSpec, Notifier};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// クラスタ削除前に見つけたレジストリ
///
/// 削除後の片付けで 1 度だけ消費する。
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredRegistries {
    network: String,
    registries: Vec<DiscoveredRegistry>,
}

impl DiscoveredRegistries {
    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn registries(&self) -> &[DiscoveredRegistry] {
        &self.registries
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }
}

/// 削除処理全体の結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupSummary {
    pub report: CleanupReport,
    /// 対象のレジストリが 1 つも見つからなかった
    pub no_registries_found: bool,
    /// 探索そのものに失敗した
    pub discovery_error: Option<String>,
    pub local_registry_deleted: bool,
    pub local_registry_error: Option<String>,
}

impl CleanupSummary {
    /// 終了コードに影響する失敗があるか
    pub fn has_fatal_failure(&self) -> bool {
        self.local_registry_error.is_some()
    }
}

pub struct RegistryCleanup {
    invoker: Arc<dyn DockerInvoker>,
    probe: Arc<dyn HealthProbe>,
    notifier: Arc<dyn Notifier>,
}

impl RegistryCleanup {
    pub fn new(
        invoker: Arc<dyn DockerInvoker>,
        probe: Arc<dyn HealthProbe>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            invoker,
            probe,
            notifier,
        }
    }

    async fn manager(&self) -> Result<RegistryManager> {
        let docker = self.invoker.client().await?;
        Ok(RegistryManager::new(docker, self.probe.clone()))
    }

    /// クラスタ削除前にレジストリを列挙し、ネットワークから切断する
    ///
    /// `specs` はクラスタ設定から分かるミラー定義。ネットワーク上にも設定にも
    /// レジストリが見つからない場合は、ネットワーク上の全コンテナを切断する。
    /// KSail が作成していないコンテナも切断されるため、その旨を警告する。
    #[instrument(skip(self, cluster, specs), fields(cluster = %cluster.name))]
    pub async fn prediscover(
        &self,
        cluster: &ClusterConfig,
        specs: &[MirrorSpec],
    ) -> Result<DiscoveredRegistries> {
        let registries = self.manager().await?;
        let network = cluster.network_name();
        let prefix = cluster.registry_name_prefix();

        let listed = match registries.list_registries_on_network(&network).await {
            Ok(listed) => filter_by_prefix(listed, prefix),
            Err(ContainerError::NetworkNotFound { .. }) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        // ネットワークに接続中のものだけを切断する。未接続のレジストリも削除対象には含める
        let mut attached: Vec<String> = listed.iter().map(|r| r.name.clone()).collect();
        let mut discovered = listed;
        for spec in specs {
            let name = registry_name(prefix, &spec.host);
            if discovered.iter().any(|r| r.name == name) {
                continue;
            }
            if let Some(container) = registries.docker().inspect_container(&name).await? {
                if container.networks.contains_key(&network) {
                    attached.push(name.clone());
                }
                discovered.push(DiscoveredRegistry {
                    id: container.id.clone(),
                    name,
                    host: Some(spec.host.clone()),
                    port: container.registry_host_port(),
                    ipv4: container.networks.get(&network).cloned().flatten(),
                });
            }
        }
        if cluster.local_registry.enabled {
            let name = cluster.local_registry_name();
            if !discovered.iter().any(|r| r.name == name)
                && let Some(container) = registries.docker().inspect_container(&name).await?
                && container.networks.contains_key(&network)
            {
                attached.push(name.clone());
                discovered.push(DiscoveredRegistry {
                    id: container.id.clone(),
                    name,
                    host: None,
                    port: container.registry_host_port(),
                    ipv4: None,
                });
            }
        }

        let disconnected = if discovered.is_empty() && specs.is_empty() {
            registries.disconnect_all_from_network(&network).await
        } else {
            registries.disconnect_registries(&attached, &network).await
        };
        match disconnected {
            Ok(names) if discovered.is_empty() && !names.is_empty() => {
                self.notifier.warning(&format!(
                    "レジストリを特定できないため、ネットワーク {} から {} 個のコンテナを切断しました",
                    network,
                    names.len()
                ));
            }
            Ok(_) => {}
            // 切断に失敗しても列挙結果は削除に使う
            Err(ContainerError::CleanupFailed { failures }) => {
                for (name, reason) in &failures {
                    self.notifier.warning(&format!(
                        "{} をネットワーク {} から切断できませんでした: {}",
                        name, network, reason
                    ));
                }
            }
            Err(e) => {
                self.notifier.warning(&format!(
                    "ネットワーク {} からの切断に失敗しました: {}",
                    network, e
                ));
            }
        }

        info!(network = %network, count = discovered.len(), "Pre-discovered registries");
        Ok(DiscoveredRegistries {
            network,
            registries: discovered,
        })
    }

    /// ネットワーク上のクラスタのレジストリを削除する（明示的な片付けコマンド用）
    ///
    /// 対象がなければ `ContainerError::NoRegistriesFound`。
    pub async fn cleanup_registries_by_network(
        &self,
        cluster: &ClusterConfig,
        delete_volumes: bool,
    ) -> Result<CleanupReport> {
        let registries = self.manager().await?;
        let network = cluster.network_name();
        let report = registries
            .delete_registries_on_network(
                &network,
                cluster.registry_name_prefix(),
                delete_volumes,
            )
            .await?;
        Ok(report)
    }

    /// クラスタ削除後の片付け
    ///
    /// `discovered` が空なら削除後の探索に切り替える。ミラーの失敗は警告、
    /// ローカルレジストリの失敗はエラーとして通知する。
    #[instrument(skip(self, cluster, discovered), fields(cluster = %cluster.name))]
    pub async fn cleanup(
        &self,
        cluster: &ClusterConfig,
        discovered: Option<DiscoveredRegistries>,
        delete_volumes: bool,
    ) -> CleanupSummary {
        let mut summary = CleanupSummary::default();
        let registries = match self.manager().await {
            Ok(registries) => registries,
            Err(e) => {
                self.notifier.warning(&format!("レジストリを削除できません: {}", e));
                summary.discovery_error = Some(e.to_string());
                return summary;
            }
        };
        let local_name = cluster.local_registry_name();

        let discovered = discovered
            .map(|d| {
                let network = d.network;
                let mirrors: Vec<DiscoveredRegistry> = d
                    .registries
                    .into_iter()
                    .filter(|r| r.name != local_name)
                    .collect();
                (network, mirrors)
            })
            .filter(|(_, mirrors)| !mirrors.is_empty());

        match discovered {
            Some((network, mirrors)) => {
                debug!(count = mirrors.len(), "Deleting pre-discovered registries");
                summary.report = registries
                    .delete_registries(&mirrors, Some(&network), delete_volumes)
                    .await;
            }
            None => {
                let network = cluster.network_name();
                let prefix = cluster.registry_name_prefix();
                match registries
                    .list_registries_on_network(&network)
                    .await
                    .map(|listed| filter_by_prefix(listed, prefix))
                {
                    Ok(listed) => {
                        let mirrors: Vec<DiscoveredRegistry> =
                            listed.into_iter().filter(|r| r.name != local_name).collect();
                        if mirrors.is_empty() {
                            summary.no_registries_found = true;
                        } else {
                            summary.report = registries
                                .delete_registries(&mirrors, Some(&network), delete_volumes)
                                .await;
                        }
                    }
                    // Talos ではクラスタ削除でネットワークが既に消えている
                    Err(ContainerError::NetworkNotFound { .. }) => {
                        summary.no_registries_found = true;
                    }
                    Err(e) => {
                        warn!(error = %e, "Registry discovery failed");
                        summary.discovery_error = Some(e.to_string());
                    }
                }
            }
        }

        self.report_mirrors(&summary);

        // k3d はローカルレジストリを自分で作成・削除する
        if cluster.local_registry.enabled && cluster.distribution != Distribution::K3d {
            match registries
                .delete_local_registry(&local_name, delete_volumes)
                .await
            {
                Ok(deleted) => {
                    summary.local_registry_deleted = deleted;
                    if deleted {
                        self.notifier
                            .success(&format!("ローカルレジストリ {} を削除しました", local_name));
                    }
                }
                Err(e) => {
                    self.notifier.error(&format!(
                        "ローカルレジストリ {} の削除に失敗しました: {}",
                        local_name, e
                    ));
                    summary.local_registry_error = Some(e.to_string());
                }
            }
        }

        summary
    }

    fn report_mirrors(&self, summary: &CleanupSummary) {
        if summary.no_registries_found {
            self.notifier.activity("削除するミラーレジストリはありません");
        }
        if let Some(error) = &summary.discovery_error {
            self.notifier
                .warning(&format!("ミラーレジストリの探索に失敗しました: {}", error));
        }
        for name in &summary.report.deleted {
            self.notifier
                .success(&format!("ミラーレジストリ {} を削除しました", name));
        }
        for (name, user) in &summary.report.skipped_in_use {
            self.notifier.warning(&format!(
                "ミラーレジストリ {} は {} が使用中のためスキップしました",
                name, user
            ));
        }
        for (name, reason) in &summary.report.failures {
            self.notifier.warning(&format!(
                "ミラーレジストリ {} の削除に失敗しました: {}",
                name, reason
            ));
        }
    }
}
