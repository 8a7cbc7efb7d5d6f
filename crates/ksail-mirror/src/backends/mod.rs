//! ディストリビューションごとのミラー設定
//!
//! 各バックエンドは 4 つのステージそれぞれについて、ローカルだけで判断する
//! `prepare_*` と Docker を操作する `*_action` を実装する。

mod k3d;
mod kind;
mod talos;
mod vcluster;

pub use k3d::K3dBackend;
pub use kind::KindBackend;
pub use talos::TalosBackend;
pub use vcluster::VClusterBackend;

use crate::stage::{Role, StageContext};
use async_trait::async_trait;
use ksail_container::{
    ContainerInfo, DockerApi, REGISTRY_CONTAINER_PORT, ReadyRegistry, RegistryInfo,
    RegistryManager, build_registry_infos, collect_used_ports, registry_name,
};
use ksail_core::{Credentials, Distribution, NativeConfig, node_hosts_path, render_hosts_toml};
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use tracing::{debug, info};

type ContainerResult<T> = ksail_container::Result<T>;

/// ミラー設定のバックエンド
#[async_trait]
pub trait MirrorBackend: Send + Sync {
    fn distribution(&self) -> Distribution;

    /// レジストリが必要か。必要ならネイティブ設定にミラーを反映する
    fn prepare_registry(
        &self,
        ctx: &StageContext<'_>,
        native: &mut NativeConfig,
    ) -> ksail_core::Result<bool>;

    fn prepare_network(
        &self,
        ctx: &StageContext<'_>,
        _native: &mut NativeConfig,
    ) -> ksail_core::Result<bool> {
        Ok(needs_registries(ctx))
    }

    fn prepare_connect(
        &self,
        ctx: &StageContext<'_>,
        _native: &mut NativeConfig,
    ) -> ksail_core::Result<bool> {
        Ok(needs_registries(ctx))
    }

    /// 起動前にミラーを設定できるバックエンドでは常に `false`
    fn prepare_post_connect(
        &self,
        _ctx: &StageContext<'_>,
        _native: &mut NativeConfig,
    ) -> ksail_core::Result<bool> {
        Ok(false)
    }

    async fn registry_action(
        &self,
        ctx: &StageContext<'_>,
        registries: &RegistryManager,
    ) -> ContainerResult<()>;

    async fn network_action(
        &self,
        ctx: &StageContext<'_>,
        registries: &RegistryManager,
    ) -> ContainerResult<()>;

    async fn connect_action(
        &self,
        ctx: &StageContext<'_>,
        registries: &RegistryManager,
    ) -> ContainerResult<()>;

    async fn post_connect_action(
        &self,
        _ctx: &StageContext<'_>,
        _registries: &RegistryManager,
    ) -> ContainerResult<()> {
        Ok(())
    }
}

/// ステージに対応する準備処理
pub fn prepare(
    backend: &dyn MirrorBackend,
    role: Role,
    ctx: &StageContext<'_>,
    native: &mut NativeConfig,
) -> ksail_core::Result<bool> {
    match role {
        Role::Registry => backend.prepare_registry(ctx, native),
        Role::Network => backend.prepare_network(ctx, native),
        Role::Connect => backend.prepare_connect(ctx, native),
        Role::PostClusterConnect => backend.prepare_post_connect(ctx, native),
    }
}

/// ステージに対応する Docker 操作
pub async fn action(
    backend: &dyn MirrorBackend,
    role: Role,
    ctx: &StageContext<'_>,
    registries: &RegistryManager,
) -> ContainerResult<()> {
    match role {
        Role::Registry => backend.registry_action(ctx, registries).await,
        Role::Network => backend.network_action(ctx, registries).await,
        Role::Connect => backend.connect_action(ctx, registries).await,
        Role::PostClusterConnect => backend.post_connect_action(ctx, registries).await,
    }
}

/// 既定の 4 バックエンド
pub fn default_backends() -> HashMap<Distribution, Box<dyn MirrorBackend>> {
    let backends: Vec<Box<dyn MirrorBackend>> = vec![
        Box::new(KindBackend),
        Box::new(K3dBackend),
        Box::new(TalosBackend),
        Box::new(VClusterBackend),
    ];
    backends
        .into_iter()
        .map(|b| (b.distribution(), b))
        .collect()
}

/// ミラーかローカルレジストリのどちらかがあるか
pub(crate) fn needs_registries(ctx: &StageContext<'_>) -> bool {
    ctx.has_mirrors() || ctx.local_registry_enabled()
}

/// クラスタネットワーク内から見たミラーのエンドポイント
pub(crate) fn mirror_endpoint(ctx: &StageContext<'_>, host: &str) -> String {
    format!(
        "http://{}:{}",
        registry_name(ctx.name_prefix(), host),
        REGISTRY_CONTAINER_PORT
    )
}

/// 現在のポート使用状況からミラーの識別情報を組み立てる
pub(crate) async fn mirror_infos(
    ctx: &StageContext<'_>,
    registries: &RegistryManager,
) -> ContainerResult<Vec<RegistryInfo>> {
    let ports = collect_used_ports(registries.docker().as_ref()).await?;
    build_registry_infos(ctx.specs, ctx.name_prefix(), &ports)
}

pub(crate) fn local_registry_info(ctx: &StageContext<'_>) -> Option<RegistryInfo> {
    ctx.local_registry_enabled().then(|| {
        let name = ctx.cluster.local_registry_name();
        RegistryInfo {
            host: name.clone(),
            name,
            port: ctx.cluster.local_registry.port,
            upstream: String::new(),
            credentials: Credentials::default(),
        }
    })
}

/// ミラー（と必要ならローカルレジストリ）を作成し、準備完了まで待つ
pub(crate) async fn create_registries(
    ctx: &StageContext<'_>,
    registries: &RegistryManager,
    include_local: bool,
) -> ContainerResult<Vec<ReadyRegistry>> {
    let infos = mirror_infos(ctx, registries).await?;
    let mut created = registries
        .setup_registries(&infos, &ctx.cluster.name, None)
        .await?;

    if include_local && let Some(local) = local_registry_info(ctx) {
        created.push(
            registries
                .setup_local_registry(&local.name, local.port, &ctx.cluster.name)
                .await?,
        );
    }

    let ready = registries
        .wait_for_registries_ready(created, &HashMap::new())
        .await?;
    info!(count = ready.len(), "Registries are ready");
    Ok(ready)
}

/// 作成済みのレジストリの準備完了を再確認し、クラスタネットワークに接続する
pub(crate) async fn connect_registries(
    ctx: &StageContext<'_>,
    registries: &RegistryManager,
    include_local: bool,
    cidr: Option<&str>,
) -> ContainerResult<BTreeMap<String, Option<Ipv4Addr>>> {
    let mut infos = mirror_infos(ctx, registries).await?;
    if include_local && let Some(local) = local_registry_info(ctx) {
        infos.push(local);
    }

    let created = registries.existing_registries(&infos).await?;
    let ready = registries
        .wait_for_registries_ready(created, &HashMap::new())
        .await?;
    registries
        .connect_registries_to_network(&ready, &ctx.network_name(), cidr)
        .await
}

/// ノードに書き込む hosts.toml（ホスト, 内容）
pub(crate) fn node_hosts_files(ctx: &StageContext<'_>) -> Vec<(String, String)> {
    let mut files: Vec<(String, String)> = ctx
        .specs
        .iter()
        .map(|spec| {
            let endpoint = mirror_endpoint(ctx, &spec.host);
            (spec.host.clone(), render_hosts_toml(&spec.remote, &endpoint))
        })
        .collect();

    if let Some(local) = local_registry_info(ctx) {
        let endpoint = format!("http://{}:{}", local.name, REGISTRY_CONTAINER_PORT);
        files.push((
            format!("localhost:{}", local.port),
            render_hosts_toml(&endpoint, &endpoint),
        ));
    }
    files
}

/// 起動済みのノードに hosts.toml を書き込む
pub(crate) async fn write_node_mirrors(
    docker: &dyn DockerApi,
    nodes: &[ContainerInfo],
    files: &[(String, String)],
) -> ContainerResult<()> {
    for node in nodes {
        for (host, content) in files {
            docker
                .write_file(&node.name, &node_hosts_path(host), content)
                .await?;
        }
        debug!(node = %node.name, files = files.len(), "Configured containerd mirrors");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksail_core::{ClusterConfig, MirrorSpec};

    #[test]
    fn test_default_backends_cover_all_distributions() {
        let backends = default_backends();
        for distribution in Distribution::ALL {
            assert_eq!(backends[&distribution].distribution(), distribution);
        }
    }

    #[test]
    fn test_mirror_endpoint_follows_naming() {
        let specs = vec![MirrorSpec::for_host("ghcr.io")];
        let kind = ClusterConfig::new("dev", Distribution::Kind);
        let k3d = ClusterConfig::new("dev", Distribution::K3d);

        assert_eq!(
            mirror_endpoint(&StageContext::new(&kind, &specs), "ghcr.io"),
            "http://dev-ghcr.io:5000"
        );
        assert_eq!(
            mirror_endpoint(&StageContext::new(&k3d, &specs), "ghcr.io"),
            "http://ghcr.io:5000"
        );
    }

    #[test]
    fn test_node_hosts_files_include_local_registry() {
        let specs = vec![MirrorSpec::for_host("docker.io")];
        let mut cluster = ClusterConfig::new("dev", Distribution::Kind);
        cluster.local_registry.enabled = true;

        let files = node_hosts_files(&StageContext::new(&cluster, &specs));
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].0, "docker.io");
        assert!(files[0].1.contains("https://registry-1.docker.io"));
        assert!(files[0].1.contains("http://dev-docker.io:5000"));
        assert_eq!(files[1].0, "localhost:5111");
        assert!(files[1].1.contains("http://dev-local-registry:5000"));
    }
}
