//! Kind: hosts.toml ディレクトリと共有ネットワーク `kind`

use super::{
    ContainerResult, MirrorBackend, connect_registries, create_registries, mirror_endpoint,
    needs_registries, node_hosts_files, write_node_mirrors,
};
use crate::stage::StageContext;
use async_trait::async_trait;
use ksail_container::{
    ContainerFilter, RegistryManager, ensure_network_exists, ownership_labels,
};
use ksail_core::{Distribution, NativeConfig};
use tracing::debug;

/// Kind がノードに付けるクラスタ名ラベル
pub const KIND_CLUSTER_LABEL: &str = "io.x-k8s.kind.cluster";

#[derive(Debug, Default, Clone, Copy)]
pub struct KindBackend;

#[async_trait]
impl MirrorBackend for KindBackend {
    fn distribution(&self) -> Distribution {
        Distribution::Kind
    }

    fn prepare_registry(
        &self,
        ctx: &StageContext<'_>,
        native: &mut NativeConfig,
    ) -> ksail_core::Result<bool> {
        if !needs_registries(ctx) {
            return Ok(false);
        }
        if let NativeConfig::Kind(config) = native {
            if config.apply_mirror_mounts(&ctx.cluster.mirrors_dir) {
                debug!("Added containerd hosts directory mounts to Kind config");
            }
        }
        Ok(true)
    }

    fn prepare_post_connect(
        &self,
        ctx: &StageContext<'_>,
        _native: &mut NativeConfig,
    ) -> ksail_core::Result<bool> {
        Ok(needs_registries(ctx))
    }

    async fn registry_action(
        &self,
        ctx: &StageContext<'_>,
        registries: &RegistryManager,
    ) -> ContainerResult<()> {
        create_registries(ctx, registries, true).await?;

        // ノードにマウントされるディレクトリにも同じ内容を残す
        ctx.hosts_directory()
            .write_specs(ctx.specs, |spec| mirror_endpoint(ctx, &spec.host))?;
        Ok(())
    }

    async fn network_action(
        &self,
        ctx: &StageContext<'_>,
        registries: &RegistryManager,
    ) -> ContainerResult<()> {
        ensure_network_exists(
            registries.docker().as_ref(),
            &ctx.network_name(),
            None,
            ownership_labels(Distribution::Kind, &ctx.cluster.name),
        )
        .await?;
        Ok(())
    }

    async fn connect_action(
        &self,
        ctx: &StageContext<'_>,
        registries: &RegistryManager,
    ) -> ContainerResult<()> {
        connect_registries(ctx, registries, true, None).await?;
        Ok(())
    }

    async fn post_connect_action(
        &self,
        ctx: &StageContext<'_>,
        registries: &RegistryManager,
    ) -> ContainerResult<()> {
        let filter = ContainerFilter {
            all: false,
            labels: vec![format!("{}={}", KIND_CLUSTER_LABEL, ctx.cluster.name)],
            network: None,
        };
        let nodes = registries.docker().list_containers(&filter).await?;
        debug!(nodes = nodes.len(), "Writing mirror configuration to Kind nodes");
        write_node_mirrors(registries.docker().as_ref(), &nodes, &node_hosts_files(ctx)).await
    }
}
