//! VCluster: 起動後のノードに hosts.toml を直接書き込む

use super::{
    ContainerResult, MirrorBackend, connect_registries, create_registries, node_hosts_files,
    write_node_mirrors,
};
use crate::stage::StageContext;
use async_trait::async_trait;
use ksail_container::{RegistryManager, ensure_network_exists, ownership_labels};
use ksail_core::{Distribution, NativeConfig};

#[derive(Debug, Default, Clone, Copy)]
pub struct VClusterBackend;

#[async_trait]
impl MirrorBackend for VClusterBackend {
    fn distribution(&self) -> Distribution {
        Distribution::VCluster
    }

    fn prepare_registry(
        &self,
        ctx: &StageContext<'_>,
        _native: &mut NativeConfig,
    ) -> ksail_core::Result<bool> {
        Ok(super::needs_registries(ctx))
    }

    fn prepare_post_connect(
        &self,
        ctx: &StageContext<'_>,
        _native: &mut NativeConfig,
    ) -> ksail_core::Result<bool> {
        Ok(super::needs_registries(ctx))
    }

    async fn registry_action(
        &self,
        ctx: &StageContext<'_>,
        registries: &RegistryManager,
    ) -> ContainerResult<()> {
        create_registries(ctx, registries, true).await?;
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
            ownership_labels(Distribution::VCluster, &ctx.cluster.name),
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

    /// ネットワーク上のレジストリ以外の稼働中コンテナをノードとみなす
    async fn post_connect_action(
        &self,
        ctx: &StageContext<'_>,
        registries: &RegistryManager,
    ) -> ContainerResult<()> {
        let docker = registries.docker();
        let mut nodes = Vec::new();
        for endpoint in docker.network_endpoints(&ctx.network_name()).await? {
            if let Some(container) = docker.inspect_container(&endpoint.container_id).await?
                && container.running
                && !container.is_registry()
            {
                nodes.push(container);
            }
        }
        write_node_mirrors(docker.as_ref(), &nodes, &node_hosts_files(ctx)).await
    }
}
