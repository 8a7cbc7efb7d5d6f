//! K3d: SimpleConfig の `registries` とクラスタ専用ネットワーク `k3d-<cluster>`

use super::{
    ContainerResult, MirrorBackend, connect_registries, create_registries, mirror_endpoint,
};
use crate::stage::StageContext;
use async_trait::async_trait;
use ksail_container::{RegistryManager, ensure_network_exists, ownership_labels};
use ksail_core::{Distribution, NativeConfig};

#[derive(Debug, Default, Clone, Copy)]
pub struct K3dBackend;

#[async_trait]
impl MirrorBackend for K3dBackend {
    fn distribution(&self) -> Distribution {
        Distribution::K3d
    }

    /// ミラーは `registries.config`、ローカルレジストリは `registries.create` で k3d に任せる
    fn prepare_registry(
        &self,
        ctx: &StageContext<'_>,
        native: &mut NativeConfig,
    ) -> ksail_core::Result<bool> {
        if let NativeConfig::K3d(config) = native {
            if ctx.local_registry_enabled() {
                config.apply_local_registry(
                    &ctx.cluster.local_registry_name(),
                    ctx.cluster.local_registry.port,
                );
            }
            if ctx.has_mirrors() {
                config.apply_mirrors(ctx.specs, |spec| mirror_endpoint(ctx, &spec.host))?;
                config.apply_network(&ctx.network_name());
            }
        }
        Ok(ctx.has_mirrors())
    }

    fn prepare_network(
        &self,
        ctx: &StageContext<'_>,
        _native: &mut NativeConfig,
    ) -> ksail_core::Result<bool> {
        Ok(ctx.has_mirrors())
    }

    fn prepare_connect(
        &self,
        ctx: &StageContext<'_>,
        _native: &mut NativeConfig,
    ) -> ksail_core::Result<bool> {
        Ok(ctx.has_mirrors())
    }

    async fn registry_action(
        &self,
        ctx: &StageContext<'_>,
        registries: &RegistryManager,
    ) -> ContainerResult<()> {
        create_registries(ctx, registries, false).await?;
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
            ownership_labels(Distribution::K3d, &ctx.cluster.name),
        )
        .await?;
        Ok(())
    }

    async fn connect_action(
        &self,
        ctx: &StageContext<'_>,
        registries: &RegistryManager,
    ) -> ContainerResult<()> {
        connect_registries(ctx, registries, false, None).await?;
        Ok(())
    }
}
