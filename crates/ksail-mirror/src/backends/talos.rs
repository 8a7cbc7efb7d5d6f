//! Talos: マシン設定のミラーパッチと固定 IP
//!
//! ノードは DNS が使えるようになる前にイメージを取得するため、レジストリには
//! クラスタ CIDR 内の固定 IP を割り当て、マシン設定にはその IP を書く。

use super::{
    ContainerResult, MirrorBackend, connect_registries, create_registries, local_registry_info,
    needs_registries,
};
use crate::stage::StageContext;
use async_trait::async_trait;
use ksail_container::{
    REGISTRY_CONTAINER_PORT, RegistryManager, ensure_network_exists, ownership_labels,
};
use ksail_core::{Distribution, Ipv4Cidr, MirrorSpec, NativeConfig};
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
pub struct TalosBackend;

impl TalosBackend {
    fn cidr<'a>(ctx: &StageContext<'a>) -> Option<&'a str> {
        ctx.cluster.network_cidr()
    }
}

#[async_trait]
impl MirrorBackend for TalosBackend {
    fn distribution(&self) -> Distribution {
        Distribution::Talos
    }

    /// 接続時と同じ順序で固定 IP を計算し、マシン設定のエンドポイントにする
    ///
    /// ローカルレジストリはミラーの後ろの IP を使い、`localhost:<port>` のミラーとして書く。
    fn prepare_registry(
        &self,
        ctx: &StageContext<'_>,
        native: &mut NativeConfig,
    ) -> ksail_core::Result<bool> {
        if !needs_registries(ctx) {
            return Ok(false);
        }
        if let (NativeConfig::Talos(config), Some(cidr)) = (native, Self::cidr(ctx)) {
            let cidr = Ipv4Cidr::parse(cidr)?;
            let endpoint_at = |index: usize| -> ksail_core::Result<String> {
                let ip = cidr.registry_address(index)?;
                Ok(format!("http://{}:{}", ip, REGISTRY_CONTAINER_PORT))
            };
            let mut entries = ctx
                .specs
                .iter()
                .enumerate()
                .map(|(index, spec)| Ok((spec.clone(), endpoint_at(index)?)))
                .collect::<ksail_core::Result<Vec<_>>>()?;
            if let Some(local) = local_registry_info(ctx) {
                let endpoint = endpoint_at(ctx.specs.len())?;
                entries.push((
                    MirrorSpec::new(format!("localhost:{}", local.port), endpoint.clone()),
                    endpoint,
                ));
            }
            if config.apply_mirrors(&entries) {
                debug!(count = entries.len(), "Applied mirror patch to Talos config");
            }
        }
        Ok(true)
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
            Self::cidr(ctx),
            ownership_labels(Distribution::Talos, &ctx.cluster.name),
        )
        .await?;
        Ok(())
    }

    async fn connect_action(
        &self,
        ctx: &StageContext<'_>,
        registries: &RegistryManager,
    ) -> ContainerResult<()> {
        connect_registries(ctx, registries, true, Self::cidr(ctx)).await?;
        Ok(())
    }
}
