//! ステージパイプライン
//!
//! Registry → Network → Connect → PostClusterConnect の順に、ディストリビューションに
//! 対応するバックエンドの準備処理と Docker 操作を実行する。
//! パイプライン自身はリトライしない。

use crate::backends::{self, MirrorBackend, default_backends};
use crate::error::{MirrorError, Result};
use crate::stage::{Role, StageContext, StageOutcome};
use ksail_container::{DockerInvoker, HealthProbe, RegistryManager, WaitConfig};
use ksail_core::{ClusterConfig, Distribution, MirrorSpec, NativeConfig, Notifier};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

pub struct MirrorPipeline {
    backends: HashMap<Distribution, Box<dyn MirrorBackend>>,
    invoker: Arc<dyn DockerInvoker>,
    probe: Arc<dyn HealthProbe>,
    notifier: Arc<dyn Notifier>,
    wait: WaitConfig,
    stage_timeout: Option<Duration>,
}

impl MirrorPipeline {
    pub fn new(
        invoker: Arc<dyn DockerInvoker>,
        probe: Arc<dyn HealthProbe>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            backends: default_backends(),
            invoker,
            probe,
            notifier,
            wait: WaitConfig::default(),
            stage_timeout: None,
        }
    }

    /// バックエンドを差し替える
    pub fn with_backend(mut self, backend: Box<dyn MirrorBackend>) -> Self {
        self.backends.insert(backend.distribution(), backend);
        self
    }

    pub fn with_wait_config(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    /// 各ステージの Docker 操作の期限
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = Some(timeout);
        self
    }

    /// クラスタ作成 1 回分のセッションを開始する
    pub fn session<'a>(
        &'a self,
        cluster: &'a ClusterConfig,
        specs: &'a [MirrorSpec],
    ) -> Result<MirrorSession<'a>> {
        let backend = self
            .backends
            .get(&cluster.distribution)
            .ok_or(MirrorError::UnsupportedDistribution(cluster.distribution))?;
        Ok(MirrorSession {
            pipeline: self,
            backend: backend.as_ref(),
            ctx: StageContext::new(cluster, specs),
            completed: None,
        })
    }

    /// 4 つのステージをすべて順に実行する
    pub async fn run_all(
        &self,
        cluster: &ClusterConfig,
        specs: &[MirrorSpec],
        native: &mut NativeConfig,
    ) -> Result<Vec<StageOutcome>> {
        let mut session = self.session(cluster, specs)?;
        let mut outcomes = Vec::with_capacity(Role::ALL.len());
        for role in Role::ALL {
            outcomes.push(session.run_stage(role, native).await?);
        }
        Ok(outcomes)
    }

    async fn execute(
        &self,
        backend: &dyn MirrorBackend,
        role: Role,
        ctx: &StageContext<'_>,
    ) -> Result<()> {
        let docker = self
            .invoker
            .client()
            .await
            .map_err(|source| MirrorError::Stage { role, source })?;

        let mut wait = self.wait.clone();
        if let Some(timeout) = self.stage_timeout {
            wait = wait.with_deadline(tokio::time::Instant::now() + timeout);
        }
        let registries = RegistryManager::new(docker, self.probe.clone()).with_wait_config(wait);

        let run = backends::action(backend, role, ctx, &registries);
        let result = match self.stage_timeout {
            Some(timeout) => tokio::time::timeout(timeout, run)
                .await
                .map_err(|_| MirrorError::StageTimeout { role, timeout })?,
            None => run.await,
        };
        result.map_err(|source| MirrorError::Stage { role, source })
    }
}

/// クラスタ作成 1 回分のステージ実行
///
/// ステージは飛ばせるが、逆順には実行できない。
pub struct MirrorSession<'a> {
    pipeline: &'a MirrorPipeline,
    backend: &'a dyn MirrorBackend,
    ctx: StageContext<'a>,
    completed: Option<Role>,
}

impl<'a> MirrorSession<'a> {
    pub fn context(&self) -> &StageContext<'a> {
        &self.ctx
    }

    /// ステージを 1 つ実行する
    ///
    /// 準備処理が `false` を返した場合は Docker に触れずにスキップする。
    #[instrument(skip(self, native), fields(distribution = %self.ctx.cluster.distribution))]
    pub async fn run_stage(
        &mut self,
        role: Role,
        native: &mut NativeConfig,
    ) -> Result<StageOutcome> {
        if let Some(completed) = self.completed
            && role <= completed
        {
            return Err(MirrorError::OutOfOrder {
                requested: role,
                completed,
            });
        }
        self.completed = Some(role);

        let notifier = &self.pipeline.notifier;
        if !backends::prepare(self.backend, role, &self.ctx, native)? {
            debug!(%role, "Nothing to do, skipping stage");
            return Ok(StageOutcome::Skipped(role));
        }

        notifier.activity(&format!("{} ステージを実行中", role));
        match self.pipeline.execute(self.backend, role, &self.ctx).await {
            Ok(()) => {
                info!(%role, "Stage completed");
                notifier.success(&format!("{} ステージ完了", role));
                Ok(StageOutcome::Completed(role))
            }
            Err(e) => {
                notifier.error(&e.to_string());
                Err(e)
            }
        }
    }

    /// 指定したステージまでをまとめて実行する
    pub async fn run_through(
        &mut self,
        last: Role,
        native: &mut NativeConfig,
    ) -> Result<Vec<StageOutcome>> {
        let mut outcomes = Vec::new();
        for role in Role::ALL {
            if role > last {
                break;
            }
            if self.completed.is_some_and(|c| role <= c) {
                continue;
            }
            outcomes.push(self.run_stage(role, native).await?);
        }
        Ok(outcomes)
    }
}
