//! レジストリの準備完了待機（Exponential Backoff）
//!
//! レジストリの `/v2/` に応答が返るまでポーリングする。ネットワーク接続より前に
//! 必ずここを通す。

use crate::docker::REGISTRY_CONTAINER_PORT;
use crate::error::{ContainerError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument};

/// 待機設定
#[derive(Debug, Clone, PartialEq)]
pub struct WaitConfig {
    /// 最大リトライ回数
    pub max_retries: u32,
    /// 初期待機時間（ミリ秒）
    pub initial_delay_ms: u64,
    /// 最大待機時間（ミリ秒）
    pub max_delay_ms: u64,
    /// Exponential倍率
    pub multiplier: f64,
    /// 呼び出し側の期限。過ぎたら `ContainerError::Cancelled`
    pub deadline: Option<Instant>,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            max_retries: 30,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
            multiplier: 1.5,
            deadline: None,
        }
    }
}

impl WaitConfig {
    /// 指定回数目の待機時間を計算（ミリ秒）
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let delay = self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        (delay as u64).min(self.max_delay_ms)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// ヘルスチェック対象
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeTarget {
    pub name: String,
    /// クラスタネットワーク上のアドレス（未接続なら `None`）
    pub ip: Option<String>,
    pub host_port: u16,
}

impl ProbeTarget {
    /// IP が分かればコンテナへ直接、なければ公開ポート経由で問い合わせる
    pub fn url(&self) -> String {
        match self.ip.as_deref().filter(|ip| !ip.is_empty()) {
            Some(ip) => format!("http://{}:{}/v2/", ip, REGISTRY_CONTAINER_PORT),
            None => format!("http://127.0.0.1:{}/v2/", self.host_port),
        }
    }
}

/// レジストリが応答可能かを調べる
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn is_ready(&self, target: &ProbeTarget) -> bool;
}

/// Registry API v2 のエンドポイントに HTTP で問い合わせる
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpHealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn is_ready(&self, target: &ProbeTarget) -> bool {
        match self.client.get(target.url()).send().await {
            // 認証付きのレジストリは 401 を返す
            Ok(resp) => resp.status().is_success() || resp.status().as_u16() == 401,
            Err(e) => {
                debug!(registry = %target.name, error = %e, "Registry not ready yet");
                false
            }
        }
    }
}

/// レジストリの準備完了を待機
#[instrument(skip(probe, config), fields(registry = %target.name))]
pub async fn wait_for_registry(
    probe: &dyn HealthProbe,
    target: &ProbeTarget,
    config: &WaitConfig,
) -> Result<()> {
    for attempt in 0..config.max_retries {
        if probe.is_ready(target).await {
            debug!(attempt, "Registry is ready");
            return Ok(());
        }

        // 最後の試行でなければ待機
        if attempt + 1 < config.max_retries {
            let delay = Duration::from_millis(config.delay_for_attempt(attempt));
            if let Some(deadline) = config.deadline {
                if Instant::now() + delay > deadline {
                    return Err(ContainerError::Cancelled {
                        registry: target.name.clone(),
                    });
                }
            }
            sleep(delay).await;
        }
    }

    Err(ContainerError::RegistryNotReady {
        registry: target.name.clone(),
        attempts: config.max_retries,
    })
}
