//! bollard による [`DockerApi`] の実装

// Bollard 0.19 の非推奨APIを一時的に使用
#![allow(deprecated)]

use crate::docker::{
    ContainerFilter, ContainerInfo, ContainerSpec, DockerApi, DockerInvoker, NetworkEndpoint,
    NetworkSpec, NetworkSummary, PortMapping,
};
use crate::error::{ContainerError, Result};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{Config, CreateContainerOptions, ListContainersOptions};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{
    ContainerInspectResponse, ContainerSummary, EndpointIpamConfig, EndpointSettings, HostConfig,
    Ipam, IpamConfig, NetworkConnectRequest, NetworkCreateRequest, NetworkDisconnectRequest,
    PortBinding, RestartPolicy, RestartPolicyNameEnum,
};
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

fn is_status(err: &BollardError, code: u16) -> bool {
    matches!(err, BollardError::DockerResponseServerError { status_code, .. } if *status_code == code)
}

/// bollard クライアントのラッパー
#[derive(Clone)]
pub struct BollardEngine {
    docker: Docker,
}

impl BollardEngine {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// ローカルの Docker に接続し、疎通を確認する
    pub async fn connect_local() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;
        docker
            .ping()
            .await
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;
        Ok(Self::new(docker))
    }
}

fn summary_to_info(summary: ContainerSummary) -> ContainerInfo {
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_default();

    let networks = summary
        .network_settings
        .and_then(|ns| ns.networks)
        .map(|networks| {
            networks
                .into_iter()
                .map(|(name, endpoint)| (name, endpoint.ip_address.filter(|ip| !ip.is_empty())))
                .collect()
        })
        .unwrap_or_default();

    let ports = summary
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|p| PortMapping {
            private: p.private_port,
            public: p.public_port,
        })
        .collect();

    ContainerInfo {
        id: summary.id.unwrap_or_default(),
        name,
        image: summary.image.unwrap_or_default(),
        labels: summary.labels.unwrap_or_default(),
        running: summary
            .state
            .map(|s| s.to_string() == "running")
            .unwrap_or(false),
        networks,
        ports,
    }
}

fn inspect_to_info(inspect: ContainerInspectResponse) -> ContainerInfo {
    let config = inspect.config.unwrap_or_default();
    let network_settings = inspect.network_settings.unwrap_or_default();

    let networks = network_settings
        .networks
        .unwrap_or_default()
        .into_iter()
        .map(|(name, endpoint)| (name, endpoint.ip_address.filter(|ip| !ip.is_empty())))
        .collect();

    let ports = network_settings
        .ports
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, bindings)| {
            let private = key.split('/').next()?.parse::<u16>().ok()?;
            let public = bindings
                .unwrap_or_default()
                .into_iter()
                .find_map(|b| b.host_port.and_then(|p| p.parse::<u16>().ok()));
            Some(PortMapping { private, public })
        })
        .collect();

    ContainerInfo {
        id: inspect.id.unwrap_or_default(),
        name: inspect
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default(),
        image: config.image.unwrap_or_default(),
        labels: config.labels.unwrap_or_default(),
        running: inspect.state.and_then(|s| s.running).unwrap_or(false),
        networks,
        ports,
    }
}

/// シェルのシングルクォート内に埋め込めるようにエスケープ
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[async_trait]
impl DockerApi for BollardEngine {
    async fn list_networks(&self, name: &str) -> Result<Vec<NetworkSummary>> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![format!("^{}$", name)]);
        let options = bollard::query_parameters::ListNetworksOptions {
            filters: Some(filters),
            ..Default::default()
        };

        let networks = self.docker.list_networks(Some(options)).await?;

        // name フィルタは部分一致のため完全一致で絞り込む
        Ok(networks
            .into_iter()
            .filter(|n| n.name.as_deref() == Some(name))
            .map(|n| NetworkSummary {
                id: n.id.unwrap_or_default(),
                name: n.name.unwrap_or_default(),
            })
            .collect())
    }

    #[instrument(skip(self, spec), fields(network = %spec.name))]
    async fn create_network(&self, spec: &NetworkSpec) -> Result<()> {
        let ipam = spec.subnet.as_ref().map(|subnet| Ipam {
            driver: Some("default".to_string()),
            config: Some(vec![IpamConfig {
                subnet: Some(subnet.clone()),
                gateway: spec.gateway.clone(),
                ..Default::default()
            }]),
            ..Default::default()
        });

        let request = NetworkCreateRequest {
            name: spec.name.clone(),
            driver: Some(spec.driver.clone()),
            ipam,
            options: Some(spec.options.clone().into_iter().collect()),
            labels: Some(spec.labels.clone().into_iter().collect()),
            ..Default::default()
        };

        self.docker.create_network(request).await?;
        Ok(())
    }

    async fn network_endpoints(&self, network: &str) -> Result<Vec<NetworkEndpoint>> {
        let inspected = match self
            .docker
            .inspect_network(
                network,
                None::<bollard::query_parameters::InspectNetworkOptions>,
            )
            .await
        {
            Ok(n) => n,
            Err(e) if is_status(&e, 404) => {
                return Err(ContainerError::NetworkNotFound {
                    network: network.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mut endpoints: Vec<NetworkEndpoint> = inspected
            .containers
            .unwrap_or_default()
            .into_iter()
            .map(|(id, c)| NetworkEndpoint {
                container_id: id,
                container_name: c.name.unwrap_or_default(),
                // "10.5.0.254/24" 形式
                ipv4: c
                    .ipv4_address
                    .and_then(|ip| ip.split('/').next().map(str::to_string))
                    .filter(|ip| !ip.is_empty()),
            })
            .collect();
        endpoints.sort_by(|a, b| a.container_name.cmp(&b.container_name));
        Ok(endpoints)
    }

    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerInfo>> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        if !filter.labels.is_empty() {
            filters.insert("label".to_string(), filter.labels.clone());
        }
        if let Some(network) = &filter.network {
            filters.insert("network".to_string(), vec![network.clone()]);
        }

        let options = ListContainersOptions {
            all: filter.all,
            filters,
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers.into_iter().map(summary_to_info).collect())
    }

    async fn inspect_container(&self, name_or_id: &str) -> Result<Option<ContainerInfo>> {
        match self
            .docker
            .inspect_container(
                name_or_id,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await
        {
            Ok(inspect) => Ok(Some(inspect_to_info(inspect))),
            Err(e) if is_status(&e, 404) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, spec), fields(container = %spec.name))]
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut exposed_ports = HashMap::new();
        let mut port_bindings = HashMap::new();
        if let Some(port) = &spec.port {
            let key = format!("{}/tcp", port.container_port);
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings.insert(
                key,
                Some(vec![PortBinding {
                    host_ip: Some(port.host_ip.clone()),
                    host_port: Some(port.host_port.to_string()),
                }]),
            );
        }

        let binds = spec
            .volume
            .as_ref()
            .map(|(volume, target)| vec![format!("{}:{}", volume, target)]);

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            binds,
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            exposed_ports: Some(exposed_ports),
            labels: Some(spec.labels.clone().into_iter().collect()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self.docker.create_container(Some(options), config).await?;
        debug!(id = %response.id, "Container created");
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        match self
            .docker
            .start_container(id, None::<bollard::query_parameters::StartContainerOptions>)
            .await
        {
            Ok(_) => Ok(()),
            // 既に起動中
            Err(e) if is_status(&e, 304) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        match self
            .docker
            .stop_container(id, None::<bollard::query_parameters::StopContainerOptions>)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_status(&e, 304) => Ok(()),
            Err(e) if is_status(&e, 404) => Err(ContainerError::ContainerNotFound {
                container: id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_container(&self, id: &str, remove_volumes: bool) -> Result<()> {
        let options = bollard::query_parameters::RemoveContainerOptions {
            force: true,
            v: remove_volumes,
            ..Default::default()
        };
        match self.docker.remove_container(id, Some(options)).await {
            Ok(_) => Ok(()),
            Err(e) if is_status(&e, 404) => Err(ContainerError::ContainerNotFound {
                container: id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        match self
            .docker
            .remove_volume(name, None::<bollard::query_parameters::RemoveVolumeOptions>)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_status(&e, 404) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        ipv4: Option<Ipv4Addr>,
    ) -> Result<()> {
        let endpoint_config = EndpointSettings {
            ipam_config: ipv4.map(|ip| EndpointIpamConfig {
                ipv4_address: Some(ip.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = NetworkConnectRequest {
            container: Some(container.to_string()),
            endpoint_config: Some(endpoint_config),
        };
        match self.docker.connect_network(network, options).await {
            Ok(_) => Ok(()),
            Err(e) if is_status(&e, 404) => Err(ContainerError::NetworkNotFound {
                network: network.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn disconnect_network(&self, network: &str, container: &str) -> Result<()> {
        let options = NetworkDisconnectRequest {
            container: Some(container.to_string()),
            force: Some(true),
        };
        match self.docker.disconnect_network(network, options).await {
            Ok(_) => Ok(()),
            Err(e) if is_status(&e, 404) => Err(ContainerError::NetworkNotFound {
                network: network.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, contents))]
    async fn write_file(&self, container: &str, path: &str, contents: &str) -> Result<()> {
        let parent = path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or(".");
        let script = format!(
            "mkdir -p {} && printf '%s' {} > {}",
            shell_quote(parent),
            shell_quote(contents),
            shell_quote(path)
        );

        let exec = self
            .docker
            .create_exec(
                container,
                CreateExecOptions {
                    cmd: Some(vec!["sh".to_string(), "-c".to_string(), script]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let mut stderr = String::new();
        if let StartExecResults::Attached { mut output, .. } =
            self.docker.start_exec(&exec.id, None).await?
        {
            while let Some(msg) = output.next().await {
                if let Ok(bollard::container::LogOutput::StdErr { message }) = msg {
                    stderr.push_str(&String::from_utf8_lossy(&message));
                }
            }
        }

        let inspected = self.docker.inspect_exec(&exec.id).await?;
        match inspected.exit_code {
            Some(0) | None => Ok(()),
            Some(code) => Err(ContainerError::DockerApiError(format!(
                "{} への {} の書き込みに失敗しました (exit {}): {}",
                container,
                path,
                code,
                stderr.trim()
            ))),
        }
    }
}

/// ローカルの Docker に接続するクライアント供給元
///
/// 1 回の CLI 実行で接続は 1 度だけ確立し、以降は同じハンドルを共有する。
#[derive(Default)]
pub struct LocalDockerInvoker {
    client: OnceCell<Arc<dyn DockerApi>>,
}

impl LocalDockerInvoker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DockerInvoker for LocalDockerInvoker {
    async fn client(&self) -> Result<Arc<dyn DockerApi>> {
        let client = self
            .client
            .get_or_try_init(|| async {
                let engine = BollardEngine::connect_local().await?;
                Ok::<Arc<dyn DockerApi>, ContainerError>(Arc::new(engine))
            })
            .await?;
        Ok(client.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}
