//! ミラー定義からレジストリコンテナの識別情報を組み立てる

use crate::docker::{ContainerFilter, DockerApi, REGISTRY_CONTAINER_PORT};
use crate::error::{ContainerError, Result};
use ksail_core::{Credentials, MirrorSpec};
use std::collections::{BTreeMap, BTreeSet};

/// ホストポートの割り当て開始位置
pub const BASE_REGISTRY_PORT: u16 = 5000;

/// レジストリコンテナ 1 つ分の識別情報
///
/// 毎回ミラー定義から組み立て直し、保存はしない。
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryInfo {
    /// コンテナ名
    pub name: String,
    /// アップストリームのホスト名
    pub host: String,
    /// ホスト側に公開するポート
    pub port: u16,
    /// プロキシ先の URL
    pub upstream: String,
    pub credentials: Credentials,
}

impl RegistryInfo {
    /// ホストから到達できるアドレス
    pub fn local_endpoint(&self) -> String {
        format!("localhost:{}", self.port)
    }

    /// クラスタネットワーク内から到達できる URL
    pub fn network_endpoint(&self) -> String {
        format!("http://{}:{}", self.name, REGISTRY_CONTAINER_PORT)
    }
}

/// Docker のコンテナ名・DNS 名として使える形に整える
///
/// 使えない文字は `-` に置き換え、連続する区切り文字は 1 つにまとめる。
pub fn sanitize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
            c
        } else {
            '-'
        };
        let is_sep = matches!(c, '.' | '-' | '_');
        if is_sep && out.ends_with(['.', '-', '_']) {
            continue;
        }
        out.push(c);
    }
    out.trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

/// レジストリのコンテナ名
pub fn registry_name(prefix: Option<&str>, host: &str) -> String {
    match prefix {
        Some(prefix) => sanitize_name(&format!("{}-{}", prefix, host)),
        None => sanitize_name(host),
    }
}

/// 使用中のホストポートとその所有コンテナ
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortSnapshot {
    used: BTreeSet<u16>,
    /// コンテナ名 → レジストリポートに割り当て済みのホストポート
    registries: BTreeMap<String, u16>,
}

impl PortSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_used(&mut self, port: u16) {
        self.used.insert(port);
    }

    pub fn record_registry(&mut self, name: impl Into<String>, port: u16) {
        self.used.insert(port);
        self.registries.insert(name.into(), port);
    }

    pub fn is_used(&self, port: u16) -> bool {
        self.used.contains(&port)
    }

    pub fn registry_port(&self, name: &str) -> Option<u16> {
        self.registries.get(name).copied()
    }
}

impl From<BTreeSet<u16>> for PortSnapshot {
    fn from(used: BTreeSet<u16>) -> Self {
        Self {
            used,
            registries: BTreeMap::new(),
        }
    }
}

/// ミラー定義から [`RegistryInfo`] を組み立てる
///
/// 同じ入力なら常に同じ結果になる。既存のレジストリは同じポートを引き継ぎ、
/// それ以外は `BASE_REGISTRY_PORT` 以上で空いている最小のポートを使う。
pub fn build_registry_infos(
    specs: &[MirrorSpec],
    prefix: Option<&str>,
    ports: &PortSnapshot,
) -> Result<Vec<RegistryInfo>> {
    let mut assigned = BTreeSet::new();
    let mut infos = Vec::with_capacity(specs.len());

    for spec in specs {
        let name = registry_name(prefix, &spec.host);
        let port = match ports.registry_port(&name) {
            Some(port) => port,
            None => (BASE_REGISTRY_PORT..=u16::MAX)
                .find(|p| !ports.is_used(*p) && !assigned.contains(p))
                .ok_or(ContainerError::PortExhausted {
                    base: BASE_REGISTRY_PORT,
                })?,
        };
        assigned.insert(port);

        infos.push(RegistryInfo {
            name,
            host: spec.host.clone(),
            port,
            upstream: spec.remote.clone(),
            credentials: spec.credentials.clone(),
        });
    }

    Ok(infos)
}

/// 稼働中のコンテナが公開しているホストポートを集める
pub async fn collect_used_ports(docker: &dyn DockerApi) -> Result<PortSnapshot> {
    let containers = docker.list_containers(&ContainerFilter::default()).await?;

    let mut snapshot = PortSnapshot::new();
    for container in containers {
        for port in container.ports.iter().filter_map(|p| p.public) {
            snapshot.mark_used(port);
        }
        if let Some(port) = container.registry_host_port() {
            snapshot.record_registry(container.name.clone(), port);
        }
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(hosts: &[&str]) -> Vec<MirrorSpec> {
        hosts.iter().map(|h| MirrorSpec::for_host(*h)).collect()
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("my-cluster-ghcr.io"), "my-cluster-ghcr.io");
        assert_eq!(sanitize_name("dev--registry.k8s.io"), "dev-registry.k8s.io");
        assert_eq!(sanitize_name("dev-localhost:5000"), "dev-localhost-5000");
        assert_eq!(sanitize_name("-weird/host-"), "weird-host");
    }

    #[test]
    fn test_build_is_deterministic() {
        let specs = specs(&["docker.io", "ghcr.io"]);
        let first = build_registry_infos(&specs, Some("my-cluster"), &PortSnapshot::new()).unwrap();
        let second = build_registry_infos(&specs, Some("my-cluster"), &PortSnapshot::new()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first[1].name, "my-cluster-ghcr.io");
        assert_eq!(first[0].port, 5000);
        assert_eq!(first[1].port, 5001);
    }

    #[test]
    fn test_build_skips_used_ports() {
        let used: BTreeSet<u16> = [5000, 5001, 5003].into_iter().collect();
        let infos =
            build_registry_infos(&specs(&["docker.io", "quay.io"]), None, &used.into()).unwrap();

        assert_eq!(infos[0].port, 5002);
        assert_eq!(infos[1].port, 5004);
        assert_eq!(infos[0].name, "docker.io");
    }

    #[test]
    fn test_build_reuses_existing_registry_port() {
        let mut ports = PortSnapshot::new();
        ports.record_registry("dev-docker.io", 5007);
        ports.mark_used(5000);

        let infos =
            build_registry_infos(&specs(&["docker.io", "ghcr.io"]), Some("dev"), &ports).unwrap();
        assert_eq!(infos[0].port, 5007);
        assert_eq!(infos[1].port, 5001);
    }

    #[test]
    fn test_endpoints() {
        let infos = build_registry_infos(&specs(&["ghcr.io"]), Some("dev"), &PortSnapshot::new())
            .unwrap();
        assert_eq!(infos[0].local_endpoint(), "localhost:5000");
        assert_eq!(infos[0].network_endpoint(), "http://dev-ghcr.io:5000");
        assert_eq!(infos[0].upstream, "https://ghcr.io");
    }
}
