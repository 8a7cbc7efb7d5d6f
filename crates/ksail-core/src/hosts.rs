//! containerd hosts.toml の読み書き
//!
//! `<root>/<host>/hosts.toml` の形式でミラー設定を永続化する。
//! ノード内では `/etc/containerd/certs.d/<host>/hosts.toml` に配置される。

use crate::error::{CoreError, Result};
use crate::mirror::{MirrorSpec, default_upstream};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// ノード内の containerd レジストリ設定ディレクトリ
pub const CONTAINERD_CERTS_DIR: &str = "/etc/containerd/certs.d";

const HOSTS_FILENAME: &str = "hosts.toml";

#[derive(Debug, Deserialize)]
struct HostsFile {
    server: Option<String>,
    #[serde(default)]
    host: BTreeMap<String, HostEntry>,
}

#[derive(Debug, Deserialize)]
struct HostEntry {
    #[serde(default)]
    #[allow(dead_code)]
    capabilities: Vec<String>,
}

/// hosts.toml を生成する
pub fn render_hosts_toml(upstream: &str, endpoint: &str) -> String {
    format!(
        "server = \"{}\"\n\n[host.\"{}\"]\n  capabilities = [\"pull\", \"resolve\"]\n",
        upstream, endpoint
    )
}

/// hosts.toml を解析してミラー定義を復元する
pub fn parse_hosts_toml(host: &str, content: &str) -> std::result::Result<MirrorSpec, String> {
    let file: HostsFile = toml::from_str(content).map_err(|e| e.to_string())?;
    if file.server.is_none() && file.host.is_empty() {
        return Err("server と host のどちらも定義されていません".to_string());
    }
    let remote = file.server.unwrap_or_else(|| default_upstream(host));
    Ok(MirrorSpec::new(host, remote))
}

/// ノード内での hosts.toml のパス
pub fn node_hosts_path(host: &str) -> String {
    format!("{}/{}/{}", CONTAINERD_CERTS_DIR, host, HOSTS_FILENAME)
}

/// クラスタごとの hosts.toml ディレクトリ
#[derive(Debug, Clone)]
pub struct HostsDirectory {
    root: PathBuf,
}

impl HostsDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 既存のミラー定義を読み込む
    ///
    /// ディレクトリが存在しない場合は空（エラーではない）。
    /// 存在するファイルが解析できない場合はエラー。
    pub fn read_specs(&self) -> Result<Vec<MirrorSpec>> {
        if !self.root.is_dir() {
            debug!(root = %self.root.display(), "Hosts directory not found, no existing mirrors");
            return Ok(Vec::new());
        }

        let read_error = |path: &Path, message: String| CoreError::HostsRead {
            path: path.to_path_buf(),
            message,
        };

        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&self.root)
            .map_err(|e| read_error(&self.root, e.to_string()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();

        let mut specs = Vec::new();
        for dir in dirs {
            let file = dir.join(HOSTS_FILENAME);
            if !file.is_file() {
                continue;
            }
            let Some(host) = dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let content =
                std::fs::read_to_string(&file).map_err(|e| read_error(&file, e.to_string()))?;
            let spec = parse_hosts_toml(host, &content).map_err(|e| read_error(&file, e))?;
            specs.push(spec);
        }

        debug!(count = specs.len(), "Loaded existing hosts.toml mirrors");
        Ok(specs)
    }

    /// ミラー定義を hosts.toml として書き出す
    ///
    /// `specs` に含まれないホストの hosts.toml ディレクトリは削除する。
    pub fn write_specs<F>(&self, specs: &[MirrorSpec], endpoint_for: F) -> Result<Vec<PathBuf>>
    where
        F: Fn(&MirrorSpec) -> String,
    {
        self.prune_stale(specs)?;

        let mut written = Vec::with_capacity(specs.len());
        for spec in specs {
            let dir = self.root.join(&spec.host);
            let path = dir.join(HOSTS_FILENAME);
            std::fs::create_dir_all(&dir).map_err(|source| CoreError::HostsWrite {
                path: dir.clone(),
                source,
            })?;
            let content = render_hosts_toml(&spec.remote, &endpoint_for(spec));
            std::fs::write(&path, content).map_err(|source| CoreError::HostsWrite {
                path: path.clone(),
                source,
            })?;
            written.push(path);
        }
        info!(count = written.len(), root = %self.root.display(), "Wrote hosts.toml files");
        Ok(written)
    }

    /// 現在のミラー集合にないホストのディレクトリを削除する
    ///
    /// hosts.toml を含まないディレクトリには触れない。
    fn prune_stale(&self, specs: &[MirrorSpec]) -> Result<()> {
        if !self.root.is_dir() {
            return Ok(());
        }
        let entries = std::fs::read_dir(&self.root).map_err(|source| CoreError::HostsWrite {
            path: self.root.clone(),
            source,
        })?;

        for dir in entries.filter_map(|entry| entry.ok().map(|e| e.path())) {
            if !dir.join(HOSTS_FILENAME).is_file() {
                continue;
            }
            let Some(host) = dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if specs.iter().any(|spec| spec.host == host) {
                continue;
            }
            std::fs::remove_dir_all(&dir).map_err(|source| CoreError::HostsWrite {
                path: dir.clone(),
                source,
            })?;
            debug!(host, "Removed stale hosts.toml");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_directory_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = HostsDirectory::new(temp_dir.path().join("does-not-exist"));
        assert!(dir.read_specs().unwrap().is_empty());
    }

    #[test]
    fn test_write_then_read() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = HostsDirectory::new(temp_dir.path());
        let specs = vec![
            MirrorSpec::for_host("docker.io"),
            MirrorSpec::new("ghcr.io", "https://ghcr.io"),
        ];

        dir.write_specs(&specs, |s| format!("http://dev-{}:5000", s.host))
            .unwrap();

        let content =
            std::fs::read_to_string(temp_dir.path().join("docker.io").join("hosts.toml")).unwrap();
        assert!(content.contains("server = \"https://registry-1.docker.io\""));
        assert!(content.contains("[host.\"http://dev-docker.io:5000\"]"));

        let loaded = dir.read_specs().unwrap();
        assert_eq!(loaded, specs);
    }

    #[test]
    fn test_rewrite_removes_dropped_hosts() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = HostsDirectory::new(temp_dir.path());
        let endpoint = |s: &MirrorSpec| format!("http://dev-{}:5000", s.host);
        std::fs::create_dir_all(temp_dir.path().join("notes")).unwrap();

        dir.write_specs(
            &[
                MirrorSpec::for_host("docker.io"),
                MirrorSpec::for_host("ghcr.io"),
            ],
            endpoint,
        )
        .unwrap();
        dir.write_specs(&[MirrorSpec::for_host("gcr.io")], endpoint)
            .unwrap();

        let hosts: Vec<String> = dir.read_specs().unwrap().into_iter().map(|s| s.host).collect();
        assert_eq!(hosts, vec!["gcr.io"]);
        // hosts.toml のないディレクトリは残す
        assert!(temp_dir.path().join("notes").is_dir());

        dir.write_specs(&[], endpoint).unwrap();
        assert!(dir.read_specs().unwrap().is_empty());
    }

    #[test]
    fn test_unparsable_file_is_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let host_dir = temp_dir.path().join("quay.io");
        std::fs::create_dir_all(&host_dir).unwrap();
        std::fs::write(host_dir.join("hosts.toml"), "server = [broken").unwrap();

        let result = HostsDirectory::new(temp_dir.path()).read_specs();
        assert!(matches!(result, Err(CoreError::HostsRead { .. })));
    }

    #[test]
    fn test_parse_without_server_uses_default() {
        let spec = parse_hosts_toml(
            "docker.io",
            "[host.\"http://kind-docker.io:5000\"]\n  capabilities = [\"pull\"]\n",
        )
        .unwrap();
        assert_eq!(spec.remote, "https://registry-1.docker.io");
    }

    #[test]
    fn test_node_hosts_path() {
        assert_eq!(
            node_hosts_path("ghcr.io"),
            "/etc/containerd/certs.d/ghcr.io/hosts.toml"
        );
    }
}
