//! K3d SimpleConfig

use crate::error::Result;
use crate::mirror::MirrorSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleConfig {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default)]
    pub registries: K3dRegistries,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Default for SimpleConfig {
    fn default() -> Self {
        Self {
            api_version: "k3d.io/v1alpha5".to_string(),
            kind: "Simple".to_string(),
            network: None,
            registries: K3dRegistries::default(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct K3dRegistries {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<K3dRegistryCreate>,
    /// k3s の registries.yaml の内容
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
}

/// k3d がネイティブに作成するレジストリ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct K3dRegistryCreate {
    pub name: String,
    pub host: String,
    pub host_port: String,
}

#[derive(Debug, Serialize)]
struct K3sRegistriesFile {
    mirrors: BTreeMap<String, K3sMirror>,
}

#[derive(Debug, Serialize)]
struct K3sMirror {
    endpoint: Vec<String>,
}

/// k3s の registries.yaml を生成する
pub fn render_registries_config<F>(specs: &[MirrorSpec], endpoint_for: F) -> Result<String>
where
    F: Fn(&MirrorSpec) -> String,
{
    let file = K3sRegistriesFile {
        mirrors: specs
            .iter()
            .map(|spec| {
                (
                    spec.host.clone(),
                    K3sMirror {
                        endpoint: vec![endpoint_for(spec)],
                    },
                )
            })
            .collect(),
    };
    Ok(serde_yaml::to_string(&file)?)
}

impl SimpleConfig {
    /// ミラー設定を `registries.config` に反映する。変更があれば `true`。
    pub fn apply_mirrors<F>(&mut self, specs: &[MirrorSpec], endpoint_for: F) -> Result<bool>
    where
        F: Fn(&MirrorSpec) -> String,
    {
        if specs.is_empty() {
            return Ok(false);
        }
        let rendered = render_registries_config(specs, endpoint_for)?;
        if self.registries.config.as_deref() == Some(rendered.as_str()) {
            return Ok(false);
        }
        self.registries.config = Some(rendered);
        Ok(true)
    }

    /// ローカルレジストリを k3d に作成させる
    pub fn apply_local_registry(&mut self, name: &str, port: u16) -> bool {
        let create = K3dRegistryCreate {
            name: name.to_string(),
            host: "0.0.0.0".to_string(),
            host_port: port.to_string(),
        };
        if self.registries.create.as_ref() == Some(&create) {
            return false;
        }
        self.registries.create = Some(create);
        true
    }

    /// 事前作成したネットワークを k3d に再利用させる
    pub fn apply_network(&mut self, network: &str) -> bool {
        if self.network.as_deref() == Some(network) {
            return false;
        }
        self.network = Some(network.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_registries_config() {
        let specs = vec![MirrorSpec::for_host("docker.io")];
        let rendered =
            render_registries_config(&specs, |s| format!("http://{}:5000", s.host)).unwrap();
        assert!(rendered.contains("docker.io:"));
        assert!(rendered.contains("http://docker.io:5000"));
    }

    #[test]
    fn test_apply_mirrors_reports_change_once() {
        let mut config = SimpleConfig::default();
        let specs = vec![MirrorSpec::for_host("ghcr.io")];
        let endpoint = |s: &MirrorSpec| format!("http://{}:5000", s.host);

        assert!(config.apply_mirrors(&specs, endpoint).unwrap());
        assert!(!config.apply_mirrors(&specs, endpoint).unwrap());
        assert!(!config.apply_mirrors(&[], endpoint).unwrap());
    }

    #[test]
    fn test_local_registry_and_network() {
        let mut config = SimpleConfig::default();
        assert!(config.apply_local_registry("dev-local-registry", 5111));
        assert!(!config.apply_local_registry("dev-local-registry", 5111));
        assert!(config.apply_network("k3d-dev"));
        assert!(!config.apply_network("k3d-dev"));

        let rendered = serde_yaml::to_string(&config).unwrap();
        assert!(rendered.contains("hostPort: '5111'") || rendered.contains("hostPort: \"5111\""));
        assert!(rendered.contains("network: k3d-dev"));
    }
}
