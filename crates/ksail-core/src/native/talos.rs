//! Talos マシン設定のミラーパッチ

use crate::mirror::{MirrorSpec, expand_placeholders};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Talos マシン設定（ミラーに関係する部分のみ型付け、それ以外は保持）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TalosMachineConfig {
    #[serde(default)]
    pub machine: TalosMachine,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TalosMachine {
    #[serde(default)]
    pub registries: TalosRegistries,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TalosRegistries {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mirrors: BTreeMap<String, TalosMirror>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, TalosRegistryConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TalosMirror {
    #[serde(default)]
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TalosRegistryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<TalosAuth>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TalosAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl TalosMachineConfig {
    /// 既に設定されているミラーのホスト一覧
    ///
    /// ローカルレジストリ用の `localhost:<port>` は含めない。
    pub fn extract_mirror_hosts(&self) -> Vec<String> {
        self.machine
            .registries
            .mirrors
            .keys()
            .filter(|host| !host.starts_with("localhost:"))
            .cloned()
            .collect()
    }

    /// ミラーを既存設定にマージする。変更があれば `true`。
    ///
    /// `entries` は（定義, ノードから到達可能なエンドポイント）の組。
    /// 自前のエンドポイントを先頭に置き、既存のエンドポイントは後ろに残す。
    /// 認証情報は `${VAR}` のまま書き込む。
    pub fn apply_mirrors(&mut self, entries: &[(MirrorSpec, String)]) -> bool {
        let before = self.machine.registries.clone();
        let registries = &mut self.machine.registries;

        for (spec, endpoint) in entries {
            let mirror = registries.mirrors.entry(spec.host.clone()).or_default();
            let mut endpoints = vec![endpoint.clone()];
            endpoints.extend(mirror.endpoints.iter().filter(|e| *e != endpoint).cloned());
            mirror.endpoints = endpoints;

            let username = spec
                .credentials
                .username_ref()
                .filter(|u| !u.is_empty())
                .map(str::to_string);
            let password = spec
                .credentials
                .password_ref()
                .filter(|p| !p.is_empty())
                .map(str::to_string);
            if username.is_some() || password.is_some() {
                registries
                    .config
                    .entry(spec.host.clone())
                    .or_default()
                    .auth = Some(TalosAuth { username, password });
            }
        }

        before != self.machine.registries
    }

    /// 認証情報のプレースホルダーを環境変数で解決した複製
    ///
    /// クラスタ作成コマンドに渡す一時ファイル専用。保存してはいけない。
    pub fn with_resolved_credentials(&self) -> Self {
        let mut resolved = self.clone();
        for config in resolved.machine.registries.config.values_mut() {
            if let Some(auth) = config.auth.as_mut() {
                auth.username = auth.username.as_deref().map(expand_placeholders);
                auth.password = auth.password.as_deref().map(expand_placeholders);
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::Credentials;

    #[test]
    fn test_extract_mirror_hosts() {
        let yaml = r#"
machine:
  registries:
    mirrors:
      docker.io:
        endpoints:
          - http://10.5.0.254:5000
      ghcr.io:
        endpoints: []
      localhost:5000:
        endpoints:
          - http://10.5.0.253:5000
  kubelet:
    image: ghcr.io/siderolabs/kubelet:v1.31.0
"#;
        let config: TalosMachineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.extract_mirror_hosts(), vec!["docker.io", "ghcr.io"]);
        assert!(config.machine.extra.contains_key("kubelet"));
    }

    #[test]
    fn test_apply_mirrors_merges_existing_endpoints() {
        let mut config = TalosMachineConfig::default();
        config.machine.registries.mirrors.insert(
            "docker.io".into(),
            TalosMirror {
                endpoints: vec!["https://mirror.corp".into()],
            },
        );

        let entries = vec![(
            MirrorSpec::for_host("docker.io"),
            "http://10.5.0.254:5000".to_string(),
        )];
        assert!(config.apply_mirrors(&entries));
        assert!(!config.apply_mirrors(&entries));

        assert_eq!(
            config.machine.registries.mirrors["docker.io"].endpoints,
            vec!["http://10.5.0.254:5000", "https://mirror.corp"]
        );
    }

    #[test]
    fn test_apply_mirrors_keeps_credential_placeholders() {
        let spec = MirrorSpec::for_host("ghcr.io").with_credentials(Credentials::new(
            Some("${KSAIL_TALOS_USER}".into()),
            Some("${KSAIL_TALOS_TOKEN}".into()),
        ));
        let mut config = TalosMachineConfig::default();

        temp_env::with_vars(
            [
                ("KSAIL_TALOS_USER", Some("bot")),
                ("KSAIL_TALOS_TOKEN", Some("s3cr3t-value")),
            ],
            || {
                config.apply_mirrors(&[(spec.clone(), "http://10.5.0.253:5000".into())]);

                let yaml = serde_yaml::to_string(&config).unwrap();
                assert!(!yaml.contains("s3cr3t-value"));
                assert!(yaml.contains("${KSAIL_TALOS_TOKEN}"));

                let resolved = config.with_resolved_credentials();
                let auth = resolved.machine.registries.config["ghcr.io"]
                    .auth
                    .clone()
                    .unwrap();
                assert_eq!(auth.username.as_deref(), Some("bot"));
                assert_eq!(auth.password.as_deref(), Some("s3cr3t-value"));
            },
        );

        // 元の設定は解決されないまま
        let auth = config.machine.registries.config["ghcr.io"]
            .auth
            .clone()
            .unwrap();
        assert_eq!(auth.password.as_deref(), Some("${KSAIL_TALOS_TOKEN}"));
    }
}
