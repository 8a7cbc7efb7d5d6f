//! ディストリビューション固有の設定（バックエンドがその場で書き換える）

mod k3d;
mod kind;
mod talos;

pub use k3d::*;
pub use kind::*;
pub use talos::*;

/// バックエンドが書き換えるネイティブ設定への参照
#[derive(Debug, Clone, Default, PartialEq)]
pub enum NativeConfig {
    Kind(KindConfig),
    K3d(SimpleConfig),
    Talos(TalosMachineConfig),
    /// VCluster はミラー設定をノードに直接書き込むため設定を持たない
    #[default]
    None,
}

impl NativeConfig {
    /// ネイティブ設定を YAML として出力する
    pub fn to_yaml(&self) -> crate::Result<Option<String>> {
        let yaml = match self {
            NativeConfig::Kind(c) => Some(serde_yaml::to_string(c)?),
            NativeConfig::K3d(c) => Some(serde_yaml::to_string(c)?),
            NativeConfig::Talos(c) => Some(serde_yaml::to_string(c)?),
            NativeConfig::None => None,
        };
        Ok(yaml)
    }

    /// 認証情報を解決した YAML（クラスタ作成コマンドに渡す一時ファイル用）
    pub fn to_resolved_yaml(&self) -> crate::Result<Option<String>> {
        match self {
            NativeConfig::Talos(c) => Ok(Some(serde_yaml::to_string(
                &c.with_resolved_credentials(),
            )?)),
            other => other.to_yaml(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::{Credentials, MirrorSpec};

    #[test]
    fn test_only_resolved_yaml_contains_secrets() {
        let spec = MirrorSpec::for_host("docker.io").with_credentials(Credentials::new(
            Some("ci".into()),
            Some("${KSAIL_NATIVE_TOKEN}".into()),
        ));
        let mut config = TalosMachineConfig::default();
        config.apply_mirrors(&[(spec, "http://10.5.0.254:5000".into())]);
        let native = NativeConfig::Talos(config);

        temp_env::with_var("KSAIL_NATIVE_TOKEN", Some("t0ken-value"), || {
            let written = native.to_yaml().unwrap().unwrap();
            assert!(!written.contains("t0ken-value"));

            let resolved = native.to_resolved_yaml().unwrap().unwrap();
            assert!(resolved.contains("t0ken-value"));
            assert!(!resolved.contains("${KSAIL_NATIVE_TOKEN}"));
        });
    }

    #[test]
    fn test_vcluster_has_no_native_yaml() {
        assert!(NativeConfig::None.to_resolved_yaml().unwrap().is_none());
    }
}
