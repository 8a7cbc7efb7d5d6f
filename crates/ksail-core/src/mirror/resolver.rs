//! ミラー定義の解決
//!
//! 優先順位（高 → 低）:
//! 1. CLI フラグ（指定されていれば他を無視して置き換え）
//! 2. 永続化済みの設定（Kind の hosts.toml、Talos マシン設定のミラー）
//! 3. プロバイダー既定のミラー集合

use super::spec::{DEFAULT_MIRROR_HOSTS, MirrorSpec};
use crate::error::Result;
use crate::model::Provider;
use tracing::debug;

/// ミラー定義を解決する
///
/// * `flag` - `None` はフラグ未指定。`Some` なら空でもフラグが勝つ（空はミラー無効化）
/// * `existing_hosts_toml` - ディスク上の hosts.toml から復元した定義
/// * `talos_hosts` - 読み込んだ Talos マシン設定に既に存在するミラーのホスト
pub fn resolve_mirror_specs(
    flag: Option<&[String]>,
    existing_hosts_toml: &[MirrorSpec],
    talos_hosts: &[String],
    provider: Provider,
) -> Result<Vec<MirrorSpec>> {
    if let Some(values) = flag {
        let mut specs = Vec::new();
        for value in values.iter().filter(|v| !v.trim().is_empty()) {
            merge_by_host(&mut specs, MirrorSpec::parse(value)?);
        }
        debug!(count = specs.len(), "Mirror specs taken from flag");
        return Ok(specs);
    }

    let mut specs: Vec<MirrorSpec> = if provider.supports_local_mirrors() {
        DEFAULT_MIRROR_HOSTS
            .iter()
            .map(|host| MirrorSpec::for_host(*host))
            .collect()
    } else {
        Vec::new()
    };

    for host in talos_hosts {
        merge_by_host(&mut specs, MirrorSpec::for_host(host.as_str()));
    }
    for spec in existing_hosts_toml {
        merge_by_host(&mut specs, spec.clone());
    }

    debug!(count = specs.len(), %provider, "Mirror specs merged from existing configuration");
    Ok(specs)
}

/// 同じホストの定義は後から来たもので上書きする（位置は維持）
pub fn merge_by_host(specs: &mut Vec<MirrorSpec>, incoming: MirrorSpec) {
    match specs.iter_mut().find(|s| s.host == incoming.host) {
        Some(existing) => *existing = incoming,
        None => specs.push(incoming),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(specs: &[MirrorSpec]) -> Vec<&str> {
        specs.iter().map(|s| s.host.as_str()).collect()
    }

    #[test]
    fn test_flag_replaces_everything() {
        let flag = vec!["gcr.io=https://gcr.io".to_string()];
        let existing = vec![MirrorSpec::new("docker.io", "https://mirror.example.com")];

        let specs =
            resolve_mirror_specs(Some(&flag), &existing, &["quay.io".into()], Provider::Docker)
                .unwrap();

        assert_eq!(specs, vec![MirrorSpec::new("gcr.io", "https://gcr.io")]);
    }

    #[test]
    fn test_empty_flag_disables_mirrors() {
        let flag = vec![String::new()];
        let specs = resolve_mirror_specs(Some(&flag), &[], &[], Provider::Docker).unwrap();
        assert!(specs.is_empty());

        let specs = resolve_mirror_specs(Some(&[]), &[], &[], Provider::Docker).unwrap();
        assert!(specs.is_empty());
    }

    #[test]
    fn test_flag_duplicate_hosts_last_wins() {
        let flag = vec![
            "docker.io=https://a.example.com".to_string(),
            "docker.io=https://b.example.com".to_string(),
        ];
        let specs = resolve_mirror_specs(Some(&flag), &[], &[], Provider::Docker).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].remote, "https://b.example.com");
    }

    #[test]
    fn test_flag_parse_error_propagates() {
        let flag = vec!["docker.io=not-a-url".to_string()];
        assert!(resolve_mirror_specs(Some(&flag), &[], &[], Provider::Docker).is_err());
    }

    #[test]
    fn test_absent_flag_uses_defaults() {
        let specs = resolve_mirror_specs(None, &[], &[], Provider::Docker).unwrap();
        assert_eq!(
            hosts(&specs),
            vec!["docker.io", "ghcr.io", "quay.io", "registry.k8s.io"]
        );
    }

    #[test]
    fn test_cloud_provider_has_no_defaults() {
        let specs = resolve_mirror_specs(None, &[], &[], Provider::Hetzner).unwrap();
        assert!(specs.is_empty());
    }

    #[test]
    fn test_existing_overrides_defaults_by_host() {
        let existing = vec![
            MirrorSpec::new("docker.io", "https://mirror.example.com"),
            MirrorSpec::new("gcr.io", "https://gcr.io"),
        ];
        let specs =
            resolve_mirror_specs(None, &existing, &["mcr.microsoft.com".into()], Provider::Docker)
                .unwrap();

        assert_eq!(
            hosts(&specs),
            vec![
                "docker.io",
                "ghcr.io",
                "quay.io",
                "registry.k8s.io",
                "mcr.microsoft.com",
                "gcr.io"
            ]
        );
        assert_eq!(specs[0].remote, "https://mirror.example.com");
    }

    #[test]
    fn test_host_key_is_case_sensitive() {
        let mut specs = vec![MirrorSpec::for_host("docker.io")];
        merge_by_host(&mut specs, MirrorSpec::for_host("Docker.io"));
        assert_eq!(specs.len(), 2);
    }
}
