//! ミラーレジストリ定義

use crate::error::{CoreError, Result};
use std::fmt;

/// プロバイダー既定のミラー対象ホスト
pub const DEFAULT_MIRROR_HOSTS: [&str; 4] = ["docker.io", "ghcr.io", "quay.io", "registry.k8s.io"];

/// ホスト名からアップストリーム URL を決める
///
/// `docker.io` は実体の `registry-1.docker.io` を指す。それ以外は `https://<host>`。
pub fn default_upstream(host: &str) -> String {
    match host {
        "docker.io" => "https://registry-1.docker.io".to_string(),
        _ => format!("https://{}", host),
    }
}

/// レジストリ認証情報のプレースホルダー
///
/// `${VAR}` 形式の値は使用時に環境変数から解決する。解決済みの値は保持しない。
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    username: Option<String>,
    password: Option<String>,
}

impl Credentials {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self { username, password }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }

    /// 未解決のユーザー名（プレースホルダーのまま）
    pub fn username_ref(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// 未解決のパスワード（プレースホルダーのまま）
    pub fn password_ref(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn username(&self) -> Option<String> {
        self.username.as_deref().map(expand_placeholders)
    }

    pub fn password(&self) -> Option<String> {
        self.password.as_deref().map(expand_placeholders)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// `${VAR}` を環境変数の値で置換する（未定義は空文字）
pub fn expand_placeholders(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                result.push_str(&std::env::var(name).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

/// ミラーレジストリ定義。識別キーは `host`（大文字小文字を区別）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorSpec {
    pub host: String,
    pub remote: String,
    pub credentials: Credentials,
}

impl MirrorSpec {
    pub fn new(host: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            remote: remote.into(),
            credentials: Credentials::default(),
        }
    }

    /// 既定のアップストリームを持つ定義
    pub fn for_host(host: impl Into<String>) -> Self {
        let host = host.into();
        let remote = default_upstream(&host);
        Self::new(host, remote)
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// フラグ値 `[user:pass@]host[=upstream]` を解析
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidMirrorSpec {
            value: value.to_string(),
        };
        let value_trimmed = value.trim();

        let (left, remote) = match value_trimmed.split_once('=') {
            Some((left, remote)) => (left, Some(remote.trim())),
            None => (value_trimmed, None),
        };

        let (credentials, host) = match left.rsplit_once('@') {
            Some((creds, host)) => {
                let (user, pass) = creds.split_once(':').ok_or_else(invalid)?;
                let credentials = Credentials::new(
                    (!user.is_empty()).then(|| user.to_string()),
                    (!pass.is_empty()).then(|| pass.to_string()),
                );
                (credentials, host.trim())
            }
            None => (Credentials::default(), left.trim()),
        };

        if host.is_empty() || host.contains('/') || host.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        let remote = match remote {
            Some(r) if r.starts_with("http://") || r.starts_with("https://") => r.to_string(),
            Some(_) => return Err(invalid()),
            None => default_upstream(host),
        };

        Ok(Self::new(host, remote).with_credentials(credentials))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_and_upstream() {
        let spec = MirrorSpec::parse("gcr.io=https://gcr.io").unwrap();
        assert_eq!(spec.host, "gcr.io");
        assert_eq!(spec.remote, "https://gcr.io");
        assert!(spec.credentials.is_empty());
    }

    #[test]
    fn test_parse_host_only_uses_default_upstream() {
        let spec = MirrorSpec::parse("docker.io").unwrap();
        assert_eq!(spec.remote, "https://registry-1.docker.io");
    }

    #[test]
    fn test_parse_with_credentials() {
        let spec = MirrorSpec::parse("${GH_USER}:${GH_TOKEN}@ghcr.io=https://ghcr.io").unwrap();
        assert_eq!(spec.host, "ghcr.io");
        assert_eq!(spec.credentials.username_ref(), Some("${GH_USER}"));
        assert_eq!(spec.credentials.password_ref(), Some("${GH_TOKEN}"));
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(MirrorSpec::parse("").is_err());
        assert!(MirrorSpec::parse("docker.io=ftp://x").is_err());
        assert!(MirrorSpec::parse("a/b=https://x").is_err());
        assert!(MirrorSpec::parse("nocolon@ghcr.io").is_err());
    }

    #[test]
    fn test_credentials_resolve_on_demand() {
        let spec = MirrorSpec::parse("${KSAIL_TEST_USER}:${KSAIL_TEST_PASS}@ghcr.io").unwrap();
        temp_env::with_vars(
            [
                ("KSAIL_TEST_USER", Some("octocat")),
                ("KSAIL_TEST_PASS", Some("s3cret")),
            ],
            || {
                assert_eq!(spec.credentials.username().as_deref(), Some("octocat"));
                assert_eq!(spec.credentials.password().as_deref(), Some("s3cret"));
            },
        );
        // 解決結果は保持されない
        assert_eq!(spec.credentials.username_ref(), Some("${KSAIL_TEST_USER}"));
    }

    #[test]
    fn test_expand_placeholders_missing_var() {
        temp_env::with_var_unset("KSAIL_TEST_MISSING", || {
            assert_eq!(expand_placeholders("a-${KSAIL_TEST_MISSING}-b"), "a--b");
        });
        assert_eq!(expand_placeholders("literal"), "literal");
        assert_eq!(expand_placeholders("open ${BROKEN"), "open ${BROKEN");
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new(Some("user".into()), Some("plain-secret".into()));
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("plain-secret"));
    }
}
