// HostProfile 注册表
// 启动时构建，之后只读

use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::host::{HostKeyPolicy, HostProfile};

const GITHUB_NOT_FOUND: &[&str] = &[
    "repository not found",
    "could not read from remote repository",
];
const GITLAB_NOT_FOUND: &[&str] = &[
    "the project you were looking for could not be found",
    "you don't have permission",
];
const BITBUCKET_NOT_FOUND: &[&str] = &[
    "repository does not exist",
    "you may not have access to this repository",
    "forbidden",
];
const GITEA_NOT_FOUND: &[&str] = &["repository does not exist", "unauthorized"];
const TRANSIENT: &[&str] = &[
    "try again later",
    "temporarily unavailable",
    "too many requests",
    "rate limit",
    "connection reset",
];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn builtin(
    id: &str,
    display_name: &str,
    aliases: &[&str],
    host: &str,
    port: u16,
    not_found: &[&str],
) -> HostProfile {
    HostProfile {
        id: id.to_string(),
        display_name: display_name.to_string(),
        aliases: strings(aliases),
        host: host.to_string(),
        port,
        username: "git".to_string(),
        probe_template: "{name}.git".to_string(),
        host_key_policy: HostKeyPolicy::TrustOnFirstUse,
        not_found_markers: strings(not_found),
        transient_markers: strings(TRANSIENT),
    }
}

/// 内置托管平台
pub fn builtin_profiles() -> Vec<HostProfile> {
    vec![
        builtin("github", "GitHub", &["github.com", "gh"], "github.com", 22, GITHUB_NOT_FOUND),
        builtin(
            "github-443",
            "GitHub (SSH over HTTPS port)",
            &["ssh.github.com"],
            "ssh.github.com",
            443,
            GITHUB_NOT_FOUND,
        ),
        builtin("gitlab", "GitLab", &["gitlab.com", "gl"], "gitlab.com", 22, GITLAB_NOT_FOUND),
        builtin(
            "bitbucket",
            "Bitbucket",
            &["bitbucket.org", "bb"],
            "bitbucket.org",
            22,
            BITBUCKET_NOT_FOUND,
        ),
        builtin("codeberg", "Codeberg", &["codeberg.org"], "codeberg.org", 22, GITEA_NOT_FOUND),
    ]
}

/// HostProfile 注册表
#[derive(Clone, Debug)]
pub struct HostRegistry {
    profiles: Vec<Arc<HostProfile>>,
}

impl HostRegistry {
    /// 只含内置平台
    pub fn builtin() -> Self {
        Self {
            profiles: builtin_profiles().into_iter().map(Arc::new).collect(),
        }
    }

    /// 全局内置注册表
    pub fn global() -> &'static HostRegistry {
        static REGISTRY: Lazy<HostRegistry> = Lazy::new(HostRegistry::builtin);
        &REGISTRY
    }

    /// 内置平台加自定义配置，自定义配置不能覆盖已有标识或别名
    pub fn with_custom(custom: Vec<HostProfile>) -> Result<Self> {
        let mut registry = Self::builtin();
        for profile in custom {
            profile.validate()?;
            let shadowed = std::iter::once(&profile.id)
                .chain(profile.aliases.iter())
                .find(|name| registry.find(name).is_some());
            if let Some(name) = shadowed {
                return Err(Error::Config(format!(
                    "host profile '{}' conflicts with existing identifier '{}'",
                    profile.id, name
                )));
            }
            debug!("[Registry] adding custom host {} ({})", profile.id, profile.endpoint());
            registry.profiles.push(Arc::new(profile));
        }
        Ok(registry)
    }

    fn find(&self, id: &str) -> Option<&Arc<HostProfile>> {
        self.profiles.iter().find(|p| p.matches(id))
    }

    /// 解析主机标识（不区分大小写，支持别名）
    pub fn resolve(&self, id: &str) -> Result<Arc<HostProfile>> {
        self.find(id.trim())
            .cloned()
            .ok_or_else(|| Error::UnknownHost(id.to_string()))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn profiles(&self) -> &[Arc<HostProfile>] {
        &self.profiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles_are_valid() {
        for profile in builtin_profiles() {
            assert!(profile.validate().is_ok(), "{}", profile.id);
            assert_eq!(profile.username, "git");
        }
        assert_eq!(
            HostRegistry::global().ids(),
            vec!["github", "github-443", "gitlab", "bitbucket", "codeberg"]
        );
    }

    #[test]
    fn test_resolve() {
        let registry = HostRegistry::global();
        assert_eq!(registry.resolve("GitHub").unwrap().host, "github.com");
        assert_eq!(registry.resolve("gl").unwrap().id, "gitlab");
        assert_eq!(registry.resolve("github-443").unwrap().port, 443);
        assert!(matches!(
            registry.resolve("sourceforge"),
            Err(Error::UnknownHost(id)) if id == "sourceforge"
        ));
    }

    #[test]
    fn test_custom_profiles() {
        let custom = HostProfile {
            id: "internal".to_string(),
            display_name: "Internal GitLab".to_string(),
            aliases: vec![],
            host: "git.internal.example".to_string(),
            port: 2222,
            username: "git".to_string(),
            probe_template: "{name}.git".to_string(),
            host_key_policy: HostKeyPolicy::TrustOnFirstUse,
            not_found_markers: vec![],
            transient_markers: vec![],
        };
        let registry = HostRegistry::with_custom(vec![custom.clone()]).unwrap();
        assert_eq!(registry.resolve("internal").unwrap().port, 2222);

        let mut shadow = custom.clone();
        shadow.id = "GITHUB".to_string();
        assert!(matches!(
            HostRegistry::with_custom(vec![shadow]),
            Err(Error::Config(_))
        ));

        let mut bad = custom;
        bad.host = String::new();
        assert!(HostRegistry::with_custom(vec![bad]).is_err());
    }
}
