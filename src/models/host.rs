// HostProfile 数据结构
// 描述一个 Git 托管平台的 SSH 端点和探测约定

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// 仓库名占位符
pub const NAME_PLACEHOLDER: &str = "{name}";

/// 主机公钥校验策略
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum HostKeyPolicy {
    /// 首次连接时记录，之后必须一致
    #[default]
    TrustOnFirstUse,
    /// 只接受列表中的指纹（`SHA256:<base64>`）
    Pinned { fingerprints: Vec<String> },
}

/// Git 托管平台配置
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostProfile {
    /// 主机标识（github, gitlab ...）
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// SSH 主机
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// 认证用的服务账号
    #[serde(default = "default_username")]
    pub username: String,
    /// 候选名到探测目标的映射模板，例如 `{name}.git`
    #[serde(default = "default_template")]
    pub probe_template: String,
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
    /// 表示"仓库不存在/无权限"的服务端输出片段（不区分大小写）
    #[serde(default)]
    pub not_found_markers: Vec<String>,
    /// 表示服务端临时故障的输出片段（不区分大小写）
    #[serde(default)]
    pub transient_markers: Vec<String>,
}

fn default_port() -> u16 {
    22
}

fn default_username() -> String {
    "git".to_string()
}

fn default_template() -> String {
    format!("{}.git", NAME_PLACEHOLDER)
}

impl HostProfile {
    /// `host:port`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 是否匹配标识或别名（不区分大小写）
    pub fn matches(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(id))
    }

    /// 根据模板生成探测目标
    pub fn probe_target(&self, name: &str) -> String {
        self.probe_template.replace(NAME_PLACEHOLDER, name)
    }

    pub fn is_not_found(&self, server_output: &str) -> bool {
        contains_any(server_output, &self.not_found_markers)
    }

    pub fn is_transient(&self, server_output: &str) -> bool {
        contains_any(server_output, &self.transient_markers)
    }

    /// 校验自定义配置
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Config("host profile id must not be empty".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(Error::Config(format!("host profile '{}' has no host", self.id)));
        }
        if self.port == 0 {
            return Err(Error::Config(format!("host profile '{}' has port 0", self.id)));
        }
        if self.username.trim().is_empty() {
            return Err(Error::Config(format!(
                "host profile '{}' has no username",
                self.id
            )));
        }
        if !self.probe_template.contains(NAME_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "probe template of '{}' must contain {}",
                self.id, NAME_PLACEHOLDER
            )));
        }
        if let HostKeyPolicy::Pinned { fingerprints } = &self.host_key_policy {
            if fingerprints.is_empty() {
                return Err(Error::Config(format!(
                    "host profile '{}' pins an empty fingerprint list",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

fn contains_any(haystack: &str, markers: &[String]) -> bool {
    let haystack = haystack.to_ascii_lowercase();
    markers
        .iter()
        .filter(|m| !m.is_empty())
        .any(|m| haystack.contains(&m.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> HostProfile {
        serde_json::from_str(
            r#"{
                "id": "forge",
                "display_name": "Forge",
                "host": "git.example.com",
                "not_found_markers": ["Repository not found"]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_serde_defaults() {
        let p = profile();
        assert_eq!(p.port, 22);
        assert_eq!(p.username, "git");
        assert_eq!(p.probe_template, "{name}.git");
        assert_eq!(p.host_key_policy, HostKeyPolicy::TrustOnFirstUse);
        assert_eq!(p.endpoint(), "git.example.com:22");
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_probe_target_and_markers() {
        let p = profile();
        assert_eq!(p.probe_target("acme/tools"), "acme/tools.git");
        assert!(p.is_not_found("ERROR: repository NOT FOUND."));
        assert!(!p.is_not_found("fatal: early EOF"));
        assert!(!p.is_transient("anything"));
    }

    #[test]
    fn test_validate_rejects_bad_template() {
        let mut p = profile();
        p.probe_template = "static.git".to_string();
        assert!(matches!(p.validate(), Err(Error::Config(_))));

        let mut p = profile();
        p.host_key_policy = HostKeyPolicy::Pinned { fingerprints: vec![] };
        assert!(matches!(p.validate(), Err(Error::Config(_))));
    }
}
