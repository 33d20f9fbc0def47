// SSH 探测配置

use std::time::Duration;

use russh::keys::ssh_key::{Algorithm, HashAlg};

/// 探测连接配置
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeConfig {
    /// TCP 连接和 SSH 握手超时（秒）
    pub connect_timeout: u64,
    /// 连接不活动超时（秒）
    pub inactivity_timeout: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: 10,
            inactivity_timeout: 30,
        }
    }
}

impl ProbeConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// 构建 russh 配置
    /// 探测连接只做一次认证，不需要心跳
    pub fn to_russh_config(&self) -> russh::client::Config {
        russh::client::Config {
            inactivity_timeout: Some(Duration::from_secs(self.inactivity_timeout)),
            keepalive_interval: None,
            ..Default::default()
        }
    }
}

/// 认证签名使用的哈希算法：RSA 用 rsa-sha2-256，其他算法不需要
pub fn signature_hash(algorithm: &Algorithm) -> Option<HashAlg> {
    match algorithm {
        Algorithm::Rsa { .. } => Some(HashAlg::Sha256),
        _ => None,
    }
}
