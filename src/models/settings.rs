// Settings 配置数据结构

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::services::discovery::DiscoveryOptions;
use crate::ssh::ProbeConfig;

use super::host::HostProfile;

// ======================== 主配置结构 ========================

/// 应用设置（持久化用）
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub probe: ProbeSettings,
    pub discovery: DiscoverySettings,
    /// 额外的自定义托管平台（如自建 GitLab）
    pub hosts: Vec<HostProfile>,
    pub weak_keys: WeakKeySettings,
    pub known_hosts: KnownHostsSettings,
}

// ======================== 连接设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProbeSettings {
    pub connect_timeout_secs: u64,
    pub inactivity_timeout_secs: u64,
    /// 单次验证的总时限
    pub validation_timeout_secs: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            inactivity_timeout_secs: 30,
            validation_timeout_secs: 20,
        }
    }
}

impl ProbeSettings {
    pub fn to_probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            connect_timeout: self.connect_timeout_secs,
            inactivity_timeout: self.inactivity_timeout_secs,
        }
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }
}

// ======================== 仓库发现设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoverySettings {
    pub concurrency: usize,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub probe_delay_ms: u64,
    pub probe_timeout_secs: u64,
    pub run_timeout_secs: Option<u64>,
    pub namespace: Option<String>,
    pub event_buffer: usize,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 2,
            backoff_base_ms: 500,
            probe_delay_ms: 0,
            probe_timeout_secs: 15,
            run_timeout_secs: None,
            namespace: None,
            event_buffer: 1024,
        }
    }
}

impl DiscoverySettings {
    pub fn to_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            concurrency: self.concurrency,
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            probe_delay: Duration::from_millis(self.probe_delay_ms),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            run_timeout: self.run_timeout_secs.map(Duration::from_secs),
            namespace: self.namespace.clone(),
            event_buffer: self.event_buffer,
        }
    }
}

// ======================== 弱密钥库 / Known Hosts ========================

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WeakKeySettings {
    /// 额外的弱密钥库（JSON），与内置库合并
    pub database_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KnownHostsSettings {
    /// 是否跨进程保存主机公钥记录
    pub persist: bool,
    /// 默认为配置目录下的 known_hosts.json
    pub path: Option<PathBuf>,
}
