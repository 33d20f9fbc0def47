// SSH 探测模块
//
// 模块结构:
// - config: 探测配置 (ProbeConfig)
// - error: 错误类型 (SshError)
// - event: 探测事件与阶段状态机 (ProbeEvent, ProbeStage, StageTrail)
// - known_hosts: 主机公钥存储 (HostKeyStore)
// - handler: russh Handler 实现
// - client: 连接与认证 (ProbeClient, ProbeSession)
// - repo_probe: 仓库可达性探测 (SshRepositoryProbe)

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod known_hosts;
pub mod repo_probe;

// 公开导出
pub use client::{AuthOutcome, ProbeClient, ProbeSession};
pub use config::ProbeConfig;
pub use error::SshError;
pub use event::{ProbeEvent, ProbeStage, StageTrail};
pub use known_hosts::{HostKeyCheck, HostKeyStore, KnownHost, KnownHostsFile};
pub use repo_probe::{classify_upload_pack, SshRepositoryProbe};
