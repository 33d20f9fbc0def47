// 仓库可达性探测
// 每次探测建立独立连接，执行 git-upload-pack，只读取引用通告的第一个数据包

use std::sync::Arc;

use async_trait::async_trait;
use russh::keys::ssh_key::HashAlg;
use russh::keys::PrivateKey;
use russh::ChannelMsg;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::models::discovery::ProbeAttempt;
use crate::models::host::HostProfile;
use crate::services::discovery::RepositoryProbe;

use super::client::{AuthOutcome, ProbeClient, ProbeSession};
use super::config::ProbeConfig;
use super::error::SshError;
use super::known_hosts::HostKeyStore;

/// pkt-line flush，告诉服务端不再请求任何引用
const FLUSH_PKT: &[u8] = b"0000";

/// 基于 SSH 的仓库探测
pub struct SshRepositoryProbe {
    profile: Arc<HostProfile>,
    key: Arc<PrivateKey>,
    /// `key` 的 SHA-256 指纹
    fingerprint: String,
    store: Arc<HostKeyStore>,
    config: ProbeConfig,
}

impl SshRepositoryProbe {
    pub fn new(
        profile: Arc<HostProfile>,
        key: Arc<PrivateKey>,
        store: Arc<HostKeyStore>,
        config: ProbeConfig,
    ) -> Self {
        let fingerprint = key.public_key().fingerprint(HashAlg::Sha256).to_string();
        Self {
            profile,
            key,
            fingerprint,
            store,
            config,
        }
    }

    async fn upload_pack(
        &self,
        session: &ProbeSession,
        target: &str,
    ) -> Result<ProbeAttempt, SshError> {
        let command = format!("git-upload-pack '{}'", target);
        let mut channel = session.exec(&command).await?;

        let mut stderr = Vec::new();
        let mut exit_status = None;
        let mut advertised = false;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } if !data.is_empty() => {
                    trace!("[Probe] {} advertised {} bytes", target, data.len());
                    advertised = true;
                    let _ = channel.data(FLUSH_PKT).await;
                    let _ = channel.eof().await;
                    break;
                }
                ChannelMsg::ExtendedData { data, ext } if ext == 1 => {
                    stderr.extend_from_slice(&data);
                }
                ChannelMsg::ExitStatus { exit_status: code } => {
                    exit_status = Some(code);
                }
                // 退出码可能在 EOF 之后才到
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        Ok(classify_upload_pack(
            &self.profile,
            advertised,
            &String::from_utf8_lossy(&stderr),
            exit_status,
        ))
    }
}

#[async_trait]
impl RepositoryProbe for SshRepositoryProbe {
    fn key_fingerprint(&self) -> &str {
        &self.fingerprint
    }

    async fn probe(&self, target: &str) -> ProbeAttempt {
        // 探测事件不需要汇总
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let client = ProbeClient::new(
            self.profile.clone(),
            self.store.clone(),
            self.config.clone(),
            event_tx,
        );

        let session = match client.connect(self.key.clone()).await {
            Ok(AuthOutcome::Accepted(session)) => session,
            Ok(AuthOutcome::Rejected { remaining_methods }) => {
                return ProbeAttempt::Fatal(format!(
                    "key rejected mid-run, server suggests {}",
                    remaining_methods
                ));
            }
            Err(e) if e.is_transient() => return ProbeAttempt::Transient(e.to_string()),
            Err(e) => return ProbeAttempt::Fatal(e.to_string()),
        };

        let attempt = match self.upload_pack(&session, target).await {
            Ok(attempt) => attempt,
            Err(e) => ProbeAttempt::Transient(e.to_string()),
        };
        session.close().await;

        debug!("[Probe] {} -> {:?}", target, attempt);
        attempt
    }
}

/// 根据 upload-pack 的输出判断结论
pub fn classify_upload_pack(
    profile: &HostProfile,
    advertised: bool,
    stderr: &str,
    exit_status: Option<u32>,
) -> ProbeAttempt {
    if advertised {
        return ProbeAttempt::Accessible;
    }

    let detail = stderr.trim().to_string();
    if profile.is_transient(stderr) {
        return ProbeAttempt::Transient(detail);
    }
    if profile.is_not_found(stderr) {
        return ProbeAttempt::NotFound(detail);
    }

    match exit_status {
        Some(code) => ProbeAttempt::NotFound(if detail.is_empty() {
            format!("upload-pack exited with status {}", code)
        } else {
            detail
        }),
        None => ProbeAttempt::Transient(if detail.is_empty() {
            "channel closed without exit status".to_string()
        } else {
            detail
        }),
    }
}
