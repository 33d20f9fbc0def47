// SSH 探测客户端
// 建立连接、校验主机公钥、完成一次公钥认证

use std::sync::Arc;

use russh::client::{AuthResult, Handle, Msg};
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg};
use russh::{Channel, Disconnect};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::models::host::HostProfile;

use super::config::{signature_hash, ProbeConfig};
use super::error::SshError;
use super::event::{ProbeEvent, ProbeStage};
use super::handler::ProbeHandler;
use super::known_hosts::HostKeyStore;

/// 认证结果
pub enum AuthOutcome {
    /// 服务器接受了密钥，连接仍然打开
    Accepted(ProbeSession),
    /// 服务器明确拒绝
    Rejected { remaining_methods: String },
}

/// 探测客户端
/// 每次 `connect` 都建立独立的传输连接
pub struct ProbeClient {
    profile: Arc<HostProfile>,
    store: Arc<HostKeyStore>,
    config: ProbeConfig,
    event_sender: mpsc::UnboundedSender<ProbeEvent>,
}

impl ProbeClient {
    pub fn new(
        profile: Arc<HostProfile>,
        store: Arc<HostKeyStore>,
        config: ProbeConfig,
        event_sender: mpsc::UnboundedSender<ProbeEvent>,
    ) -> Self {
        Self {
            profile,
            store,
            config,
            event_sender,
        }
    }

    /// 发送阶段变化事件
    fn emit_stage(&self, stage: ProbeStage) {
        let _ = self.event_sender.send(ProbeEvent::StageChanged(stage));
    }

    /// 连接并用给定私钥认证
    pub async fn connect(&self, key: Arc<PrivateKey>) -> Result<AuthOutcome, SshError> {
        let endpoint = self.profile.endpoint();
        let connect_timeout = self.config.connect_timeout();

        // 阶段 1: TCP 连接
        self.emit_stage(ProbeStage::Connecting);
        let socket_addr = tokio::net::lookup_host(&endpoint)
            .await
            .map_err(|e| SshError::Resolve(format!("{}: {}", endpoint, e)))?
            .next()
            .ok_or_else(|| SshError::Resolve(endpoint.clone()))?;

        debug!("[Probe] connecting to {} ({})", endpoint, socket_addr);
        let tcp_stream = timeout(connect_timeout, TcpStream::connect(socket_addr))
            .await
            .map_err(|_| SshError::Timeout(self.config.connect_timeout))??;
        let _ = tcp_stream.set_nodelay(true);

        // 阶段 2: SSH 握手
        self.emit_stage(ProbeStage::KeyExchange);
        let handler = ProbeHandler::new(
            self.profile.clone(),
            self.store.clone(),
            self.event_sender.clone(),
        );
        let mut handle = timeout(
            connect_timeout,
            russh::client::connect_stream(
                Arc::new(self.config.to_russh_config()),
                tcp_stream,
                handler,
            ),
        )
        .await
        .map_err(|_| SshError::Timeout(self.config.connect_timeout))??;

        // 阶段 3: 认证
        self.emit_stage(ProbeStage::Authenticating);
        let hash_alg = signature_hash(&key.algorithm());
        let auth_result = handle
            .authenticate_publickey(
                &self.profile.username,
                PrivateKeyWithHashAlg::new(key, hash_alg),
            )
            .await?;

        match auth_result {
            AuthResult::Success => {
                debug!("[Probe] {} accepted the key", endpoint);
                Ok(AuthOutcome::Accepted(ProbeSession { handle }))
            }
            AuthResult::Failure {
                remaining_methods,
                partial_success,
            } => {
                debug!(
                    "[Probe] {} rejected the key (partial: {})",
                    endpoint, partial_success
                );
                let remaining_methods = format!("{:?}", remaining_methods);
                disconnect(&handle).await;
                Ok(AuthOutcome::Rejected { remaining_methods })
            }
        }
    }
}

/// 认证成功后的连接
pub struct ProbeSession {
    handle: Handle<ProbeHandler>,
}

impl ProbeSession {
    /// 打开会话通道并执行命令
    pub async fn exec(&self, command: &str) -> Result<Channel<Msg>, SshError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::Channel(e.to_string()))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| SshError::Channel(e.to_string()))?;
        Ok(channel)
    }

    /// 断开连接，失败只记录日志
    pub async fn close(self) {
        disconnect(&self.handle).await;
    }
}

async fn disconnect(handle: &Handle<ProbeHandler>) {
    if let Err(e) = handle
        .disconnect(Disconnect::ByApplication, "", "en")
        .await
    {
        warn!("[Probe] disconnect failed: {}", e);
    }
}
