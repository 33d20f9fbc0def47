// SSH 客户端 Handler 实现
// 实现 russh::client::Handler trait

use std::future::Future;
use std::sync::Arc;

use russh::keys::ssh_key::HashAlg;
use russh::keys::PublicKey;
use tokio::sync::mpsc;
use tracing::debug;

use crate::models::host::HostProfile;

use super::error::SshError;
use super::event::ProbeEvent;
use super::known_hosts::{HostKeyCheck, HostKeyStore};

/// 探测用 Handler
/// 握手时按 HostKeyStore 校验服务器公钥，不一致时中止连接
pub struct ProbeHandler {
    profile: Arc<HostProfile>,
    store: Arc<HostKeyStore>,
    event_sender: mpsc::UnboundedSender<ProbeEvent>,
}

impl ProbeHandler {
    pub fn new(
        profile: Arc<HostProfile>,
        store: Arc<HostKeyStore>,
        event_sender: mpsc::UnboundedSender<ProbeEvent>,
    ) -> Self {
        Self {
            profile,
            store,
            event_sender,
        }
    }
}

impl russh::client::Handler for ProbeHandler {
    type Error = SshError;

    /// 检查服务器公钥
    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256).to_string();
        let check = self.store.check(&self.profile, server_public_key);

        debug!(
            "[Probe] {} host key {} ({}): {:?}",
            self.profile.id,
            fingerprint,
            server_public_key.algorithm(),
            check
        );

        let _ = self.event_sender.send(ProbeEvent::HostKey {
            fingerprint: fingerprint.clone(),
            check: check.clone(),
        });

        let result = match check {
            HostKeyCheck::Mismatch { .. } => Err(SshError::HostKeyMismatch {
                host_id: self.profile.id.clone(),
                presented: fingerprint,
            }),
            HostKeyCheck::FirstSeen | HostKeyCheck::Match => Ok(true),
        };
        async { result }
    }
}
