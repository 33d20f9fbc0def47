// 集成测试共用的本地 git 服务端
// 只接受 `git` 用户和一个授权公钥，按目标名模拟 git-upload-pack:
// - `ok*` 通告引用
// - `busy*` 服务端繁忙
// - 其他 仓库不存在

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use keyprobe::{HostKeyStore, HostProfile, KeyAnalyzer, ProbeConfig, ServerValidator};
use russh::keys::{PrivateKey, PublicKey};
use russh::server::{self, Auth, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec};
use tokio::net::TcpListener;

pub const HOST_A: &str = include_str!("../fixtures/host_a");
pub const AUTHORIZED: &str = include_str!("../fixtures/ed25519.pub");
pub const AUTHORIZED_KEY: &[u8] = include_bytes!("../fixtures/ed25519");
pub const STRANGER_KEY: &[u8] = include_bytes!("../fixtures/stranger");

/// 一行 pkt-line 格式的引用通告
const ADVERTISEMENT: &[u8] = b"003d0123456789abcdef0123456789abcdef01234567 refs/heads/main\n";
const NOT_FOUND: &[u8] = b"ERROR: Repository not found.\n";
const BUSY: &[u8] = b"fatal: the remote end is busy, try again later\n";

pub struct GitServer {
    authorized: PublicKey,
}

impl GitServer {
    fn verdict(&self, user: &str, key: &PublicKey) -> Auth {
        if user == "git" && key.key_data() == self.authorized.key_data() {
            Auth::Accept
        } else {
            Auth::reject()
        }
    }
}

impl server::Handler for GitServer {
    type Error = russh::Error;

    async fn auth_publickey_offered(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(self.verdict(user, public_key))
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(self.verdict(user, public_key))
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data);
        let target = command
            .trim_start_matches("git-upload-pack ")
            .trim_matches('\'');
        session.channel_success(channel)?;

        // 真实的 upload-pack 通告后等待客户端，通道保持打开
        if target.starts_with("ok") {
            session.data(channel, CryptoVec::from_slice(ADVERTISEMENT))?;
            return Ok(());
        }

        let message = if target.starts_with("busy") { BUSY } else { NOT_FOUND };
        session.extended_data(channel, 1, CryptoVec::from_slice(message))?;
        session.exit_status_request(channel, 1)?;
        session.eof(channel)?;
        session.close(channel)?;
        Ok(())
    }
}

/// 启动测试服务端，返回监听端口
pub async fn spawn_server() -> u16 {
    let host_key = PrivateKey::from_openssh(HOST_A).unwrap();
    let authorized = PublicKey::from_openssh(AUTHORIZED.trim()).unwrap();
    let config = Arc::new(server::Config {
        keys: vec![host_key],
        auth_rejection_time: Duration::from_millis(10),
        auth_rejection_time_initial: Some(Duration::ZERO),
        inactivity_timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let handler = GitServer {
                authorized: authorized.clone(),
            };
            let config = config.clone();
            tokio::spawn(async move {
                if let Ok(session) = server::run_stream(config, socket, handler).await {
                    let _ = session.await;
                }
            });
        }
    });
    port
}

/// 接受连接但从不说话
pub async fn spawn_silent_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    port
}

pub fn profile(port: u16) -> Arc<HostProfile> {
    Arc::new(
        serde_json::from_value(serde_json::json!({
            "id": "local-forge",
            "display_name": "Local Forge",
            "host": "127.0.0.1",
            "port": port,
            "not_found_markers": ["Repository not found"],
            "transient_markers": ["try again later"]
        }))
        .unwrap(),
    )
}

pub fn config() -> ProbeConfig {
    ProbeConfig {
        connect_timeout: 5,
        inactivity_timeout: 5,
    }
}

pub fn validator(store: Arc<HostKeyStore>) -> ServerValidator {
    ServerValidator::new(KeyAnalyzer::default(), store, config())
}
