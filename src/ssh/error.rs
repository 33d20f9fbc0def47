// SSH 错误类型定义
// 传输层失败，由验证器和仓库发现分类为结果，不直接返回给调用方

use thiserror::Error;

/// SSH 错误类型
#[derive(Debug, Error)]
pub enum SshError {
    /// 地址解析失败
    #[error("Failed to resolve {0}")]
    Resolve(String),

    /// IO 错误（网络连接等）
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 服务器明确拒绝了密钥
    #[error("Authentication rejected, server suggests: {0}")]
    Rejected(String),

    /// 主机公钥与记录不一致
    #[error("Host key mismatch for {host_id}: presented {presented}")]
    HostKeyMismatch { host_id: String, presented: String },

    /// SSH 协议错误
    #[error("SSH protocol error: {0}")]
    Protocol(String),

    /// 密钥错误
    #[error("Key error: {0}")]
    Key(String),

    /// 超时
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// 通道错误
    #[error("Channel error: {0}")]
    Channel(String),

    /// 会话已断开
    #[error("Session disconnected: {0}")]
    Disconnected(String),
}

impl SshError {
    /// 可重试的传输层失败
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Resolve(_)
                | Self::Io(_)
                | Self::Protocol(_)
                | Self::Timeout(_)
                | Self::Channel(_)
                | Self::Disconnected(_)
        )
    }
}

impl From<russh::Error> for SshError {
    fn from(e: russh::Error) -> Self {
        match e {
            russh::Error::IO(io) => SshError::Io(io),
            russh::Error::Disconnect => SshError::Disconnected("server closed the connection".into()),
            other => SshError::Protocol(other.to_string()),
        }
    }
}

impl From<russh::keys::Error> for SshError {
    fn from(e: russh::keys::Error) -> Self {
        SshError::Key(e.to_string())
    }
}
