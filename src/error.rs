// 核心错误类型定义
//
// 网络层的失败（拒绝、不可达、超时）不在这里，它们是 ValidationResult /
// CandidateOutcome 中的结果值，而不是错误。

use thiserror::Error;

/// 核心错误类型
#[derive(Debug, Error)]
pub enum Error {
    /// 密钥编码格式错误或不受支持
    #[error("Key parse error: {0}")]
    Parse(String),

    /// 密钥受口令保护但未提供口令
    #[error("Key is passphrase protected, a passphrase is required")]
    PassphraseRequired,

    /// 提供的口令无法解密密钥
    #[error("Passphrase is incorrect for this key")]
    PassphraseIncorrect,

    /// 未知的主机标识
    #[error("Unknown host profile: {0}")]
    UnknownHost(String),

    /// 探测需要私钥，但只提供了公钥
    #[error("A private key is required to probe a server")]
    PrivateKeyRequired,

    /// 在验证通过之前调用了仓库发现
    #[error("Repository discovery requires a key accepted by '{0}'")]
    KeyNotValidated(String),

    /// 参数不合法
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// 配置错误（主机配置、弱密钥库等）
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
