// SSH 探测事件定义

use serde::Serialize;

use super::known_hosts::HostKeyCheck;

/// 探测事件（由客户端和 Handler 发出，验证器汇总）
#[derive(Clone, Debug)]
pub enum ProbeEvent {
    /// 阶段变化
    StageChanged(ProbeStage),
    /// 收到服务器公钥
    HostKey {
        fingerprint: String,
        check: HostKeyCheck,
    },
}

/// 单次验证的阶段
///
/// `Connecting → KeyExchange → Authenticating → {Accepted | Rejected}`，
/// 任一非终止阶段都可以转入 `Unreachable` 或 `Timeout`。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStage {
    /// TCP 连接目标主机
    Connecting,
    /// SSH 握手（密钥交换、主机公钥校验）
    KeyExchange,
    /// 公钥认证
    Authenticating,
    Accepted,
    Rejected,
    Unreachable,
    Timeout,
}

impl ProbeStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::Rejected | Self::Unreachable | Self::Timeout
        )
    }

    /// 状态机允许的转移
    pub fn can_advance_to(&self, next: ProbeStage) -> bool {
        match (self, next) {
            (s, _) if s.is_terminal() => false,
            (_, Self::Unreachable | Self::Timeout) => true,
            (Self::Connecting, Self::KeyExchange) => true,
            (Self::KeyExchange, Self::Authenticating) => true,
            (Self::Authenticating, Self::Accepted | Self::Rejected) => true,
            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Connecting => "Connecting",
            Self::KeyExchange => "Key exchange",
            Self::Authenticating => "Authenticating",
            Self::Accepted => "Accepted",
            Self::Rejected => "Rejected",
            Self::Unreachable => "Unreachable",
            Self::Timeout => "Timeout",
        }
    }
}

/// 阶段轨迹，拒绝非法转移
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StageTrail(Vec<ProbeStage>);

impl StageTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// 推进到下一阶段，非法转移返回 false 且不记录
    pub fn advance(&mut self, next: ProbeStage) -> bool {
        let allowed = match self.0.last() {
            None => next == ProbeStage::Connecting,
            Some(current) => current.can_advance_to(next),
        };
        if allowed {
            self.0.push(next);
        }
        allowed
    }

    pub fn current(&self) -> Option<ProbeStage> {
        self.0.last().copied()
    }

    pub fn is_finished(&self) -> bool {
        self.current().is_some_and(|s| s.is_terminal())
    }

    pub fn stages(&self) -> &[ProbeStage] {
        &self.0
    }
}
