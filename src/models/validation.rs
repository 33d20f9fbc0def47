// 服务器验证结果

use serde::Serialize;

use crate::ssh::ProbeStage;

use super::assessment::KeyAssessment;

/// 验证结论
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    /// 服务器接受了密钥
    Accepted,
    /// 服务器明确拒绝（确定的否定结果）
    Rejected,
    /// 网络、DNS、传输失败或主机公钥不一致（不确定，可由调用方重试）
    Unreachable,
    /// 超过配置的时限
    Timeout,
}

impl ValidationOutcome {
    pub fn from_stage(stage: ProbeStage) -> Option<Self> {
        match stage {
            ProbeStage::Accepted => Some(Self::Accepted),
            ProbeStage::Rejected => Some(Self::Rejected),
            ProbeStage::Unreachable => Some(Self::Unreachable),
            ProbeStage::Timeout => Some(Self::Timeout),
            _ => None,
        }
    }

    /// 结论是否确定（Accepted / Rejected）
    pub fn is_conclusive(&self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected)
    }
}

/// 单次验证的结果，创建后不再修改
#[derive(Clone, Debug, Serialize)]
pub struct ValidationResult {
    pub host_id: String,
    /// host:port
    pub endpoint: String,
    pub username: String,
    pub key: KeyAssessment,
    pub outcome: ValidationOutcome,
    pub latency_ms: u64,
    /// 经过的阶段
    pub stages: Vec<ProbeStage>,
    pub host_key_mismatch: bool,
    /// 服务器公钥指纹（握手阶段收到时）
    pub host_key_fingerprint: Option<String>,
    /// 诊断信息，不用于控制流程
    pub error_detail: Option<String>,
    pub checked_at: String,
}

impl ValidationResult {
    pub fn is_accepted(&self) -> bool {
        self.outcome == ValidationOutcome::Accepted
    }
}
