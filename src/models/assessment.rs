// 密钥评估结果

use serde::Serialize;

use super::key::{KeyAlgorithm, KeyFormat};

/// 强度评级（从弱到强排序）
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrength {
    CriticalWeak,
    Weak,
    Acceptable,
    Strong,
}

impl KeyStrength {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CriticalWeak => "critical-weak",
            Self::Weak => "weak",
            Self::Acceptable => "acceptable",
            Self::Strong => "strong",
        }
    }
}

/// 弱点标记
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WeaknessFlag {
    /// 密钥长度低于阈值
    KeySizeBelowThreshold { bits: u32, minimum: u32 },
    /// 已弃用的算法（DSA）
    DeprecatedAlgorithm,
    /// 指纹在已泄露密钥列表中
    BlacklistedFingerprint { source: String },
    /// 命中低熵生成特征（启发式，不是密码学证明）
    KnownWeakEntropyPattern { rule: String },
}

impl WeaknessFlag {
    /// 是否表示密钥已不可信
    pub fn is_compromise(&self) -> bool {
        matches!(
            self,
            Self::BlacklistedFingerprint { .. } | Self::KnownWeakEntropyPattern { .. }
        )
    }
}

/// 密钥评估结果，创建后不再修改
#[derive(Clone, Debug, Serialize)]
pub struct KeyAssessment {
    /// SHA-256 指纹（`SHA256:<base64>`）
    pub fingerprint: String,
    pub algorithm: KeyAlgorithm,
    pub format: KeyFormat,
    pub strength: KeyStrength,
    pub bit_length: u32,
    pub weaknesses: Vec<WeaknessFlag>,
    pub has_private_key: bool,
    pub encrypted: bool,
    pub comment: Option<String>,
}

impl KeyAssessment {
    pub fn is_compromised(&self) -> bool {
        self.weaknesses.iter().any(WeaknessFlag::is_compromise)
    }
}
