// 密钥分析服务
// 纯计算：解析密钥、评级强度、检测弱密钥特征，不写任何文件

use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::models::assessment::{KeyAssessment, KeyStrength, WeaknessFlag};
use crate::models::key::{KeyAlgorithm, KeyMaterial};

use super::weak_keys::WeakKeyDatabase;

/// 强度阈值
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StrengthPolicy {
    /// 低于此位数的 RSA 为 critical-weak
    pub rsa_minimum_bits: u32,
    /// 达到此位数的 RSA 为 strong，介于两者之间为 weak
    pub rsa_strong_bits: u32,
}

impl Default for StrengthPolicy {
    fn default() -> Self {
        Self {
            rsa_minimum_bits: 2048,
            rsa_strong_bits: 3072,
        }
    }
}

impl StrengthPolicy {
    /// 按算法和位数评级，返回评级和尺寸相关的弱点
    pub fn rate(&self, algorithm: &KeyAlgorithm, bits: u32) -> (KeyStrength, Vec<WeaknessFlag>) {
        match algorithm {
            KeyAlgorithm::Rsa if bits < self.rsa_minimum_bits => (
                KeyStrength::CriticalWeak,
                vec![WeaknessFlag::KeySizeBelowThreshold {
                    bits,
                    minimum: self.rsa_minimum_bits,
                }],
            ),
            KeyAlgorithm::Rsa if bits < self.rsa_strong_bits => (
                KeyStrength::Weak,
                vec![WeaknessFlag::KeySizeBelowThreshold {
                    bits,
                    minimum: self.rsa_strong_bits,
                }],
            ),
            KeyAlgorithm::Rsa => (KeyStrength::Strong, vec![]),
            // DSA 无论位数一律视为弱（OpenSSH 已弃用）
            KeyAlgorithm::Dsa => (
                KeyStrength::Weak,
                vec![
                    WeaknessFlag::DeprecatedAlgorithm,
                    WeaknessFlag::KeySizeBelowThreshold {
                        bits,
                        minimum: self.rsa_strong_bits,
                    },
                ],
            ),
            KeyAlgorithm::EcdsaP256
            | KeyAlgorithm::EcdsaP384
            | KeyAlgorithm::EcdsaP521
            | KeyAlgorithm::Ed25519 => (KeyStrength::Strong, vec![]),
            KeyAlgorithm::Unknown(_) => (KeyStrength::Acceptable, vec![]),
        }
    }
}

/// 密钥分析器
#[derive(Clone, Debug)]
pub struct KeyAnalyzer {
    weak_keys: WeakKeyDatabase,
    policy: StrengthPolicy,
}

impl Default for KeyAnalyzer {
    fn default() -> Self {
        Self::new(WeakKeyDatabase::builtin())
    }
}

impl KeyAnalyzer {
    pub fn new(weak_keys: WeakKeyDatabase) -> Self {
        Self {
            weak_keys,
            policy: StrengthPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: StrengthPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn weak_keys(&self) -> &WeakKeyDatabase {
        &self.weak_keys
    }

    /// 解析密钥
    pub fn load(&self, key_bytes: &[u8], passphrase: Option<&str>) -> Result<KeyMaterial> {
        KeyMaterial::parse(key_bytes, passphrase)
    }

    /// 解析并评估
    pub fn analyze(&self, key_bytes: &[u8], passphrase: Option<&str>) -> Result<KeyAssessment> {
        let key = self.load(key_bytes, passphrase)?;
        Ok(self.assess(&key))
    }

    /// 读取密钥文件并评估
    pub fn analyze_file(&self, path: &Path, passphrase: Option<&str>) -> Result<KeyAssessment> {
        let bytes = zeroize::Zeroizing::new(std::fs::read(path)?);
        self.analyze(&bytes, passphrase)
    }

    /// 评估已解析的密钥
    pub fn assess(&self, key: &KeyMaterial) -> KeyAssessment {
        let fingerprint = key.fingerprint();
        let bit_length = key.bit_length();
        let (mut strength, mut weaknesses) = self.policy.rate(key.algorithm(), bit_length);

        if let Some(source) = self.weak_keys.blacklist_source(&fingerprint) {
            weaknesses.push(WeaknessFlag::BlacklistedFingerprint {
                source: source.to_string(),
            });
        }

        for rule in self.weak_keys.matching_rules(&key.components()) {
            weaknesses.push(WeaknessFlag::KnownWeakEntropyPattern { rule });
        }

        if weaknesses.iter().any(WeaknessFlag::is_compromise) {
            strength = KeyStrength::CriticalWeak;
        }

        debug!(
            "[Analyzer] {} {} bits {} -> {} ({} weakness flags)",
            key.algorithm(),
            bit_length,
            fingerprint,
            strength.as_str(),
            weaknesses.len()
        );

        KeyAssessment {
            fingerprint,
            algorithm: key.algorithm().clone(),
            format: key.format(),
            strength,
            bit_length,
            weaknesses,
            has_private_key: key.has_private_key(),
            encrypted: key.is_encrypted(),
            comment: key.comment(),
        }
    }
}
