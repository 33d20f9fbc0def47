// 弱密钥数据库
//
// 两类检测：
// - 黑名单：公开泄露的密钥指纹（SHA-256）
// - 熵特征规则：历史上有缺陷的随机数生成器留下的数值特征
//
// 熵特征规则全部是启发式的：命中说明"很可能"是弱密钥，未命中不代表安全。
// 规则和指纹都以数据形式维护，可从 JSON 文件扩展。

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::key::KeyComponents;

/// 内置库的来源名
const BUILTIN_SOURCE: &str = "builtin";

/// 小素因子规则允许的最大筛选上界
pub const MAX_PRIME_BOUND: u32 = 1 << 20;

/// 黑名单条目
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    /// `SHA256:<base64>`
    pub fingerprint: String,
    /// 说明（来源、用途）
    #[serde(default)]
    pub note: String,
}

/// 熵特征规则
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntropyRule {
    /// RSA 模数含有小素因子
    SmallPrimeFactor { name: String, bound: u32 },
    /// ROCA (CVE-2017-15361)：模数对一组小素数的余数都落在 65537 生成的子群内
    RocaFingerprint { name: String },
    /// 模数或公钥点中出现过长的单字节重复
    RepeatedBytes { name: String, max_run: usize },
    /// RSA 公钥指数为 1 或偶数
    WeakPublicExponent { name: String },
}

impl EntropyRule {
    pub fn name(&self) -> &str {
        match self {
            Self::SmallPrimeFactor { name, .. }
            | Self::RocaFingerprint { name }
            | Self::RepeatedBytes { name, .. }
            | Self::WeakPublicExponent { name } => name,
        }
    }

    /// 检查公钥分量是否命中规则
    pub fn matches(&self, components: &KeyComponents<'_>) -> bool {
        self.matches_with(components, None)
    }

    /// `primes` 为预先筛好的素数表，None 时临时计算
    fn matches_with(&self, components: &KeyComponents<'_>, primes: Option<&[u64]>) -> bool {
        match self {
            Self::SmallPrimeFactor { bound, .. } => components.modulus.is_some_and(|n| match primes {
                Some(primes) => has_small_factor(n, primes),
                None => has_small_factor(n, &primes_below(*bound)),
            }),
            Self::RocaFingerprint { .. } => components.modulus.is_some_and(roca_fingerprint),
            Self::RepeatedBytes { max_run, .. } => [components.modulus, components.point]
                .into_iter()
                .flatten()
                .any(|bytes| longest_run(bytes) > *max_run),
            Self::WeakPublicExponent { .. } => components.exponent.is_some_and(|e| {
                let odd = e.last().is_some_and(|b| b & 1 == 1);
                let is_one = e == [1];
                !odd || is_one
            }),
        }
    }
}

/// 数据库的 JSON 表示
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WeakKeyDatabaseFile {
    #[serde(default)]
    pub blacklist: Vec<BlacklistEntry>,
    #[serde(default)]
    pub entropy_rules: Vec<EntropyRule>,
}

impl WeakKeyDatabaseFile {
    /// 检查规则参数
    pub fn validate(&self, source: &str) -> Result<()> {
        for rule in &self.entropy_rules {
            if let EntropyRule::SmallPrimeFactor { name, bound } = rule {
                if *bound > MAX_PRIME_BOUND {
                    return Err(Error::Config(format!(
                        "rule '{}' in '{}' has bound {} above {}",
                        name, source, bound, MAX_PRIME_BOUND
                    )));
                }
            }
        }
        Ok(())
    }
}

/// 弱密钥数据库（加载后只读）
#[derive(Clone, Debug, Default)]
pub struct WeakKeyDatabase {
    /// 指纹 -> 来源
    blacklist: HashMap<String, String>,
    rules: Vec<EntropyRule>,
    /// 上界 -> 素数表，加载时筛好
    primes: HashMap<u32, Arc<[u64]>>,
}

impl WeakKeyDatabase {
    /// 空数据库
    pub fn empty() -> Self {
        Self::default()
    }

    /// 内置数据库
    pub fn builtin() -> Self {
        let mut db = Self::empty();
        db.merge(builtin_file(), BUILTIN_SOURCE);
        db
    }

    /// 从 JSON 文本加载
    pub fn from_json(json: &str, source: &str) -> Result<Self> {
        let file: WeakKeyDatabaseFile = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid weak key database '{}': {}", source, e)))?;
        file.validate(source)?;
        let mut db = Self::empty();
        db.merge(file, source);
        Ok(db)
    }

    /// 从 JSON 文件加载
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json, &path.display().to_string())
    }

    /// 合并另一份数据（同名规则以后者为准）
    pub fn merge(&mut self, file: WeakKeyDatabaseFile, source: &str) {
        for entry in file.blacklist {
            self.blacklist
                .insert(entry.fingerprint.trim().to_string(), source.to_string());
        }
        for rule in file.entropy_rules {
            self.rules.retain(|r| r.name() != rule.name());
            self.rules.push(rule);
        }
        self.refresh_primes();
    }

    /// 合并另一个数据库
    pub fn extend(&mut self, other: WeakKeyDatabase) {
        self.blacklist.extend(other.blacklist);
        for rule in other.rules {
            self.rules.retain(|r| r.name() != rule.name());
            self.rules.push(rule);
        }
        self.refresh_primes();
    }

    /// 为当前的小素因子规则准备素数表
    fn refresh_primes(&mut self) {
        let bounds: HashSet<u32> = self
            .rules
            .iter()
            .filter_map(|rule| match rule {
                EntropyRule::SmallPrimeFactor { bound, .. } => Some(*bound),
                _ => None,
            })
            .collect();
        self.primes.retain(|bound, _| bounds.contains(bound));
        for bound in bounds {
            self.primes
                .entry(bound)
                .or_insert_with(|| primes_below(bound).into());
        }
    }

    /// 查询黑名单，返回来源
    pub fn blacklist_source(&self, fingerprint: &str) -> Option<&str> {
        self.blacklist.get(fingerprint).map(String::as_str)
    }

    /// 返回命中的规则名
    pub fn matching_rules(&self, components: &KeyComponents<'_>) -> Vec<String> {
        self.rules
            .iter()
            .filter(|rule| {
                let primes = match rule {
                    EntropyRule::SmallPrimeFactor { bound, .. } => {
                        self.primes.get(bound).map(|p| &p[..])
                    }
                    _ => None,
                };
                rule.matches_with(components, primes)
            })
            .map(|rule| rule.name().to_string())
            .collect()
    }

    pub fn blacklist_len(&self) -> usize {
        self.blacklist.len()
    }

    pub fn rules(&self) -> &[EntropyRule] {
        &self.rules
    }
}

fn builtin_file() -> WeakKeyDatabaseFile {
    WeakKeyDatabaseFile {
        blacklist: vec![BlacklistEntry {
            fingerprint: "SHA256:1M4RzhMyWuFS/86uPY/ce2prh/dVTHW7iD2RhpquOZA".to_string(),
            note: "Vagrant insecure RSA key (published private key)".to_string(),
        }],
        entropy_rules: vec![
            EntropyRule::SmallPrimeFactor {
                name: "small_prime_factor".to_string(),
                bound: 10_000,
            },
            EntropyRule::RocaFingerprint {
                name: "roca_fingerprint".to_string(),
            },
            EntropyRule::RepeatedBytes {
                name: "repeated_bytes".to_string(),
                max_run: 8,
            },
            EntropyRule::WeakPublicExponent {
                name: "weak_public_exponent".to_string(),
            },
        ],
    }
}

// ======================== 数值工具 ========================

/// 大端整数对小模数取余
fn mod_small(bytes: &[u8], modulus: u64) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, b| (acc * 256 + u64::from(*b)) % modulus)
}

/// 小于 bound 的素数（bound 不超过 MAX_PRIME_BOUND）
fn primes_below(bound: u32) -> Vec<u64> {
    let bound = bound.min(MAX_PRIME_BOUND) as usize;
    if bound < 3 {
        return vec![];
    }
    let mut sieve = vec![true; bound];
    sieve[0] = false;
    sieve[1] = false;
    let mut i = 2;
    while i * i < bound {
        if sieve[i] {
            let mut j = i * i;
            while j < bound {
                sieve[j] = false;
                j += i;
            }
        }
        i += 1;
    }
    sieve
        .iter()
        .enumerate()
        .filter(|(_, is_prime)| **is_prime)
        .map(|(p, _)| p as u64)
        .collect()
}

fn has_small_factor(modulus: &[u8], primes: &[u64]) -> bool {
    // 过短的数值不参与判断
    if modulus.len() < 8 {
        return false;
    }
    primes.iter().any(|&p| mod_small(modulus, p) == 0)
}

/// ROCA 检测使用的素数
const ROCA_PRIMES: [u64; 38] = [
    3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
    101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151, 157, 163, 167,
];

/// 65537 在模 p 乘法群中生成的子群
fn generated_subgroup(p: u64) -> HashSet<u64> {
    let generator = 65537 % p;
    let mut members = HashSet::new();
    let mut value = 1 % p;
    while members.insert(value) {
        value = value * generator % p;
    }
    members
}

fn roca_fingerprint(modulus: &[u8]) -> bool {
    if modulus.is_empty() {
        return false;
    }
    ROCA_PRIMES
        .iter()
        .all(|&p| generated_subgroup(p).contains(&mod_small(modulus, p)))
}

fn longest_run(bytes: &[u8]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous = None;
    for b in bytes {
        if Some(b) == previous {
            current += 1;
        } else {
            current = 1;
            previous = Some(b);
        }
        longest = longest.max(current);
    }
    longest
}
