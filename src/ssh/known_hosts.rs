// 主机公钥存储
// 进程内的显式键控存储，以 HostProfile id 为键；只有调用方显式要求时才落盘

use std::collections::HashMap;
use std::sync::Mutex;

use russh::keys::ssh_key::HashAlg;
use russh::keys::PublicKey;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::host::{HostKeyPolicy, HostProfile};

/// 已知主机条目
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownHost {
    /// HostProfile id
    pub host_id: String,
    /// 记录时的端点（host:port）
    pub endpoint: String,
    /// 密钥类型（ssh-ed25519, ssh-rsa 等）
    pub key_type: String,
    /// SHA256 指纹
    pub fingerprint: String,
    /// 首次连接时间
    pub first_seen: String,
}

/// Known Hosts 文件内容
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KnownHostsFile {
    pub hosts: Vec<KnownHost>,
}

/// 主机公钥校验结论
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum HostKeyCheck {
    /// 首次见到，已记录
    FirstSeen,
    /// 与记录或固定列表一致
    Match,
    /// 不一致
    Mismatch { expected: Vec<String> },
}

impl HostKeyCheck {
    pub fn is_trusted(&self) -> bool {
        !matches!(self, Self::Mismatch { .. })
    }
}

/// 主机公钥存储
#[derive(Debug, Default)]
pub struct HostKeyStore {
    entries: Mutex<HashMap<String, KnownHost>>,
}

impl HostKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从持久化内容恢复
    pub fn from_file(file: KnownHostsFile) -> Self {
        let entries = file
            .hosts
            .into_iter()
            .map(|h| (h.host_id.clone(), h))
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// 导出当前记录（按 host_id 排序）
    pub fn to_file(&self) -> KnownHostsFile {
        let mut hosts: Vec<KnownHost> = self.lock().values().cloned().collect();
        hosts.sort_by(|a, b| a.host_id.cmp(&b.host_id));
        KnownHostsFile { hosts }
    }

    /// 校验服务器公钥，首次见到时记录
    pub fn check(&self, profile: &HostProfile, key: &PublicKey) -> HostKeyCheck {
        let fingerprint = key.fingerprint(HashAlg::Sha256).to_string();

        if let HostKeyPolicy::Pinned { fingerprints } = &profile.host_key_policy {
            return if fingerprints.iter().any(|f| f == &fingerprint) {
                HostKeyCheck::Match
            } else {
                warn!(
                    "[Probe] {} presented unpinned host key {}",
                    profile.id, fingerprint
                );
                HostKeyCheck::Mismatch {
                    expected: fingerprints.clone(),
                }
            };
        }

        let mut entries = self.lock();
        match entries.get(&profile.id) {
            Some(known) if known.fingerprint == fingerprint => HostKeyCheck::Match,
            Some(known) => {
                warn!(
                    "[Probe] {} host key changed: recorded {}, presented {}",
                    profile.id, known.fingerprint, fingerprint
                );
                HostKeyCheck::Mismatch {
                    expected: vec![known.fingerprint.clone()],
                }
            }
            None => {
                debug!("[Probe] recording host key {} for {}", fingerprint, profile.id);
                entries.insert(
                    profile.id.clone(),
                    KnownHost {
                        host_id: profile.id.clone(),
                        endpoint: profile.endpoint(),
                        key_type: key.algorithm().to_string(),
                        fingerprint,
                        first_seen: chrono::Local::now().to_rfc3339(),
                    },
                );
                HostKeyCheck::FirstSeen
            }
        }
    }

    pub fn get(&self, host_id: &str) -> Option<KnownHost> {
        self.lock().get(host_id).cloned()
    }

    /// 删除记录，返回是否存在
    pub fn forget(&self, host_id: &str) -> bool {
        self.lock().remove(host_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, KnownHost>> {
        // 持锁期间不会 panic，中毒时沿用内部数据
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST_A: &str = include_str!("../../tests/fixtures/host_a.pub");
    const HOST_B: &str = include_str!("../../tests/fixtures/host_b.pub");

    fn profile(id: &str) -> HostProfile {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "display_name": id,
            "host": "127.0.0.1",
            "port": 2222
        }))
        .unwrap()
    }

    fn key(text: &str) -> PublicKey {
        PublicKey::from_openssh(text.trim()).unwrap()
    }

    #[test]
    fn test_trust_on_first_use() {
        let store = HostKeyStore::new();
        let p = profile("forge");
        assert_eq!(store.check(&p, &key(HOST_A)), HostKeyCheck::FirstSeen);
        assert_eq!(store.check(&p, &key(HOST_A)), HostKeyCheck::Match);
        assert!(matches!(
            store.check(&p, &key(HOST_B)),
            HostKeyCheck::Mismatch { .. }
        ));
        // 不一致时不覆盖记录
        assert_eq!(store.check(&p, &key(HOST_A)), HostKeyCheck::Match);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_pins_are_per_profile() {
        let store = HostKeyStore::new();
        store.check(&profile("one"), &key(HOST_A));
        assert_eq!(
            store.check(&profile("two"), &key(HOST_B)),
            HostKeyCheck::FirstSeen
        );
        assert!(store.forget("one"));
        assert_eq!(
            store.check(&profile("one"), &key(HOST_B)),
            HostKeyCheck::FirstSeen
        );
    }

    #[test]
    fn test_pinned_policy() {
        let store = HostKeyStore::new();
        let mut p = profile("pinned");
        p.host_key_policy = HostKeyPolicy::Pinned {
            fingerprints: vec!["SHA256:nz/dINYCFtoRfaZCL5uZykI1m3nXbeCjeYfZHZuHDbo".to_string()],
        };
        assert_eq!(store.check(&p, &key(HOST_A)), HostKeyCheck::Match);
        assert!(!store.check(&p, &key(HOST_B)).is_trusted());
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_round_trip() {
        let store = HostKeyStore::new();
        store.check(&profile("forge"), &key(HOST_A));
        let restored = HostKeyStore::from_file(store.to_file());
        assert_eq!(
            restored.check(&profile("forge"), &key(HOST_A)),
            HostKeyCheck::Match
        );
        assert_eq!(
            restored.get("forge").map(|h| h.key_type),
            Some("ssh-ed25519".to_string())
        );
    }
}
