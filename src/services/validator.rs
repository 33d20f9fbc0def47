// 服务器验证服务
// 只做认证：服务器一旦接受密钥立即断开，不执行任何命令

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::host::HostProfile;
use crate::models::key::KeyMaterial;
use crate::models::validation::{ValidationOutcome, ValidationResult};
use crate::ssh::{
    AuthOutcome, HostKeyCheck, HostKeyStore, ProbeClient, ProbeConfig, ProbeEvent, ProbeStage,
    StageTrail,
};

use super::key_analyzer::KeyAnalyzer;

/// 服务器验证器
pub struct ServerValidator {
    analyzer: KeyAnalyzer,
    store: Arc<HostKeyStore>,
    config: ProbeConfig,
}

impl ServerValidator {
    pub fn new(analyzer: KeyAnalyzer, store: Arc<HostKeyStore>, config: ProbeConfig) -> Self {
        Self {
            analyzer,
            store,
            config,
        }
    }

    /// 共享的主机公钥存储
    pub fn store(&self) -> &Arc<HostKeyStore> {
        &self.store
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// 对一个 HostProfile 做一次认证探测
    ///
    /// 网络层的失败都体现在 `ValidationResult::outcome` 中；
    /// 只有没有私钥时返回 `Error::PrivateKeyRequired`。
    pub async fn validate(
        &self,
        key: &KeyMaterial,
        profile: &Arc<HostProfile>,
        timeout: Duration,
    ) -> Result<ValidationResult> {
        let private_key = key.private_key().cloned().ok_or(Error::PrivateKeyRequired)?;
        let assessment = self.analyzer.assess(key);

        info!(
            "[Validator] probing {} as {} with {}",
            profile.endpoint(),
            profile.username,
            assessment.fingerprint
        );

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let client = ProbeClient::new(
            profile.clone(),
            self.store.clone(),
            self.config.clone(),
            event_tx,
        );

        let started = Instant::now();
        let attempt = tokio::time::timeout(timeout, client.connect(private_key)).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (outcome, error_detail) = match attempt {
            Err(_) => (
                ValidationOutcome::Timeout,
                Some(format!("no verdict within {}ms", timeout.as_millis())),
            ),
            Ok(Ok(AuthOutcome::Accepted(session))) => {
                session.close().await;
                (ValidationOutcome::Accepted, None)
            }
            Ok(Ok(AuthOutcome::Rejected { remaining_methods })) => (
                ValidationOutcome::Rejected,
                Some(format!("server suggests {}", remaining_methods)),
            ),
            // 包括主机公钥不一致
            Ok(Err(e)) => (ValidationOutcome::Unreachable, Some(e.to_string())),
        };

        // 汇总阶段和主机公钥事件
        let mut trail = StageTrail::new();
        let mut host_key_fingerprint = None;
        let mut host_key_mismatch = false;
        while let Ok(event) = event_rx.try_recv() {
            match event {
                ProbeEvent::StageChanged(stage) => {
                    trail.advance(stage);
                }
                ProbeEvent::HostKey { fingerprint, check } => {
                    host_key_mismatch |= matches!(check, HostKeyCheck::Mismatch { .. });
                    host_key_fingerprint = Some(fingerprint);
                }
            }
        }
        // 主机公钥不一致时绝不报告 Accepted
        let outcome = if host_key_mismatch {
            ValidationOutcome::Unreachable
        } else {
            outcome
        };
        trail.advance(terminal_stage(outcome));

        debug!(
            "[Validator] {} -> {:?} in {}ms (stages: {:?})",
            profile.id,
            outcome,
            latency_ms,
            trail.stages()
        );

        Ok(ValidationResult {
            host_id: profile.id.clone(),
            endpoint: profile.endpoint(),
            username: profile.username.clone(),
            key: assessment,
            outcome,
            latency_ms,
            stages: trail.stages().to_vec(),
            host_key_mismatch,
            host_key_fingerprint,
            error_detail,
            checked_at: chrono::Local::now().to_rfc3339(),
        })
    }
}

fn terminal_stage(outcome: ValidationOutcome) -> ProbeStage {
    match outcome {
        ValidationOutcome::Accepted => ProbeStage::Accepted,
        ValidationOutcome::Rejected => ProbeStage::Rejected,
        ValidationOutcome::Unreachable => ProbeStage::Unreachable,
        ValidationOutcome::Timeout => ProbeStage::Timeout,
    }
}
