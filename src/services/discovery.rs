// 仓库发现服务
//
// 固定大小的工作池从有界队列中取候选名，每个候选一次探测：
// - 生产者在阻塞线程上惰性读取候选来源，队列容量为 2 × 并发数
// - 临时失败按指数退避重试，明确的不存在直接记录
// - 取消后不再分发候选，正在进行的探测被中止且不记录
// - 事件通道有界，调用方读得太慢时丢弃事件并计数，结果本身不受影响

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::discovery::{
    CandidateOutcome, CandidateStatus, DiscoveryEvent, DiscoveryResult, ProbeAttempt,
};
use crate::models::host::HostProfile;
use crate::models::validation::ValidationResult;

use super::candidates::Candidate;

/// 单个仓库的可达性探测
#[async_trait]
pub trait RepositoryProbe: Send + Sync {
    /// 认证所用公钥的 SHA-256 指纹，必须与验证结果中的密钥一致
    fn key_fingerprint(&self) -> &str;

    /// 探测一个目标（已按 HostProfile 模板展开）
    async fn probe(&self, target: &str) -> ProbeAttempt;
}

// ======================== 参数 ========================

/// 仓库发现参数
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// 同时进行的探测数上限
    pub concurrency: usize,
    /// 临时失败的最大重试次数
    pub max_retries: u32,
    /// 退避基数，第 n 次重试前等待 base × 2^n
    pub backoff_base: Duration,
    /// 每个 worker 两次探测之间的最小间隔
    pub probe_delay: Duration,
    /// 单次探测超时
    pub probe_timeout: Duration,
    /// 整体超时
    pub run_timeout: Option<Duration>,
    /// 不含 `/` 的候选名加上此前缀
    pub namespace: Option<String>,
    /// 事件通道容量
    pub event_buffer: usize,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
            probe_delay: Duration::ZERO,
            probe_timeout: Duration::from_secs(15),
            run_timeout: None,
            namespace: None,
            event_buffer: 1024,
        }
    }
}

impl DiscoveryOptions {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::InvalidOptions(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(Error::InvalidOptions(
                "event buffer must hold at least one event".to_string(),
            ));
        }
        if self.probe_timeout.is_zero() {
            return Err(Error::InvalidOptions(
                "probe timeout must be greater than zero".to_string(),
            ));
        }
        if let Some(ns) = &self.namespace {
            super::candidates::validate_name(ns.trim_matches('/'))
                .map_err(|e| Error::InvalidOptions(format!("namespace: {}", e)))?;
        }
        Ok(())
    }

    /// 第 `retry` 次重试（从 0 开始）前的等待时间
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor)
    }
}

// ======================== 运行句柄 ========================

/// 正在进行的发现任务
///
/// 事件最多缓存 `event_buffer` 条，超出的被丢弃并计入 `DiscoveryResult::dropped_events`。
/// 不需要事件时直接丢弃接收端。
pub struct DiscoveryHandle {
    run_id: String,
    events: Option<mpsc::Receiver<DiscoveryEvent>>,
    cancel: CancellationToken,
    result: Arc<Mutex<DiscoveryResult>>,
    supervisor: JoinHandle<DiscoveryResult>,
}

impl DiscoveryHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// 取走事件接收端（只能取一次）
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<DiscoveryEvent>> {
        self.events.take()
    }

    /// 请求取消：不再分发候选，正在进行的探测被中止
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 等待结束，返回冻结后的结果
    pub async fn join(self) -> DiscoveryResult {
        match self.supervisor.await {
            Ok(result) => result,
            Err(e) => {
                warn!("[Discovery] run {} supervisor failed: {}", self.run_id, e);
                let mut result = lock(&self.result);
                if !result.is_finished() {
                    result.finish(true);
                }
                result.clone()
            }
        }
    }
}

// ======================== 发现器 ========================

/// 仓库发现器
#[derive(Clone, Debug)]
pub struct RepositoryDiscoverer {
    options: DiscoveryOptions,
}

impl RepositoryDiscoverer {
    pub fn new(options: DiscoveryOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    /// 启动发现任务（需要在 tokio 运行时内调用）
    ///
    /// `validation` 必须是同一 HostProfile 上的 `Accepted` 结果，
    /// 且 `probe` 使用的正是被验证的密钥，否则返回 `Error::KeyNotValidated`。
    pub fn start<I>(
        &self,
        validation: &ValidationResult,
        profile: Arc<HostProfile>,
        probe: Arc<dyn RepositoryProbe>,
        candidates: I,
    ) -> Result<DiscoveryHandle>
    where
        I: IntoIterator + Send + 'static,
        I::IntoIter: Send + 'static,
        I::Item: Into<Candidate>,
    {
        if !validation.is_accepted() || validation.host_id != profile.id {
            return Err(Error::KeyNotValidated(profile.id.clone()));
        }
        if probe.key_fingerprint() != validation.key.fingerprint {
            warn!(
                "[Discovery] probe key {} differs from validated key {}",
                probe.key_fingerprint(),
                validation.key.fingerprint
            );
            return Err(Error::KeyNotValidated(profile.id.clone()));
        }

        let run_id = Uuid::new_v4().to_string();
        let result = Arc::new(Mutex::new(DiscoveryResult::new(
            run_id.clone(),
            profile.id.clone(),
        )));
        let cancel = CancellationToken::new();
        let (event_tx, event_rx) = mpsc::channel(self.options.event_buffer);
        let concurrency = self.options.concurrency;

        info!(
            "[Discovery] run {} on {} with {} workers",
            run_id,
            profile.endpoint(),
            concurrency
        );

        // 生产者：惰性读取候选来源
        let (candidate_tx, candidate_rx) = mpsc::channel::<Candidate>(concurrency * 2);
        let producer_cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            for item in candidates {
                if producer_cancel.is_cancelled() {
                    break;
                }
                if candidate_tx.blocking_send(item.into()).is_err() {
                    break;
                }
            }
        });

        // 整体超时
        if let Some(limit) = self.options.run_timeout {
            let timer_cancel = cancel.clone();
            let timer_run = run_id.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = timer_cancel.cancelled() => {}
                    _ = tokio::time::sleep(limit) => {
                        info!("[Discovery] run {} reached its {:?} limit", timer_run, limit);
                        timer_cancel.cancel();
                    }
                }
            });
        }

        let context = Arc::new(WorkerContext {
            profile,
            probe,
            options: self.options.clone(),
            result: result.clone(),
            events: event_tx,
            cancel: cancel.clone(),
        });
        let receiver = Arc::new(tokio::sync::Mutex::new(candidate_rx));
        let workers: Vec<JoinHandle<()>> = (0..concurrency)
            .map(|id| tokio::spawn(worker(id, context.clone(), receiver.clone())))
            .collect();

        let supervisor_run = run_id.clone();
        let supervisor = tokio::spawn(async move {
            for joined in join_all(workers).await {
                if let Err(e) = joined {
                    warn!("[Discovery] worker of run {} failed: {}", supervisor_run, e);
                }
            }
            let truncated = context.cancel.is_cancelled();
            // 释放计时器和生产者
            context.cancel.cancel();

            let frozen = {
                let mut result = lock(&context.result);
                result.finish(truncated);
                result.clone()
            };
            info!(
                "[Discovery] run {} finished: {} attempted, {} accessible, {} errored, truncated={}",
                supervisor_run, frozen.attempted, frozen.accessible, frozen.errored, truncated
            );
            let _ = context.events.try_send(DiscoveryEvent::Finished {
                attempted: frozen.attempted,
                accessible: frozen.accessible,
                truncated,
            });
            frozen
        });

        Ok(DiscoveryHandle {
            run_id,
            events: Some(event_rx),
            cancel,
            result,
            supervisor,
        })
    }

    /// 启动并等待结束
    pub async fn discover<I>(
        &self,
        validation: &ValidationResult,
        profile: Arc<HostProfile>,
        probe: Arc<dyn RepositoryProbe>,
        candidates: I,
    ) -> Result<DiscoveryResult>
    where
        I: IntoIterator + Send + 'static,
        I::IntoIter: Send + 'static,
        I::Item: Into<Candidate>,
    {
        let mut handle = self.start(validation, profile, probe, candidates)?;
        drop(handle.take_events());
        Ok(handle.join().await)
    }
}

// ======================== Worker ========================

struct WorkerContext {
    profile: Arc<HostProfile>,
    probe: Arc<dyn RepositoryProbe>,
    options: DiscoveryOptions,
    result: Arc<Mutex<DiscoveryResult>>,
    events: mpsc::Sender<DiscoveryEvent>,
    cancel: CancellationToken,
}

impl WorkerContext {
    /// 校验、探测、按需重试，返回最终结果
    async fn run_candidate(&self, candidate: Candidate) -> CandidateOutcome {
        let raw = candidate.raw().to_string();
        let name = match candidate.resolve(self.options.namespace.as_deref()) {
            Ok(name) => name,
            Err(e) => {
                debug!("[Discovery] skipping malformed candidate {:?}: {}", raw, e);
                return CandidateOutcome {
                    name: raw,
                    target: None,
                    reachable: false,
                    status: CandidateStatus::Malformed,
                    error: Some(e.to_string()),
                    attempts: 0,
                };
            }
        };

        let target = self.profile.probe_target(&name);
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let attempt =
                match tokio::time::timeout(self.options.probe_timeout, self.probe.probe(&target))
                    .await
                {
                    Ok(attempt) => attempt,
                    Err(_) => ProbeAttempt::Transient(format!(
                        "probe timed out after {}ms",
                        self.options.probe_timeout.as_millis()
                    )),
                };

            let (status, error) = match attempt {
                ProbeAttempt::Accessible => (CandidateStatus::Accessible, None),
                ProbeAttempt::NotFound(_) => (CandidateStatus::NotFound, None),
                ProbeAttempt::Fatal(detail) => {
                    // 密钥被拒或主机公钥变化，停止整个运行
                    warn!("[Discovery] fatal probe failure on {}: {}", target, detail);
                    self.cancel.cancel();
                    (CandidateStatus::Failed, Some(detail))
                }
                ProbeAttempt::Transient(detail) if attempts > self.options.max_retries => (
                    CandidateStatus::Failed,
                    Some(format!("gave up after {} attempts: {}", attempts, detail)),
                ),
                ProbeAttempt::Transient(detail) => {
                    let delay = self.options.backoff(attempts - 1);
                    debug!(
                        "[Discovery] {} transient failure ({}), retrying in {:?}",
                        target, detail, delay
                    );
                    let event = DiscoveryEvent::Retrying {
                        name: name.clone(),
                        attempt: attempts,
                        delay_ms: delay.as_millis() as u64,
                        error: detail,
                    };
                    if let Err(TrySendError::Full(_)) = self.events.try_send(event) {
                        lock(&self.result).dropped_events += 1;
                    }
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            return CandidateOutcome {
                name,
                target: Some(target),
                reachable: status == CandidateStatus::Accessible,
                status,
                error,
                attempts,
            };
        }
    }

    /// 追加结果并发出事件，持锁保证事件顺序与结果顺序一致
    fn record(&self, outcome: CandidateOutcome) {
        let mut result = lock(&self.result);
        result.record(outcome.clone());
        // 接收端已丢弃时不计数
        if let Err(TrySendError::Full(_)) = self.events.try_send(DiscoveryEvent::Outcome(outcome)) {
            result.dropped_events += 1;
        }
    }
}

async fn worker(
    id: usize,
    context: Arc<WorkerContext>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Candidate>>>,
) {
    let cancel = context.cancel.clone();
    loop {
        let candidate = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(candidate) => candidate,
                    None => break,
                },
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = context.run_candidate(candidate) => outcome,
        };
        context.record(outcome);

        let delay = context.options.probe_delay;
        if !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
    debug!("[Discovery] worker {} stopped", id);
}

fn lock(result: &Mutex<DiscoveryResult>) -> std::sync::MutexGuard<'_, DiscoveryResult> {
    result.lock().unwrap_or_else(|e| e.into_inner())
}
