// 仓库发现集成测试，使用脚本化的探测实现

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use keyprobe::{
    Candidate, CandidateStatus, DiscoveryEvent, DiscoveryOptions, Error, HostProfile,
    KeyAnalyzer, ProbeAttempt, RepositoryDiscoverer, RepositoryProbe, ValidationOutcome,
    ValidationResult,
};

const ED25519_PUB: &[u8] = include_bytes!("fixtures/ed25519.pub");
const ED25519_FINGERPRINT: &str = "SHA256:4urlDI9Oe8voWzCzySzx0oAkGi8u10BE4CLFwxuoQuE";
const STRANGER_FINGERPRINT: &str = "SHA256:GlzPqVFnsgMOpgAS4MHThYRb6rWjh6UgR6JCBqO0Uxg";

/// 按目标名决定结果：
/// - `ok-*` 可访问
/// - `flaky-*` 前两次临时失败，之后可访问
/// - `down-*` 始终临时失败
/// - `slow-*` 超过探测超时
/// - `fatal` 致命错误
/// - 其他不存在
#[derive(Default)]
struct ScriptedProbe {
    /// 默认使用 ed25519 夹具的指纹
    fingerprint: Option<&'static str>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    seen: Mutex<HashMap<String, usize>>,
}

impl ScriptedProbe {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.seen.lock().unwrap().keys().cloned().collect();
        targets.sort();
        targets
    }
}

#[async_trait]
impl RepositoryProbe for ScriptedProbe {
    fn key_fingerprint(&self) -> &str {
        self.fingerprint.unwrap_or(ED25519_FINGERPRINT)
    }

    async fn probe(&self, target: &str) -> ProbeAttempt {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let seen = {
            let mut seen = self.seen.lock().unwrap();
            let count = seen.entry(target.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if target.starts_with("slow-") {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if target.starts_with("ok-") {
            ProbeAttempt::Accessible
        } else if target.starts_with("flaky-") {
            if seen <= 2 {
                ProbeAttempt::Transient("connection reset".to_string())
            } else {
                ProbeAttempt::Accessible
            }
        } else if target.starts_with("down-") {
            ProbeAttempt::Transient("service unavailable".to_string())
        } else if target == "fatal.git" {
            ProbeAttempt::Fatal("public key rejected".to_string())
        } else {
            ProbeAttempt::NotFound("Repository not found".to_string())
        }
    }
}

fn profile() -> Arc<HostProfile> {
    Arc::new(
        serde_json::from_value(serde_json::json!({
            "id": "forge",
            "display_name": "Forge",
            "host": "git.example.com"
        }))
        .unwrap(),
    )
}

fn validation(host_id: &str, outcome: ValidationOutcome) -> ValidationResult {
    let key = KeyAnalyzer::default().analyze(ED25519_PUB, None).unwrap();
    ValidationResult {
        host_id: host_id.to_string(),
        endpoint: "git.example.com:22".to_string(),
        username: "git".to_string(),
        key,
        outcome,
        latency_ms: 12,
        stages: Vec::new(),
        host_key_mismatch: false,
        host_key_fingerprint: None,
        error_detail: None,
        checked_at: chrono::Local::now().to_rfc3339(),
    }
}

fn accepted() -> ValidationResult {
    validation("forge", ValidationOutcome::Accepted)
}

fn options(concurrency: usize) -> DiscoveryOptions {
    DiscoveryOptions {
        concurrency,
        backoff_base: Duration::from_millis(1),
        probe_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

fn names(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{}{}", prefix, i)).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_is_bounded() {
    let probe = Arc::new(ScriptedProbe::with_delay(Duration::from_millis(10)));
    let discoverer = RepositoryDiscoverer::new(options(3)).unwrap();

    let result = discoverer
        .discover(&accepted(), profile(), probe.clone(), names("repo-", 30))
        .await
        .unwrap();

    assert_eq!(result.attempted, 30);
    let peak = probe.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak in-flight {}", peak);
    assert!(peak >= 2, "peak in-flight {}", peak);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_all_not_found() {
    let probe = Arc::new(ScriptedProbe::default());
    let discoverer = RepositoryDiscoverer::new(options(4)).unwrap();

    let result = discoverer
        .discover(&accepted(), profile(), probe.clone(), names("missing-", 12))
        .await
        .unwrap();

    assert_eq!(result.attempted, 12);
    assert_eq!(result.accessible, 0);
    assert_eq!(result.errored, 0);
    assert_eq!(result.retries, 0);
    assert!(!result.truncated);
    assert!(result.is_finished());
    assert_eq!(result.host_id, "forge");
    assert!(result
        .outcomes
        .iter()
        .all(|o| o.status == CandidateStatus::NotFound && o.error.is_none() && o.attempts == 1));
    assert_eq!(probe.calls.load(Ordering::SeqCst), 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_retry_then_success_and_exhaustion() {
    let probe = Arc::new(ScriptedProbe::default());
    let discoverer = RepositoryDiscoverer::new(options(2)).unwrap();

    let mut handle = discoverer
        .start(
            &accepted(),
            profile(),
            probe.clone(),
            vec!["ok-app", "flaky-lib", "down-docs"],
        )
        .unwrap();
    let mut events = handle.take_events().unwrap();
    let result = handle.join().await;

    assert_eq!(result.attempted, 3);
    assert_eq!(result.accessible, 2);
    assert_eq!(result.errored, 1);
    // flaky 两次，down 两次
    assert_eq!(result.retries, 4);

    let by_name = |name: &str| {
        result
            .outcomes
            .iter()
            .find(|o| o.name == name)
            .cloned()
            .unwrap()
    };
    let flaky = by_name("flaky-lib");
    assert_eq!(flaky.status, CandidateStatus::Accessible);
    assert_eq!(flaky.attempts, 3);

    let down = by_name("down-docs");
    assert_eq!(down.status, CandidateStatus::Failed);
    assert_eq!(down.attempts, 3);
    assert!(down.error.unwrap().contains("service unavailable"));

    let mut retrying = 0;
    let mut outcomes = 0;
    let mut last = None;
    while let Some(event) = events.recv().await {
        match &event {
            DiscoveryEvent::Retrying { .. } => retrying += 1,
            DiscoveryEvent::Outcome(_) => outcomes += 1,
            DiscoveryEvent::Finished { .. } => {}
        }
        last = Some(event);
    }
    assert_eq!(retrying, 4);
    assert_eq!(outcomes, 3);
    assert!(matches!(
        last,
        Some(DiscoveryEvent::Finished {
            attempted: 3,
            accessible: 2,
            truncated: false
        })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_probe_timeout_counts_as_transient() {
    let probe = Arc::new(ScriptedProbe::default());
    let discoverer = RepositoryDiscoverer::new(DiscoveryOptions {
        max_retries: 0,
        probe_timeout: Duration::from_millis(50),
        ..options(1)
    })
    .unwrap();

    let result = discoverer
        .discover(&accepted(), profile(), probe, vec!["slow-mirror"])
        .await
        .unwrap();

    let outcome = &result.outcomes[0];
    assert_eq!(outcome.status, CandidateStatus::Failed);
    assert_eq!(outcome.attempts, 1);
    assert!(outcome.error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_malformed_candidates_are_not_probed() {
    let probe = Arc::new(ScriptedProbe::default());
    let discoverer = RepositoryDiscoverer::new(options(2)).unwrap();

    let candidates: Vec<Candidate> = vec![
        "ok-good".into(),
        "../etc/passwd".into(),
        "bad name".into(),
        "".into(),
        Candidate::from(Err::<String, _>(io::Error::other("broken pipe"))),
    ];
    let result = discoverer
        .discover(&accepted(), profile(), probe.clone(), candidates)
        .await
        .unwrap();

    assert_eq!(result.attempted, 5);
    assert_eq!(result.accessible, 1);
    assert_eq!(result.errored, 4);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 1);

    let malformed: Vec<_> = result
        .outcomes
        .iter()
        .filter(|o| o.status == CandidateStatus::Malformed)
        .collect();
    assert_eq!(malformed.len(), 4);
    assert!(malformed
        .iter()
        .all(|o| o.attempts == 0 && o.target.is_none() && o.error.is_some()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_namespace_prefix() {
    let probe = Arc::new(ScriptedProbe::default());
    let discoverer = RepositoryDiscoverer::new(DiscoveryOptions {
        namespace: Some("acme".to_string()),
        ..options(2)
    })
    .unwrap();

    let result = discoverer
        .discover(&accepted(), profile(), probe.clone(), vec!["api", "other/tool"])
        .await
        .unwrap();

    assert_eq!(result.attempted, 2);
    assert_eq!(
        probe.targets(),
        vec!["acme/api.git".to_string(), "other/tool.git".to_string()]
    );
    assert!(result.outcomes.iter().any(|o| o.name == "acme/api"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_truncates_run() {
    let probe = Arc::new(ScriptedProbe::with_delay(Duration::from_millis(10)));
    let discoverer = RepositoryDiscoverer::new(options(2)).unwrap();

    let endless = (0u64..).map(|i| format!("repo-{}", i));
    let handle = discoverer
        .start(&accepted(), profile(), probe.clone(), endless)
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle.join())
        .await
        .unwrap();

    assert!(result.truncated);
    assert!(result.is_finished());
    assert!(result.attempted > 0);
    assert_eq!(result.attempted, result.outcomes.len());
    // 被中止的探测不记录
    assert!(result.attempted <= probe.calls.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_timeout_stops_endless_source() {
    let probe = Arc::new(ScriptedProbe::with_delay(Duration::from_millis(5)));
    let discoverer = RepositoryDiscoverer::new(DiscoveryOptions {
        run_timeout: Some(Duration::from_millis(150)),
        ..options(4)
    })
    .unwrap();

    let endless = (0u64..).map(|i| format!("repo-{}", i));
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        discoverer.discover(&accepted(), profile(), probe, endless),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(result.truncated);
    assert!(result.attempted > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fatal_probe_stops_run() {
    let probe = Arc::new(ScriptedProbe::default());
    let discoverer = RepositoryDiscoverer::new(options(1)).unwrap();

    let mut candidates = vec!["first".to_string(), "fatal".to_string()];
    candidates.extend(names("after-", 20));
    let result = discoverer
        .discover(&accepted(), profile(), probe, candidates)
        .await
        .unwrap();

    assert!(result.truncated);
    assert_eq!(result.attempted, 2);
    let fatal = &result.outcomes[1];
    assert_eq!(fatal.name, "fatal");
    assert_eq!(fatal.status, CandidateStatus::Failed);
    assert_eq!(fatal.attempts, 1);
}

#[tokio::test]
async fn test_requires_accepted_validation() {
    let probe: Arc<dyn RepositoryProbe> = Arc::new(ScriptedProbe::default());
    let discoverer = RepositoryDiscoverer::new(options(2)).unwrap();

    let rejected = validation("forge", ValidationOutcome::Rejected);
    assert!(matches!(
        discoverer.start(&rejected, profile(), probe.clone(), vec!["ok-a"]),
        Err(Error::KeyNotValidated(_))
    ));

    let elsewhere = validation("other-forge", ValidationOutcome::Accepted);
    assert!(matches!(
        discoverer.start(&elsewhere, profile(), probe, vec!["ok-a"]),
        Err(Error::KeyNotValidated(_))
    ));
}

#[tokio::test]
async fn test_requires_the_validated_key() {
    let discoverer = RepositoryDiscoverer::new(options(2)).unwrap();
    let other_key = Arc::new(ScriptedProbe {
        fingerprint: Some(STRANGER_FINGERPRINT),
        ..Default::default()
    });

    assert!(matches!(
        discoverer.start(&accepted(), profile(), other_key.clone(), vec!["ok-a"]),
        Err(Error::KeyNotValidated(_))
    ));
    assert_eq!(other_key.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_reader_drops_events_not_outcomes() {
    let probe = Arc::new(ScriptedProbe::default());
    let discoverer = RepositoryDiscoverer::new(DiscoveryOptions {
        event_buffer: 4,
        ..options(1)
    })
    .unwrap();

    let mut handle = discoverer
        .start(&accepted(), profile(), probe, names("missing-", 20))
        .unwrap();
    // 持有接收端但在运行结束前不读取
    let mut events = handle.take_events().unwrap();
    let result = handle.join().await;

    assert_eq!(result.attempted, 20);
    assert_eq!(result.outcomes.len(), 20);
    assert_eq!(result.dropped_events, 16);

    let mut received = 0;
    while let Some(event) = events.recv().await {
        assert!(matches!(event, DiscoveryEvent::Outcome(_)));
        received += 1;
    }
    assert_eq!(received, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_ids_are_unique() {
    let probe = Arc::new(ScriptedProbe::default());
    let discoverer = RepositoryDiscoverer::new(options(1)).unwrap();

    let first = discoverer
        .discover(&accepted(), profile(), probe.clone(), vec!["ok-a"])
        .await
        .unwrap();
    let second = discoverer
        .discover(&accepted(), profile(), probe, vec!["ok-a"])
        .await
        .unwrap();
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.accessible_repositories(), vec!["ok-a"]);
}
