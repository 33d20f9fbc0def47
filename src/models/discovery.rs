// 仓库发现结果

use serde::Serialize;

/// 单次仓库探测的结论（重试之前）
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeAttempt {
    /// 收到引用通告，仓库可访问
    Accessible,
    /// 服务器明确表示不存在或无权限，不重试
    NotFound(String),
    /// 临时性失败，可重试
    Transient(String),
    /// 密钥被拒或主机公钥不一致，不重试
    Fatal(String),
}

/// 候选结果状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Accessible,
    NotFound,
    /// 候选名不合法，未发起探测
    Malformed,
    /// 重试耗尽或致命错误
    Failed,
}

/// 单个候选的结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CandidateOutcome {
    /// 候选名（加命名空间之后）
    pub name: String,
    /// 实际探测目标
    pub target: Option<String>,
    pub reachable: bool,
    pub status: CandidateStatus,
    pub error: Option<String>,
    /// 探测次数（含重试），未探测为 0
    pub attempts: u32,
}

impl CandidateOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self.status, CandidateStatus::Malformed | CandidateStatus::Failed)
    }
}

/// 一次仓库发现的结果
/// `outcomes` 按完成顺序排列，不是输入顺序
#[derive(Clone, Debug, Serialize)]
pub struct DiscoveryResult {
    pub run_id: String,
    pub host_id: String,
    pub outcomes: Vec<CandidateOutcome>,
    pub attempted: usize,
    pub accessible: usize,
    pub errored: usize,
    /// 消耗的重试次数
    pub retries: u32,
    /// 因取消或整体超时而提前结束
    pub truncated: bool,
    /// 事件通道已满而丢弃的事件数
    pub dropped_events: u64,
    pub started_at: String,
    pub finished_at: Option<String>,
}

impl DiscoveryResult {
    pub fn new(run_id: String, host_id: String) -> Self {
        Self {
            run_id,
            host_id,
            outcomes: Vec::new(),
            attempted: 0,
            accessible: 0,
            errored: 0,
            retries: 0,
            truncated: false,
            dropped_events: 0,
            started_at: chrono::Local::now().to_rfc3339(),
            finished_at: None,
        }
    }

    /// 追加一个完成的候选结果并更新计数
    pub fn record(&mut self, outcome: CandidateOutcome) {
        self.attempted += 1;
        if outcome.reachable {
            self.accessible += 1;
        }
        if outcome.is_error() {
            self.errored += 1;
        }
        self.retries += outcome.attempts.saturating_sub(1);
        self.outcomes.push(outcome);
    }

    /// 冻结结果
    pub fn finish(&mut self, truncated: bool) {
        self.truncated = truncated;
        self.finished_at = Some(chrono::Local::now().to_rfc3339());
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// 可访问的仓库名
    pub fn accessible_repositories(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.reachable)
            .map(|o| o.name.as_str())
            .collect()
    }
}

/// 发现过程中的流式事件
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiscoveryEvent {
    /// 一个候选完成
    Outcome(CandidateOutcome),
    /// 临时失败，即将重试
    Retrying {
        name: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    /// 运行结束
    Finished {
        attempted: usize,
        accessible: usize,
        truncated: bool,
    },
}
