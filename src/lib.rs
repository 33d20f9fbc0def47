// KeyProbe - SSH 密钥安全评估与 Git 托管平台访问探测
//
// 处理流程: KeyMaterial → KeyAnalyzer → ServerValidator → RepositoryDiscoverer
// 核心只返回结构化结果和错误，不打印；日志通过 tracing 发出，由调用方决定是否安装 subscriber。

pub mod constants;
pub mod error;
pub mod models;
pub mod services;
pub mod ssh;

pub use error::{Error, Result};
pub use models::{
    CandidateOutcome, CandidateStatus, DiscoveryEvent, DiscoveryResult, HostProfile,
    KeyAssessment, KeyMaterial, KeyStrength, ProbeAttempt, ValidationOutcome, ValidationResult,
    WeaknessFlag,
};
pub use services::{
    Candidate, DiscoveryHandle, DiscoveryOptions, HostRegistry, KeyAnalyzer,
    RepositoryDiscoverer, RepositoryProbe, ServerValidator, WeakKeyDatabase,
};
pub use ssh::{HostKeyStore, ProbeConfig, ProbeStage, SshRepositoryProbe};
