// 数据模型模块

pub mod assessment;
pub mod discovery;
pub mod host;
pub mod key;
pub mod settings;
pub mod validation;

pub use assessment::{KeyAssessment, KeyStrength, WeaknessFlag};
pub use discovery::{
    CandidateOutcome, CandidateStatus, DiscoveryEvent, DiscoveryResult, ProbeAttempt,
};
pub use host::{HostKeyPolicy, HostProfile};
pub use key::{KeyAlgorithm, KeyFormat, KeyMaterial};
pub use settings::AppSettings;
pub use validation::{ValidationOutcome, ValidationResult};
