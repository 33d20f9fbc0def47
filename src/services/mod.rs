// 服务模块

pub mod candidates;
pub mod discovery;
pub mod host_registry;
pub mod key_analyzer;
pub mod storage;
pub mod validator;
pub mod weak_keys;

pub use candidates::{wordlist, Candidate, CandidateError};
pub use discovery::{DiscoveryHandle, DiscoveryOptions, RepositoryDiscoverer, RepositoryProbe};
pub use host_registry::HostRegistry;
pub use key_analyzer::{KeyAnalyzer, StrengthPolicy};
pub use validator::ServerValidator;
pub use weak_keys::{EntropyRule, WeakKeyDatabase};
