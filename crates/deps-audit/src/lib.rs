#![doc = include_str!("../README.md")]

pub mod advisory;
pub mod analyzer;
pub mod confusion;
pub mod context;
pub mod error;
pub mod lockfile;
pub mod types;
pub mod version;

// --- 주요 타입 re-export ---

pub use advisory::{
    Advisory, AdvisoryClient, BoxFuture, DefaultAdvisories, DepsDevClient, DynAdvisoryClient,
    GemAdvisoryDb, GemAdvisoryEntry,
};
pub use analyzer::{AnalysisOutcome, DependencyAnalyzer};
pub use confusion::{DynRegistryProbe, HttpRegistryProbe, ProbeStatus, RegistryProbe};
pub use context::ScanContext;
pub use error::DepsAuditError;
pub use lockfile::{LockfileParser, default_parsers, is_known_dependency_file};
pub use types::Dependency;
