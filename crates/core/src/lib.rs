//! Core of buildrelay
//!
//! This crate holds everything that does not talk to a real remote service:
//! - the data model ([`types`]) and errors ([`error`])
//! - collaborator traits implemented by remote backends ([`service`])
//! - environment selection ([`environment`]) and request assembly ([`merge`])
//! - the build lifecycle from upload to resolved outcome ([`lifecycle`])

pub mod config;
pub mod environment;
pub mod error;
pub mod lifecycle;
pub mod merge;
pub mod reporter;
pub mod service;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types for convenience
pub use config::{ArchiveNaming, ArchiveTarget, RelayConfig};
pub use environment::EnvironmentCollector;
pub use error::{Error, Result, Warning, WarningKind};
pub use lifecycle::{BuildOutcome, Collaborators, Relay, RunInput, RunOutcome};
pub use merge::{DedupPolicy, RequestMerger};
pub use reporter::{Reporter, WaitingReason};
pub use service::{ArtifactFetcher, BuildService, LogSource, ResultArchive, SourceStore};
pub use types::{
    BuildHandle, BuildRequest, BuildResult, BuildStatus, EnvOverride, LogDescriptor, LogPage,
    PackagingMode, S3Location,
};
