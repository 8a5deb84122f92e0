//! Run configuration for a relay invocation.
//!
//! The binary fills a [`RelayConfig`] from command line flags and their
//! `BUILDRELAY_*` environment variables, then calls
//! [`RelayConfig::validate`] before any remote call is made.

use crate::error::{Error, Result};
use crate::merge::DedupPolicy;
use crate::types::{PackagingMode, S3Location};
use std::path::PathBuf;
use std::time::Duration;

/// Default directory artifacts are downloaded into.
pub const DEFAULT_ARTIFACT_DIR: &str = ".codebuild_artifacts";

/// Default delay between completion polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Identifiers used to name archived build records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArchiveNaming {
    /// CI platform name, e.g. `github`
    pub platform: String,
    /// Commit the build was started for
    pub commit: String,
}

/// Where to archive the terminal build record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTarget {
    /// Bucket and key prefix
    pub destination: S3Location,
    /// Name components
    pub naming: ArchiveNaming,
}

impl ArchiveTarget {
    /// Deterministic destination for a project's record:
    /// `<prefix>/<platform>-<project>-<commit>.json`.
    #[must_use]
    pub fn location_for(&self, project: &str) -> S3Location {
        let file = format!(
            "{}-{}-{}.json",
            sanitize(&self.naming.platform),
            sanitize(project),
            sanitize(&self.naming.commit)
        );
        let prefix = self.destination.key.trim_end_matches('/');
        let key = if prefix.is_empty() {
            file
        } else {
            format!("{prefix}/{file}")
        };
        S3Location::new(self.destination.bucket.clone(), key)
    }
}

fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// Everything a relay run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Project to build; `None` uses the service default
    pub project_name: Option<String>,
    /// Bucket the source archive is uploaded to
    pub source_bucket: Option<String>,
    /// Object key of the source archive
    pub source_key: Option<String>,
    /// Whether to wait for the build to finish
    pub wait: bool,
    /// Delay between completion polls
    pub poll_interval: Duration,
    /// Ask the service to stop the build when polling is interrupted
    pub stop_on_cancel: bool,
    /// Optional build record archival
    pub archive: Option<ArchiveTarget>,
    /// Artifact layout
    pub packaging: PackagingMode,
    /// Artifact download directory
    pub artifact_dir: PathBuf,
    /// Override dedup policy
    pub dedup: DedupPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            project_name: None,
            source_bucket: None,
            source_key: None,
            wait: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_on_cancel: false,
            archive: None,
            packaging: PackagingMode::Zip,
            artifact_dir: PathBuf::from(DEFAULT_ARTIFACT_DIR),
            dedup: DedupPolicy::Exact,
        }
    }
}

impl RelayConfig {
    /// Check required settings, reporting all missing items at once.
    ///
    /// # Errors
    /// Returns [`Error::Precondition`] naming every missing setting.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.source_bucket.as_deref().is_none_or(str::is_empty) {
            missing.push("source bucket (--bucket / BUILDRELAY_BUCKET)");
        }
        if self.source_key.as_deref().is_none_or(str::is_empty) {
            missing.push("source key (--key / BUILDRELAY_KEY)");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::precondition(missing))
        }
    }

    /// Upload destination of the source archive.
    ///
    /// # Errors
    /// Returns [`Error::Precondition`] when bucket or key is missing.
    pub fn source_location(&self) -> Result<S3Location> {
        self.validate()?;
        Ok(S3Location::new(
            self.source_bucket.clone().unwrap_or_default(),
            self.source_key.clone().unwrap_or_default(),
        ))
    }
}
