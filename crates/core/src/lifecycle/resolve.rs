//! Terminal record resolution: archival, artifacts and the final outcome.

use crate::config::ArchiveTarget;
use crate::error::{Error, Result, Warning, WarningKind};
use crate::reporter::Reporter;
use crate::service::{ArtifactFetcher, BuildService, ResultArchive};
use crate::types::{BuildHandle, BuildResult, BuildStatus, PackagingMode, S3Location};
use bytes::Bytes;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Resolved build plus everything that degraded along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    /// The terminal build record
    pub result: BuildResult,
    /// Where artifacts were downloaded, if they were
    pub artifacts: Option<PathBuf>,
    /// Non-fatal problems from archival and artifact download
    pub warnings: Vec<Warning>,
}

impl BuildOutcome {
    /// Terminal status of the build.
    #[must_use]
    pub fn status(&self) -> BuildStatus {
        self.result.status
    }

    /// `0` for a succeeded build, `1` otherwise. Warnings never count.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.status().is_success())
    }

    /// Convert a non-success outcome into [`Error::BuildFailed`].
    ///
    /// # Errors
    /// Returns [`Error::BuildFailed`] carrying the status name.
    pub fn into_result(self) -> Result<Self> {
        if self.status().is_success() {
            Ok(self)
        } else {
            Err(Error::BuildFailed {
                build_id: self.result.build_id,
                status: self.result.status.as_str().to_string(),
            })
        }
    }
}

/// Collaborators the resolver writes to. Both are optional: without an
/// archive target nothing is archived, without a fetcher nothing is
/// downloaded.
pub struct ResultResolver<'a> {
    builds: &'a dyn BuildService,
    archive: Option<(&'a dyn ResultArchive, &'a ArchiveTarget)>,
    fetcher: Option<&'a dyn ArtifactFetcher>,
    packaging: PackagingMode,
    artifact_dir: PathBuf,
}

impl std::fmt::Debug for ResultResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultResolver")
            .field("archive", &self.archive.map(|(_, target)| target))
            .field("packaging", &self.packaging)
            .field("artifact_dir", &self.artifact_dir)
            .finish_non_exhaustive()
    }
}

impl<'a> ResultResolver<'a> {
    /// Resolver that only reads the record.
    #[must_use]
    pub fn new(builds: &'a dyn BuildService) -> Self {
        Self {
            builds,
            archive: None,
            fetcher: None,
            packaging: PackagingMode::default(),
            artifact_dir: PathBuf::from(crate::config::DEFAULT_ARTIFACT_DIR),
        }
    }

    /// Archive the record to `target`.
    #[must_use]
    pub fn with_archive(mut self, store: &'a dyn ResultArchive, target: &'a ArchiveTarget) -> Self {
        self.archive = Some((store, target));
        self
    }

    /// Download artifacts with `fetcher`.
    #[must_use]
    pub fn with_artifacts(
        mut self,
        fetcher: &'a dyn ArtifactFetcher,
        packaging: PackagingMode,
        artifact_dir: impl Into<PathBuf>,
    ) -> Self {
        self.fetcher = Some(fetcher);
        self.packaging = packaging;
        self.artifact_dir = artifact_dir.into();
        self
    }

    /// Fetch the terminal record and run the best-effort steps.
    ///
    /// `project` names the archived record. A failed record fetch is fatal;
    /// archival and artifact problems become warnings.
    ///
    /// # Errors
    /// Propagates the failed record fetch.
    pub async fn resolve(
        &self,
        handle: &BuildHandle,
        project: &str,
        reporter: &dyn Reporter,
    ) -> Result<BuildOutcome> {
        let result = self.builds.get_build_record(handle).await?;
        debug!(build_id = %handle, status = %result.status, "Fetched terminal build record");

        let mut warnings = Vec::new();
        if let Some(warning) = self.archive(&result, project).await {
            reporter.warning(&warning);
            warnings.push(warning);
        }

        let artifacts = match self.artifacts(&result).await {
            Ok(Some(dest)) => {
                reporter.artifacts_fetched(&dest);
                Some(dest)
            }
            Ok(None) => None,
            Err(warning) => {
                reporter.warning(&warning);
                warnings.push(warning);
                None
            }
        };

        info!(build_id = %handle, status = %result.status, "Build resolved");
        reporter.finished(&result);
        Ok(BuildOutcome {
            result,
            artifacts,
            warnings,
        })
    }

    async fn archive(&self, result: &BuildResult, project: &str) -> Option<Warning> {
        let (store, target) = self.archive?;
        let destination = target.location_for(project);
        let contents = match serde_json::to_vec_pretty(result) {
            Ok(json) => Bytes::from(json),
            Err(e) => {
                return Some(Warning::new(
                    WarningKind::Archive,
                    format!("Could not serialize build record: {e}"),
                ));
            }
        };

        match store.archive_result(contents, &destination).await {
            Ok(()) => {
                info!(destination = %destination, "Archived build record");
                None
            }
            Err(e) => {
                warn!(destination = %destination, error = %e, "Build record archival failed");
                Some(Warning::new(
                    WarningKind::Archive,
                    format!("Could not archive build record to {destination}: {e}"),
                ))
            }
        }
    }

    async fn artifacts(&self, result: &BuildResult) -> std::result::Result<Option<PathBuf>, Warning> {
        let Some(fetcher) = self.fetcher else {
            return Ok(None);
        };
        let Some(raw) = result.artifact_location() else {
            debug!(build_id = %result.build_id, "Build produced no artifacts");
            return Ok(None);
        };
        let Some(location) = S3Location::parse(raw) else {
            return Err(Warning::new(
                WarningKind::Artifact,
                format!("Unrecognized artifact location '{raw}'"),
            ));
        };
        if let PackagingMode::Unsupported(mode) = &self.packaging {
            return Err(Warning::new(
                WarningKind::Artifact,
                format!("Unsupported artifact packaging '{mode}'; artifacts at {location} were not downloaded"),
            ));
        }

        fetcher
            .fetch_artifact(&location, &self.packaging, &self.artifact_dir)
            .await
            .map(Some)
            .map_err(|e| {
                warn!(location = %location, error = %e, "Artifact download failed");
                Warning::new(
                    WarningKind::Artifact,
                    format!("Could not download artifacts from {location}: {e}"),
                )
            })
    }
}
