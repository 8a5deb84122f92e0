//! The relay lifecycle: upload, merge, submit, tail, poll, resolve.
//!
//! Each stage lives in its own module and can be driven on its own;
//! [`Relay::run`] strings them together the way the binary uses them.

mod poll;
mod resolve;
mod submit;
mod tail;

pub use poll::CompletionPoller;
pub use resolve::{BuildOutcome, ResultResolver};
pub use submit::submit;
pub use tail::{LogCursor, LogTailer, TailCycle, TailState};

use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::merge::{RequestMerger, SourceIdentity};
use crate::reporter::Reporter;
use crate::service::{ArtifactFetcher, BuildService, LogSource, ResultArchive, SourceStore};
use crate::types::{BuildHandle, EnvOverride};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Remote services and the output sink a run talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    /// Build start, status and stop
    pub builds: &'a dyn BuildService,
    /// Log event pages
    pub logs: &'a dyn LogSource,
    /// Source archive upload
    pub sources: &'a dyn SourceStore,
    /// Build record archival
    pub archive: &'a dyn ResultArchive,
    /// Artifact download
    pub artifacts: &'a dyn ArtifactFetcher,
    /// User-facing output
    pub reporter: &'a dyn Reporter,
}

impl std::fmt::Debug for Collaborators<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Per-invocation inputs that do not come from configuration.
#[derive(Debug, Clone, Default)]
pub struct RunInput {
    /// Zipped working tree
    pub source_archive: Bytes,
    /// Collected and explicit environment overrides, in order
    pub overrides: Vec<EnvOverride>,
    /// Optional StartBuild-shaped request template
    pub template: Option<serde_json::Value>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The build was started and not waited on
    Submitted(BuildHandle),
    /// The build was followed to completion
    Completed(BuildOutcome),
}

impl RunOutcome {
    /// Process exit code for this outcome.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Submitted(_) => 0,
            Self::Completed(outcome) => outcome.exit_code(),
        }
    }
}

/// Drives one build from source upload to resolved outcome.
#[derive(Debug)]
pub struct Relay<'a> {
    config: &'a RelayConfig,
    services: Collaborators<'a>,
}

impl<'a> Relay<'a> {
    /// Create a relay over validated or unvalidated configuration.
    #[must_use]
    pub fn new(config: &'a RelayConfig, services: Collaborators<'a>) -> Self {
        Self { config, services }
    }

    /// Run the full lifecycle.
    ///
    /// Configuration is validated before any remote call. When waiting is
    /// disabled the run ends right after submission.
    ///
    /// # Errors
    /// Returns the first fatal error: missing configuration, an unversioned
    /// source upload, a rejected submission, a failed core remote call or
    /// cancellation. A non-success build status is not an error here; see
    /// [`RunOutcome::exit_code`] and [`BuildOutcome::into_result`].
    #[instrument(name = "relay", skip_all, fields(project = self.config.project_name.as_deref()))]
    pub async fn run(&self, input: RunInput, cancel: &CancellationToken) -> Result<RunOutcome> {
        let config = self.config;
        let Collaborators {
            builds,
            logs,
            sources,
            archive,
            artifacts,
            reporter,
        } = self.services;

        let location = config.source_location()?;
        let size = input.source_archive.len();
        let version = sources
            .upload_archive(input.source_archive, &location)
            .await?
            .filter(|v| !v.is_empty());
        if version.is_none() {
            return Err(Error::precondition([format!(
                "source version (bucket '{}' must have versioning enabled)",
                location.bucket
            )]));
        }
        info!(location = %location, bytes = size, version = version.as_deref(), "Uploaded source archive");

        let identity = SourceIdentity {
            bucket: Some(location.bucket.clone()),
            key: Some(location.key.clone()),
            version,
        };
        let merged = RequestMerger::new(config.project_name.clone(), config.dedup).merge(
            &identity,
            input.overrides,
            input.template.as_ref(),
        )?;
        for warning in &merged.warnings {
            reporter.warning(warning);
        }

        let handle = submit(builds, &merged.request, reporter).await?;
        if !config.wait {
            info!(build_id = %handle, "Not waiting for build completion");
            return Ok(RunOutcome::Submitted(handle));
        }

        let tailer = LogTailer::new(builds, logs, reporter);
        let mut cursor = LogCursor::new();
        CompletionPoller::new(config.poll_interval)
            .stop_on_cancel(config.stop_on_cancel)
            .wait(builds, &tailer, reporter, &handle, &mut cursor, cancel)
            .await?;

        let project = merged
            .request
            .project_name
            .clone()
            .unwrap_or_else(|| project_from_build_id(&handle));
        let mut resolver = ResultResolver::new(builds).with_artifacts(
            artifacts,
            config.packaging.clone(),
            config.artifact_dir.clone(),
        );
        if let Some(target) = &config.archive {
            resolver = resolver.with_archive(archive, target);
        }
        let mut outcome = resolver.resolve(&handle, &project, reporter).await?;

        let mut warnings = merged.warnings;
        warnings.append(&mut outcome.warnings);
        outcome.warnings = warnings;
        Ok(RunOutcome::Completed(outcome))
    }
}

/// Build ids have the form `<project>:<uuid>`.
fn project_from_build_id(handle: &BuildHandle) -> String {
    handle
        .build_id
        .split_once(':')
        .map_or_else(|| handle.build_id.clone(), |(project, _)| project.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArchiveNaming, ArchiveTarget};
    use crate::error::WarningKind;
    use crate::testing::{
        FakeBuildService, FakeLogSource, MemoryStore, RecordingFetcher, RecordingReporter,
        ReportEvent, page,
    };
    use crate::types::{BuildStatus, LogDescriptor, S3Location};
    use std::time::Duration;

    fn config() -> RelayConfig {
        RelayConfig {
            project_name: Some("app".into()),
            source_bucket: Some("sources".into()),
            source_key: Some("app/src.zip".into()),
            poll_interval: Duration::from_secs(10),
            ..RelayConfig::default()
        }
    }

    struct Harness {
        builds: FakeBuildService,
        logs: FakeLogSource,
        store: MemoryStore,
        fetcher: RecordingFetcher,
        reporter: RecordingReporter,
    }

    impl Harness {
        fn new(builds: FakeBuildService) -> Self {
            Self {
                builds,
                logs: FakeLogSource::new([]),
                store: MemoryStore::default(),
                fetcher: RecordingFetcher::default(),
                reporter: RecordingReporter::default(),
            }
        }

        fn services(&self) -> Collaborators<'_> {
            Collaborators {
                builds: &self.builds,
                logs: &self.logs,
                sources: &self.store,
                archive: &self.store,
                artifacts: &self.fetcher,
                reporter: &self.reporter,
            }
        }
    }

    fn input() -> RunInput {
        RunInput {
            source_archive: Bytes::from_static(b"PK\x05\x06"),
            overrides: vec![EnvOverride::new("FOO", "bar"), EnvOverride::new("FOO", "bar")],
            template: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_succeeds() {
        let mut harness = Harness::new(
            FakeBuildService::new()
                .with_descriptor(LogDescriptor::new("/aws/codebuild/app", "s"))
                .with_completion([false, true]),
        );
        harness.logs = FakeLogSource::new([page(&["building\n"], "t1"), page(&[], "t1")]);
        let config = config();

        let outcome = Relay::new(&config, harness.services())
            .run(input(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.exit_code(), 0);
        let submitted = harness.builds.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].overrides, vec![EnvOverride::new("FOO", "bar")]);
        assert_eq!(submitted[0].source_version, "v-0001");
        assert_eq!(submitted[0].source_location.as_deref(), Some("sources/app/src.zip"));
        assert_eq!(harness.reporter.lines(), vec!["building\n"]);
        assert_eq!(
            harness.store.objects()[0].0,
            S3Location::new("sources", "app/src.zip")
        );
    }

    #[tokio::test]
    async fn test_missing_config_fails_before_remote_calls() {
        let harness = Harness::new(FakeBuildService::new());
        let config = RelayConfig::default();

        let err = Relay::new(&config, harness.services())
            .run(input(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Precondition { ref missing } if missing.len() == 2));
        assert!(harness.store.objects().is_empty());
        assert!(harness.builds.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_unversioned_bucket_is_a_precondition_failure() {
        let mut harness = Harness::new(FakeBuildService::new());
        harness.store = MemoryStore::unversioned();
        let config = config();

        let err = Relay::new(&config, harness.services())
            .run(input(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Precondition { .. }));
        assert!(err.to_string().contains("versioning"));
        assert!(harness.builds.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_no_wait_returns_after_submission() {
        let harness = Harness::new(FakeBuildService::new());
        let config = RelayConfig {
            wait: false,
            ..config()
        };

        let outcome = Relay::new(&config, harness.services())
            .run(input(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Submitted(BuildHandle::new("app:0f3c9a1e")));
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(harness.builds.completion_checks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_build_exits_non_zero() {
        let harness = Harness::new(FakeBuildService::new().with_status(BuildStatus::Failed));
        let config = config();

        let outcome = Relay::new(&config, harness.services())
            .run(input(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.exit_code(), 1);
        assert!(harness.fetcher.calls().is_empty());
        assert!(
            harness
                .reporter
                .events()
                .contains(&ReportEvent::Finished(BuildStatus::Failed))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflicts_and_archive_warnings_are_collected() {
        let harness = Harness::new(FakeBuildService::new());
        let config = RelayConfig {
            project_name: None,
            archive: Some(ArchiveTarget {
                destination: S3Location::new("results", "runs"),
                naming: ArchiveNaming {
                    platform: "local".into(),
                    commit: "deadbeef".into(),
                },
            }),
            ..config()
        };
        let input = RunInput {
            overrides: vec![EnvOverride::new("A", "1"), EnvOverride::new("A", "2")],
            ..input()
        };

        let RunOutcome::Completed(outcome) = Relay::new(&config, harness.services())
            .run(input, &CancellationToken::new())
            .await
            .unwrap()
        else {
            panic!("expected a completed run");
        };

        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, WarningKind::OverrideConflict);
        let keys: Vec<String> = harness
            .store
            .objects()
            .into_iter()
            .map(|(location, _)| location.key)
            .collect();
        assert_eq!(keys, vec!["app/src.zip", "runs/local-app-deadbeef.json"]);
    }

    #[test]
    fn test_project_from_build_id() {
        assert_eq!(project_from_build_id(&BuildHandle::new("web:1234")), "web");
        assert_eq!(project_from_build_id(&BuildHandle::new("plain")), "plain");
    }
}
