//! End-to-end runs of the command line against in-memory services.

use buildrelay::Cli;
use buildrelay::errors::{CliError, EXIT_CANCELLED, exit_code_for};
use buildrelay::run::relay;
use buildrelay_ci::CIContext;
use buildrelay_core::testing::{
    FakeBuildService, FakeLogSource, MemoryStore, RecordingFetcher, RecordingReporter, page,
};
use buildrelay_core::{
    BuildStatus, Collaborators, EnvOverride, Error, LogDescriptor, PackagingMode, RunOutcome,
    S3Location, WarningKind,
};
use clap::Parser;
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Workspace {
    source: TempDir,
    artifacts: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("buildspec.yml"), "version: 0.2\n").unwrap();
        std::fs::create_dir_all(source.path().join("src")).unwrap();
        std::fs::write(source.path().join("src/lib.rs"), "").unwrap();
        Self {
            source,
            artifacts: tempfile::tempdir().unwrap(),
        }
    }

    fn cli(&self, extra: &[&str]) -> Cli {
        let source = self.source.path().display().to_string();
        let artifacts = self.artifacts.path().display().to_string();
        let mut argv = vec![
            "buildrelay",
            "--project",
            "app",
            "--bucket",
            "sources",
            "--key",
            "app/src.zip",
            "--source-dir",
            source.as_str(),
            "--artifact-dir",
            artifacts.as_str(),
            "--poll-interval",
            "1",
        ];
        argv.extend_from_slice(extra);
        Cli::try_parse_from(argv).unwrap()
    }
}

struct Services {
    builds: FakeBuildService,
    logs: FakeLogSource,
    store: MemoryStore,
    fetcher: RecordingFetcher,
    reporter: RecordingReporter,
}

impl Services {
    fn new(builds: FakeBuildService) -> Self {
        Self {
            builds,
            logs: FakeLogSource::default(),
            store: MemoryStore::default(),
            fetcher: RecordingFetcher::default(),
            reporter: RecordingReporter::default(),
        }
    }

    fn collaborators(&self) -> Collaborators<'_> {
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

fn ci() -> CIContext {
    CIContext {
        provider: "github".into(),
        event: "push".into(),
        ref_name: "main".into(),
        sha: "abc1234def".into(),
    }
}

async fn run(cli: &Cli, pattern: Option<&str>, services: &Services) -> Result<RunOutcome, CliError> {
    relay(
        cli,
        &ci(),
        pattern,
        services.collaborators(),
        &CancellationToken::new(),
    )
    .await
}

fn zip_names(archive: &[u8]) -> Vec<String> {
    let zip = zip::ZipArchive::new(Cursor::new(archive.to_vec())).unwrap();
    let mut names: Vec<String> = zip.file_names().map(String::from).collect();
    names.sort();
    names
}

#[tokio::test(start_paused = true)]
async fn test_successful_build_streams_logs_and_exits_zero() {
    let workspace = Workspace::new();
    let descriptor = LogDescriptor::new("/aws/codebuild/app", "0f3c9a1e");
    let services = Services {
        logs: FakeLogSource::new([
            page(&["[Container] Entering phase BUILD\n", "make test\n"], "t1"),
            page(&["ok\n"], "t2"),
        ]),
        ..Services::new(
            FakeBuildService::new()
                .with_descriptor(descriptor)
                .with_completion([false, false]),
        )
    };
    let cli = workspace.cli(&["-e", "DEPLOY=false"]);

    let outcome = temp_env::async_with_vars(
        [
            ("RELAYTEST_A_REF", Some("refs/heads/main")),
            ("RELAYTEST_A_SHA", Some("abc1234def")),
        ],
        run(&cli, Some("^RELAYTEST_A_"), &services),
    )
    .await
    .unwrap();

    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(
        services.reporter.lines(),
        vec!["[Container] Entering phase BUILD\n", "make test\n", "ok\n"]
    );
    assert_eq!(services.reporter.banners(), 1);

    let submitted = services.builds.submitted();
    assert_eq!(submitted.len(), 1);
    let request = &submitted[0];
    assert_eq!(request.project_name.as_deref(), Some("app"));
    assert_eq!(request.source_version, "v-0001");
    assert_eq!(request.source_location.as_deref(), Some("sources/app/src.zip"));
    let mut names: Vec<&str> = request.overrides.iter().map(|o| o.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["DEPLOY", "RELAYTEST_A_REF", "RELAYTEST_A_SHA"]);
    assert_eq!(
        request.overrides.last(),
        Some(&EnvOverride::new("DEPLOY", "false"))
    );

    let objects = services.store.objects();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].0, S3Location::new("sources", "app/src.zip"));
    assert_eq!(zip_names(&objects[0].1), vec!["buildspec.yml", "src/lib.rs"]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_build_maps_to_nonzero_exit() {
    let workspace = Workspace::new();
    let services = Services::new(FakeBuildService::new().with_status(BuildStatus::Failed));

    let outcome = run(&workspace.cli(&[]), None, &services).await.unwrap();

    assert_eq!(outcome.exit_code(), 1);
    let RunOutcome::Completed(outcome) = outcome else {
        panic!("expected a completed run");
    };
    let err = CliError::from(outcome.into_result().unwrap_err());
    assert!(matches!(
        err,
        CliError::Relay(Error::BuildFailed { ref status, .. }) if status == "FAILED"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_zip_artifacts_are_fetched_into_artifact_dir() {
    let workspace = Workspace::new();
    let services = Services::new(
        FakeBuildService::new().with_artifacts("arn:aws:s3:::artifacts/app/output.zip"),
    );

    let outcome = run(&workspace.cli(&[]), None, &services).await.unwrap();

    assert_eq!(outcome.exit_code(), 0);
    let calls = services.fetcher.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, S3Location::new("artifacts", "app/output.zip"));
    assert_eq!(calls[0].1, PackagingMode::Zip);
    assert_eq!(calls[0].2, workspace.artifacts.path());
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_packaging_warns_without_failing() {
    let workspace = Workspace::new();
    let services = Services::new(
        FakeBuildService::new().with_artifacts("arn:aws:s3:::artifacts/app/output.tar"),
    );

    let outcome = run(&workspace.cli(&["--packaging", "TAR"]), None, &services)
        .await
        .unwrap();

    assert_eq!(outcome.exit_code(), 0);
    assert!(services.fetcher.calls().is_empty());
    let warnings = services.reporter.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::Artifact);
}

#[tokio::test(start_paused = true)]
async fn test_no_wait_returns_after_submission() {
    let workspace = Workspace::new();
    let services = Services::new(FakeBuildService::new());

    let outcome = run(&workspace.cli(&["--no-wait"]), None, &services)
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Submitted(ref h) if h.build_id == "app:0f3c9a1e"));
    assert_eq!(services.builds.completion_checks(), 0);
    assert_eq!(services.logs.fetch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_bucket_fails_before_any_remote_call() {
    let workspace = Workspace::new();
    let source = workspace.source.path().display().to_string();
    let cli = temp_env::with_vars_unset(["BUILDRELAY_BUCKET", "BUILDRELAY_KEY"], || {
        Cli::try_parse_from(["buildrelay", "--project", "app", "--source-dir", &source]).unwrap()
    });
    let services = Services::new(FakeBuildService::new());

    let err = run(&cli, None, &services).await.unwrap_err();

    assert!(matches!(err, CliError::Relay(Error::Precondition { .. })));
    assert!(services.store.objects().is_empty());
    assert!(services.builds.submitted().is_empty());
}

#[tokio::test]
async fn test_execute_checks_settings_before_loading_aws_config() {
    let workspace = Workspace::new();
    let source = workspace.source.path().display().to_string();
    let cli = temp_env::with_vars_unset(["BUILDRELAY_BUCKET", "BUILDRELAY_KEY"], || {
        Cli::try_parse_from(["buildrelay", "--project", "app", "--source-dir", &source]).unwrap()
    });

    let err = temp_env::async_with_vars(
        [
            ("AWS_CONFIG_FILE", Some("/nonexistent/buildrelay/config")),
            ("AWS_EC2_METADATA_DISABLED", Some("true")),
        ],
        buildrelay::run::execute(cli),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, CliError::Relay(Error::Precondition { .. })), "{err}");
}

#[tokio::test(start_paused = true)]
async fn test_unversioned_bucket_is_rejected() {
    let workspace = Workspace::new();
    let services = Services {
        store: MemoryStore::unversioned(),
        ..Services::new(FakeBuildService::new())
    };

    let err = run(&workspace.cli(&[]), None, &services).await.unwrap_err();

    assert!(err.to_string().contains("versioning"), "{err}");
    assert!(services.builds.submitted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_template_and_forwarded_options_reach_the_request() {
    let workspace = Workspace::new();
    let template = workspace.source.path().join("request.json");
    std::fs::write(
        &template,
        r#"{"projectName": "ignored", "timeoutInMinutesOverride": 30}"#,
    )
    .unwrap();
    let template_arg = format!("file://{}", template.display());
    let cli = workspace.cli(&[
        "--cli-input-json",
        &template_arg,
        "--",
        "--image-override",
        "aws/codebuild/standard:7.0",
        "--privileged-mode-override",
    ]);
    let services = Services::new(FakeBuildService::new());

    run(&cli, None, &services).await.unwrap();

    let request = &services.builds.submitted()[0];
    assert_eq!(request.project_name.as_deref(), Some("app"));
    assert_eq!(request.extra_fields["timeoutInMinutesOverride"], 30);
    assert_eq!(
        request.extra_fields["imageOverride"],
        "aws/codebuild/standard:7.0"
    );
    assert_eq!(request.extra_fields["privilegedModeOverride"], true);
}

#[tokio::test(start_paused = true)]
async fn test_archive_record_is_named_after_platform_and_commit() {
    let workspace = Workspace::new();
    let services = Services::new(FakeBuildService::new());

    run(
        &workspace.cli(&["--archive-to", "s3://records/ci"]),
        None,
        &services,
    )
    .await
    .unwrap();

    let objects = services.store.objects();
    assert_eq!(objects.len(), 2);
    let (location, body) = &objects[1];
    assert_eq!(
        *location,
        S3Location::new("records", "ci/github-app-abc1234def.json")
    );
    let record: serde_json::Value = serde_json::from_slice(body).unwrap();
    assert_eq!(record["buildId"], "app:0f3c9a1e");
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_maps_to_interrupt_exit_code() {
    let workspace = Workspace::new();
    let services = Services::new(FakeBuildService::new().with_completion([false; 100]));
    let cli = workspace.cli(&["--stop-on-cancel"]);
    let cancel = CancellationToken::new();
    buildrelay::shutdown::cancel_after(cancel.clone(), std::time::Duration::from_secs(5));

    let err = relay(&cli, &ci(), None, services.collaborators(), &cancel)
        .await
        .unwrap_err();

    assert_eq!(exit_code_for(&err), EXIT_CANCELLED);
    assert_eq!(services.builds.stopped().len(), 1);
}

#[test]
fn test_package_ignores_artifact_dir_inside_source() {
    let workspace = Workspace::new();
    let inner = workspace.source.path().join(".codebuild_artifacts");
    std::fs::create_dir_all(&inner).unwrap();
    std::fs::write(inner.join("previous.txt"), "stale").unwrap();

    let archive =
        buildrelay::package::package_source(workspace.source.path(), &[inner.clone()]).unwrap();

    assert!(!zip_names(&archive).iter().any(|n| n.contains("previous")));
    assert!(Path::new(&inner).exists());
}
