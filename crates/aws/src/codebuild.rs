//! AWS CodeBuild build service

use async_trait::async_trait;
use aws_sdk_codebuild::Client;
use aws_sdk_codebuild::error::DisplayErrorContext;
use aws_sdk_codebuild::operation::start_build::StartBuildOutput;
use aws_sdk_codebuild::types::{Build, EnvironmentVariable, EnvironmentVariableType, SourceType};
use buildrelay_core::types::{ArtifactLocation, BuildLogs};
use buildrelay_core::{
    BuildHandle, BuildRequest, BuildResult, BuildService, BuildStatus, EnvOverride, Error, Result,
};
use tracing::debug;

use crate::request::ForwardedFields;

fn environment_variable(o: &EnvOverride) -> Result<EnvironmentVariable> {
    EnvironmentVariable::builder()
        .name(&o.name)
        .value(&o.value)
        .set_type(o.kind.as_deref().map(EnvironmentVariableType::from))
        .build()
        .map_err(|e| Error::submission(format!("invalid override {}: {e}", o.name)))
}

/// Convert a CodeBuild build record into the core model.
///
/// # Errors
/// Returns [`Error::Remote`] when the record has no id or an unknown status.
pub fn build_result(build: &Build) -> Result<BuildResult> {
    let build_id = build
        .id()
        .ok_or_else(|| Error::remote("BatchGetBuilds", "build record has no id"))?;
    let status = match build.build_status() {
        Some(status) => status
            .as_str()
            .parse::<BuildStatus>()
            .map_err(|e| Error::remote("BatchGetBuilds", e))?,
        None => BuildStatus::InProgress,
    };

    Ok(BuildResult {
        build_id: build_id.to_string(),
        status,
        artifacts: build
            .artifacts()
            .and_then(|a| a.location())
            .map(|location| ArtifactLocation {
                location: location.to_string(),
            }),
        logs: build.logs().map(|logs| BuildLogs {
            group_name: logs.group_name().map(String::from),
            stream_name: logs.stream_name().map(String::from),
            deep_link: logs.deep_link().map(String::from),
        }),
        current_phase: build.current_phase().map(String::from),
    })
}

fn started_handle(output: &StartBuildOutput) -> Result<BuildHandle> {
    output
        .build_value()
        .and_then(Build::id)
        .map(BuildHandle::new)
        .ok_or_else(|| Error::submission("StartBuild returned no build id"))
}

/// [`BuildService`] backed by AWS CodeBuild.
#[derive(Debug, Clone)]
pub struct CodeBuildService {
    client: Client,
}

impl CodeBuildService {
    /// Wrap a CodeBuild client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_build(&self, handle: &BuildHandle) -> Result<Build> {
        let output = self
            .client
            .batch_get_builds()
            .ids(&handle.build_id)
            .send()
            .await
            .map_err(|e| Error::remote("BatchGetBuilds", DisplayErrorContext(&e).to_string()))?;

        output.builds().first().cloned().ok_or_else(|| {
            Error::remote("BatchGetBuilds", format!("build {handle} was not found"))
        })
    }
}

#[async_trait]
impl BuildService for CodeBuildService {
    async fn start_build(&self, request: &BuildRequest) -> Result<BuildHandle> {
        let forwarded = ForwardedFields::from_fields(&request.extra_fields)?;
        let overrides = request
            .overrides
            .iter()
            .map(environment_variable)
            .collect::<Result<Vec<_>>>()?;

        let mut call = self
            .client
            .start_build()
            .set_project_name(request.project_name.clone())
            .source_version(&request.source_version)
            .set_environment_variables_override(Some(overrides));
        if let Some(location) = &request.source_location {
            call = call
                .source_type_override(SourceType::S3)
                .source_location_override(location);
        }
        let call = forwarded.apply(call);

        debug!(project = ?request.project_name, "Calling StartBuild");
        let output = call
            .send()
            .await
            .map_err(|e| Error::submission(DisplayErrorContext(&e).to_string()))?;

        started_handle(&output)
    }

    async fn is_build_complete(&self, handle: &BuildHandle) -> Result<bool> {
        let build = self.fetch_build(handle).await?;
        debug!(
            build_id = %handle,
            phase = build.current_phase().unwrap_or("UNKNOWN"),
            complete = build.build_complete(),
            "Polled build"
        );
        Ok(build.build_complete())
    }

    async fn get_build_record(&self, handle: &BuildHandle) -> Result<BuildResult> {
        build_result(&self.fetch_build(handle).await?)
    }

    async fn stop_build(&self, handle: &BuildHandle) -> Result<()> {
        self.client
            .stop_build()
            .id(&handle.build_id)
            .send()
            .await
            .map_err(|e| Error::remote("StopBuild", DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_codebuild::types::{BuildArtifacts, LogsLocation, StatusType};

    #[test]
    fn test_environment_variable_keeps_type() {
        let mut o = EnvOverride::new("TOKEN", "/ci/token");
        o.kind = Some("PARAMETER_STORE".to_string());
        let var = environment_variable(&o).unwrap();
        assert_eq!(var.name(), "TOKEN");
        assert_eq!(var.value(), "/ci/token");
        assert_eq!(var.r#type(), Some(&EnvironmentVariableType::ParameterStore));
    }

    #[test]
    fn test_build_result_maps_record() {
        let build = Build::builder()
            .id("app:1234")
            .build_status(StatusType::Failed)
            .current_phase("COMPLETED")
            .artifacts(
                BuildArtifacts::builder()
                    .location("arn:aws:s3:::artifacts/app")
                    .build(),
            )
            .logs(
                LogsLocation::builder()
                    .group_name("/aws/codebuild/app")
                    .stream_name("1234")
                    .build(),
            )
            .build();

        let result = build_result(&build).unwrap();
        assert_eq!(result.build_id, "app:1234");
        assert_eq!(result.status, BuildStatus::Failed);
        assert_eq!(result.artifact_location(), Some("arn:aws:s3:::artifacts/app"));
        assert_eq!(
            result.logs.and_then(|l| l.descriptor()).map(|d| d.stream),
            Some("1234".to_string())
        );
    }

    #[test]
    fn test_build_result_without_status_is_in_progress() {
        let build = Build::builder().id("app:1").build();
        assert_eq!(build_result(&build).unwrap().status, BuildStatus::InProgress);
    }

    #[test]
    fn test_build_result_requires_id() {
        assert!(build_result(&Build::builder().build()).is_err());
    }

    #[test]
    fn test_started_handle_reads_build_id() {
        let output = StartBuildOutput::builder()
            .build_value(Build::builder().id("app:0f3c9a1e").build())
            .build();
        assert_eq!(started_handle(&output).unwrap().build_id, "app:0f3c9a1e");

        let empty = StartBuildOutput::builder().build();
        assert!(matches!(started_handle(&empty), Err(Error::Submission { .. })));
    }
}
