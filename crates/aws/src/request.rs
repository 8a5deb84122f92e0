//! StartBuild parameters forwarded from request templates and trailing
//! command line options
//!
//! Field names follow the StartBuild JSON shape (`--cli-input-json`).
//! Structured members are converted into their SDK types here so that a
//! malformed value fails before the call is made.

use aws_sdk_codebuild::operation::start_build::builders::StartBuildFluentBuilder;
use aws_sdk_codebuild::types::{
    ArtifactNamespace, ArtifactPackaging, ArtifactsType, BucketOwnerAccess, BuildStatusConfig,
    CacheMode, CacheType, CloudWatchLogsConfig, ComputeType, CredentialProviderType,
    EnvironmentType, GitSubmodulesConfig, ImagePullCredentialsType, LogsConfig,
    LogsConfigStatusType, ProjectArtifacts, ProjectCache, ProjectFleet, ProjectSource,
    ProjectSourceVersion, RegistryCredential, S3LogsConfig, SourceAuth, SourceAuthType, SourceType,
};
use buildrelay_core::{Error, Result};
use serde_json::{Map, Value};

/// Optional StartBuild parameters.
///
/// Integer and boolean fields also accept their string spelling, since
/// trailing options always arrive as strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForwardedFields {
    /// `buildspecOverride`
    pub buildspec_override: Option<String>,
    /// `imageOverride`
    pub image_override: Option<String>,
    /// `computeTypeOverride`, e.g. `BUILD_GENERAL1_SMALL`
    pub compute_type_override: Option<String>,
    /// `environmentTypeOverride`, e.g. `LINUX_CONTAINER`
    pub environment_type_override: Option<String>,
    /// `privilegedModeOverride`
    pub privileged_mode_override: Option<bool>,
    /// `timeoutInMinutesOverride`
    pub timeout_in_minutes_override: Option<i32>,
    /// `queuedTimeoutInMinutesOverride`
    pub queued_timeout_in_minutes_override: Option<i32>,
    /// `serviceRoleOverride`
    pub service_role_override: Option<String>,
    /// `gitCloneDepthOverride`
    pub git_clone_depth_override: Option<i32>,
    /// `idempotencyToken`
    pub idempotency_token: Option<String>,
    /// `debugSessionEnabled`
    pub debug_session_enabled: Option<bool>,
    /// `insecureSslOverride`
    pub insecure_ssl_override: Option<bool>,
    /// `reportBuildStatusOverride`
    pub report_build_status_override: Option<bool>,
    /// `certificateOverride`
    pub certificate_override: Option<String>,
    /// `encryptionKeyOverride`
    pub encryption_key_override: Option<String>,
    /// `imagePullCredentialsTypeOverride`, `CODEBUILD` or `SERVICE_ROLE`
    pub image_pull_credentials_type_override: Option<String>,
    /// `autoRetryLimitOverride`
    pub auto_retry_limit_override: Option<i32>,
    /// `artifactsOverride`
    pub artifacts_override: Option<ProjectArtifacts>,
    /// `secondaryArtifactsOverride`
    pub secondary_artifacts_override: Option<Vec<ProjectArtifacts>>,
    /// `secondarySourcesOverride`
    pub secondary_sources_override: Option<Vec<ProjectSource>>,
    /// `secondarySourcesVersionOverride`
    pub secondary_sources_version_override: Option<Vec<ProjectSourceVersion>>,
    /// `sourceAuthOverride`
    pub source_auth_override: Option<SourceAuth>,
    /// `gitSubmodulesConfigOverride`
    pub git_submodules_config_override: Option<GitSubmodulesConfig>,
    /// `buildStatusConfigOverride`
    pub build_status_config_override: Option<BuildStatusConfig>,
    /// `cacheOverride`
    pub cache_override: Option<ProjectCache>,
    /// `logsConfigOverride`
    pub logs_config_override: Option<LogsConfig>,
    /// `registryCredentialOverride`
    pub registry_credential_override: Option<RegistryCredential>,
    /// `fleetOverride`
    pub fleet_override: Option<ProjectFleet>,
}

impl ForwardedFields {
    /// Interpret the extra fields of a merged request. `null` values are
    /// treated as absent.
    ///
    /// # Errors
    /// Returns [`Error::Submission`] for names that are not StartBuild
    /// parameters, values of the wrong type and structures missing a
    /// required member.
    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self> {
        let mut out = Self::default();
        for (name, value) in fields {
            if value.is_null() {
                continue;
            }
            let n = name.as_str();
            match n {
                "buildspecOverride" => out.buildspec_override = Some(string(n, value)?),
                "imageOverride" => out.image_override = Some(string(n, value)?),
                "computeTypeOverride" => out.compute_type_override = Some(string(n, value)?),
                "environmentTypeOverride" => out.environment_type_override = Some(string(n, value)?),
                "privilegedModeOverride" => out.privileged_mode_override = Some(boolean(n, value)?),
                "timeoutInMinutesOverride" => {
                    out.timeout_in_minutes_override = Some(integer(n, value)?);
                }
                "queuedTimeoutInMinutesOverride" => {
                    out.queued_timeout_in_minutes_override = Some(integer(n, value)?);
                }
                "serviceRoleOverride" => out.service_role_override = Some(string(n, value)?),
                "gitCloneDepthOverride" => out.git_clone_depth_override = Some(integer(n, value)?),
                "idempotencyToken" => out.idempotency_token = Some(string(n, value)?),
                "debugSessionEnabled" => out.debug_session_enabled = Some(boolean(n, value)?),
                "insecureSslOverride" => out.insecure_ssl_override = Some(boolean(n, value)?),
                "reportBuildStatusOverride" => {
                    out.report_build_status_override = Some(boolean(n, value)?);
                }
                "certificateOverride" => out.certificate_override = Some(string(n, value)?),
                "encryptionKeyOverride" => out.encryption_key_override = Some(string(n, value)?),
                "imagePullCredentialsTypeOverride" => {
                    out.image_pull_credentials_type_override = Some(string(n, value)?);
                }
                "autoRetryLimitOverride" => out.auto_retry_limit_override = Some(integer(n, value)?),
                "artifactsOverride" => out.artifacts_override = Some(artifacts(n, value)?),
                "secondaryArtifactsOverride" => {
                    out.secondary_artifacts_override = Some(list(n, value, artifacts)?);
                }
                "secondarySourcesOverride" => {
                    out.secondary_sources_override = Some(list(n, value, project_source)?);
                }
                "secondarySourcesVersionOverride" => {
                    out.secondary_sources_version_override = Some(list(n, value, source_version)?);
                }
                "sourceAuthOverride" => out.source_auth_override = Some(source_auth(n, value)?),
                "gitSubmodulesConfigOverride" => {
                    out.git_submodules_config_override = Some(git_submodules(n, value)?);
                }
                "buildStatusConfigOverride" => {
                    out.build_status_config_override = Some(build_status_config(n, value)?);
                }
                "cacheOverride" => out.cache_override = Some(cache(n, value)?),
                "logsConfigOverride" => out.logs_config_override = Some(logs_config(n, value)?),
                "registryCredentialOverride" => {
                    out.registry_credential_override = Some(registry_credential(n, value)?);
                }
                "fleetOverride" => out.fleet_override = Some(fleet(n, value)?),
                other => {
                    return Err(Error::submission(format!(
                        "'{other}' is not a StartBuild parameter"
                    )));
                }
            }
        }
        Ok(out)
    }

    /// Set every present parameter on a StartBuild call.
    #[must_use]
    pub fn apply(self, request: StartBuildFluentBuilder) -> StartBuildFluentBuilder {
        request
            .set_buildspec_override(self.buildspec_override)
            .set_image_override(self.image_override)
            .set_compute_type_override(self.compute_type_override.as_deref().map(ComputeType::from))
            .set_environment_type_override(
                self.environment_type_override
                    .as_deref()
                    .map(EnvironmentType::from),
            )
            .set_privileged_mode_override(self.privileged_mode_override)
            .set_timeout_in_minutes_override(self.timeout_in_minutes_override)
            .set_queued_timeout_in_minutes_override(self.queued_timeout_in_minutes_override)
            .set_service_role_override(self.service_role_override)
            .set_git_clone_depth_override(self.git_clone_depth_override)
            .set_idempotency_token(self.idempotency_token)
            .set_debug_session_enabled(self.debug_session_enabled)
            .set_insecure_ssl_override(self.insecure_ssl_override)
            .set_report_build_status_override(self.report_build_status_override)
            .set_certificate_override(self.certificate_override)
            .set_encryption_key_override(self.encryption_key_override)
            .set_image_pull_credentials_type_override(
                self.image_pull_credentials_type_override
                    .as_deref()
                    .map(ImagePullCredentialsType::from),
            )
            .set_auto_retry_limit_override(self.auto_retry_limit_override)
            .set_artifacts_override(self.artifacts_override)
            .set_secondary_artifacts_override(self.secondary_artifacts_override)
            .set_secondary_sources_override(self.secondary_sources_override)
            .set_secondary_sources_version_override(self.secondary_sources_version_override)
            .set_source_auth_override(self.source_auth_override)
            .set_git_submodules_config_override(self.git_submodules_config_override)
            .set_build_status_config_override(self.build_status_config_override)
            .set_cache_override(self.cache_override)
            .set_logs_config_override(self.logs_config_override)
            .set_registry_credential_override(self.registry_credential_override)
            .set_fleet_override(self.fleet_override)
    }
}

fn string(path: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(String::from)
        .ok_or_else(|| Error::submission(format!("'{path}' must be a string, got {value}")))
}

fn integer(path: &str, value: &Value) -> Result<i32> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| Error::submission(format!("'{path}' must be an integer, got {value}")))
}

fn boolean(path: &str, value: &Value) -> Result<bool> {
    let parsed = match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| Error::submission(format!("'{path}' must be true or false, got {value}")))
}

fn list<T>(path: &str, value: &Value, item: fn(&str, &Value) -> Result<T>) -> Result<Vec<T>> {
    let items = value
        .as_array()
        .ok_or_else(|| Error::submission(format!("'{path}' must be a list, got {value}")))?;
    items
        .iter()
        .enumerate()
        .map(|(i, v)| item(&format!("{path}[{i}]"), v))
        .collect()
}

fn built<T, E: std::fmt::Display>(path: &str, result: std::result::Result<T, E>) -> Result<T> {
    result.map_err(|e| Error::submission(format!("'{path}': {e}")))
}

/// Members of one JSON object, with unknown members rejected up front.
struct Members<'a> {
    path: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> Members<'a> {
    fn new(path: &'a str, value: &'a Value, known: &[&str]) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| Error::submission(format!("'{path}' must be an object, got {value}")))?;
        if let Some(unknown) = map.keys().find(|k| !known.contains(&k.as_str())) {
            return Err(Error::submission(format!(
                "'{path}' has no member '{unknown}'"
            )));
        }
        Ok(Self { path, map })
    }

    fn get(&self, key: &str) -> Option<(String, &'a Value)> {
        self.map
            .get(key)
            .filter(|v| !v.is_null())
            .map(|v| (format!("{}.{key}", self.path), v))
    }

    fn string(&self, key: &str) -> Result<Option<String>> {
        self.get(key).map(|(p, v)| string(&p, v)).transpose()
    }

    fn boolean(&self, key: &str) -> Result<Option<bool>> {
        self.get(key).map(|(p, v)| boolean(&p, v)).transpose()
    }

    fn integer(&self, key: &str) -> Result<Option<i32>> {
        self.get(key).map(|(p, v)| integer(&p, v)).transpose()
    }

    fn nested<T>(&self, key: &str, parse: fn(&str, &Value) -> Result<T>) -> Result<Option<T>> {
        self.get(key).map(|(p, v)| parse(&p, v)).transpose()
    }
}

fn artifacts(path: &str, value: &Value) -> Result<ProjectArtifacts> {
    let m = Members::new(
        path,
        value,
        &[
            "type",
            "location",
            "path",
            "namespaceType",
            "name",
            "packaging",
            "overrideArtifactName",
            "encryptionDisabled",
            "artifactIdentifier",
            "bucketOwnerAccess",
        ],
    )?;
    built(
        path,
        ProjectArtifacts::builder()
            .set_type(m.string("type")?.as_deref().map(ArtifactsType::from))
            .set_location(m.string("location")?)
            .set_path(m.string("path")?)
            .set_namespace_type(m.string("namespaceType")?.as_deref().map(ArtifactNamespace::from))
            .set_name(m.string("name")?)
            .set_packaging(m.string("packaging")?.as_deref().map(ArtifactPackaging::from))
            .set_override_artifact_name(m.boolean("overrideArtifactName")?)
            .set_encryption_disabled(m.boolean("encryptionDisabled")?)
            .set_artifact_identifier(m.string("artifactIdentifier")?)
            .set_bucket_owner_access(
                m.string("bucketOwnerAccess")?
                    .as_deref()
                    .map(BucketOwnerAccess::from),
            )
            .build(),
    )
}

fn project_source(path: &str, value: &Value) -> Result<ProjectSource> {
    let m = Members::new(
        path,
        value,
        &[
            "type",
            "location",
            "gitCloneDepth",
            "gitSubmodulesConfig",
            "buildspec",
            "auth",
            "reportBuildStatus",
            "buildStatusConfig",
            "insecureSsl",
            "sourceIdentifier",
        ],
    )?;
    built(
        path,
        ProjectSource::builder()
            .set_type(m.string("type")?.as_deref().map(SourceType::from))
            .set_location(m.string("location")?)
            .set_git_clone_depth(m.integer("gitCloneDepth")?)
            .set_git_submodules_config(m.nested("gitSubmodulesConfig", git_submodules)?)
            .set_buildspec(m.string("buildspec")?)
            .set_auth(m.nested("auth", source_auth)?)
            .set_report_build_status(m.boolean("reportBuildStatus")?)
            .set_build_status_config(m.nested("buildStatusConfig", build_status_config)?)
            .set_insecure_ssl(m.boolean("insecureSsl")?)
            .set_source_identifier(m.string("sourceIdentifier")?)
            .build(),
    )
}

fn source_version(path: &str, value: &Value) -> Result<ProjectSourceVersion> {
    let m = Members::new(path, value, &["sourceIdentifier", "sourceVersion"])?;
    built(
        path,
        ProjectSourceVersion::builder()
            .set_source_identifier(m.string("sourceIdentifier")?)
            .set_source_version(m.string("sourceVersion")?)
            .build(),
    )
}

fn source_auth(path: &str, value: &Value) -> Result<SourceAuth> {
    let m = Members::new(path, value, &["type", "resource"])?;
    built(
        path,
        SourceAuth::builder()
            .set_type(m.string("type")?.as_deref().map(SourceAuthType::from))
            .set_resource(m.string("resource")?)
            .build(),
    )
}

fn git_submodules(path: &str, value: &Value) -> Result<GitSubmodulesConfig> {
    let m = Members::new(path, value, &["fetchSubmodules"])?;
    built(
        path,
        GitSubmodulesConfig::builder()
            .set_fetch_submodules(m.boolean("fetchSubmodules")?)
            .build(),
    )
}

fn build_status_config(path: &str, value: &Value) -> Result<BuildStatusConfig> {
    let m = Members::new(path, value, &["context", "targetUrl"])?;
    Ok(BuildStatusConfig::builder()
        .set_context(m.string("context")?)
        .set_target_url(m.string("targetUrl")?)
        .build())
}

fn cache(path: &str, value: &Value) -> Result<ProjectCache> {
    let m = Members::new(path, value, &["type", "location", "modes"])?;
    let modes = m
        .nested("modes", |p, v| {
            list(p, v, |p, v| Ok(CacheMode::from(string(p, v)?.as_str())))
        })?;
    built(
        path,
        ProjectCache::builder()
            .set_type(m.string("type")?.as_deref().map(CacheType::from))
            .set_location(m.string("location")?)
            .set_modes(modes)
            .build(),
    )
}

fn logs_config(path: &str, value: &Value) -> Result<LogsConfig> {
    let m = Members::new(path, value, &["cloudWatchLogs", "s3Logs"])?;
    Ok(LogsConfig::builder()
        .set_cloud_watch_logs(m.nested("cloudWatchLogs", cloud_watch_logs)?)
        .set_s3_logs(m.nested("s3Logs", s3_logs)?)
        .build())
}

fn cloud_watch_logs(path: &str, value: &Value) -> Result<CloudWatchLogsConfig> {
    let m = Members::new(path, value, &["status", "groupName", "streamName"])?;
    built(
        path,
        CloudWatchLogsConfig::builder()
            .set_status(m.string("status")?.as_deref().map(LogsConfigStatusType::from))
            .set_group_name(m.string("groupName")?)
            .set_stream_name(m.string("streamName")?)
            .build(),
    )
}

fn s3_logs(path: &str, value: &Value) -> Result<S3LogsConfig> {
    let m = Members::new(
        path,
        value,
        &["status", "location", "encryptionDisabled", "bucketOwnerAccess"],
    )?;
    built(
        path,
        S3LogsConfig::builder()
            .set_status(m.string("status")?.as_deref().map(LogsConfigStatusType::from))
            .set_location(m.string("location")?)
            .set_encryption_disabled(m.boolean("encryptionDisabled")?)
            .set_bucket_owner_access(
                m.string("bucketOwnerAccess")?
                    .as_deref()
                    .map(BucketOwnerAccess::from),
            )
            .build(),
    )
}

fn registry_credential(path: &str, value: &Value) -> Result<RegistryCredential> {
    let m = Members::new(path, value, &["credential", "credentialProvider"])?;
    built(
        path,
        RegistryCredential::builder()
            .set_credential(m.string("credential")?)
            .set_credential_provider(
                m.string("credentialProvider")?
                    .as_deref()
                    .map(CredentialProviderType::from),
            )
            .build(),
    )
}

fn fleet(path: &str, value: &Value) -> Result<ProjectFleet> {
    let m = Members::new(path, value, &["fleetArn"])?;
    Ok(ProjectFleet::builder()
        .set_fleet_arn(m.string("fleetArn")?)
        .build())
}
