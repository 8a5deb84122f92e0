//! Data model shared by the lifecycle stages and the remote backends.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named environment value injected into the remote build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvOverride {
    /// Variable name
    pub name: String,
    /// Variable value, kept verbatim
    pub value: String,
    /// Service-side variable type (`PLAINTEXT`, `PARAMETER_STORE`,
    /// `SECRETS_MANAGER`); `None` means plaintext
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl EnvOverride {
    /// Create a new plaintext override.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            kind: None,
        }
    }
}

impl FromStr for EnvOverride {
    type Err = String;

    /// Parse `NAME=VALUE`, splitting on the first `=` only.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
        if name.is_empty() {
            return Err(format!("empty variable name in '{s}'"));
        }
        Ok(Self::new(name, value))
    }
}

impl fmt::Display for EnvOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// A fully merged build start request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    /// Project to build; `None` lets the service pick its default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    /// Object version of the uploaded source archive
    pub source_version: String,
    /// `<bucket>/<key>` of the uploaded source archive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_location: Option<String>,
    /// Environment overrides, deduplicated
    #[serde(rename = "environmentVariablesOverride")]
    pub overrides: Vec<EnvOverride>,
    /// Remaining request fields forwarded verbatim to the service
    #[serde(flatten)]
    pub extra_fields: serde_json::Map<String, serde_json::Value>,
}

/// Correlation key for one remote build execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildHandle {
    /// Service-assigned build identifier
    pub build_id: String,
}

impl BuildHandle {
    /// Wrap a build identifier.
    #[must_use]
    pub fn new(build_id: impl Into<String>) -> Self {
        Self {
            build_id: build_id.into(),
        }
    }
}

impl fmt::Display for BuildHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build_id)
    }
}

/// Remote build status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    /// Still running
    InProgress,
    /// Finished successfully
    Succeeded,
    /// A build command failed
    Failed,
    /// The service itself failed
    Fault,
    /// Stopped by a user or API call
    Stopped,
    /// Ran past its configured timeout
    TimedOut,
}

impl BuildStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::InProgress,
        Self::Succeeded,
        Self::Failed,
        Self::Fault,
        Self::Stopped,
        Self::TimedOut,
    ];

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Fault => "FAULT",
            Self::Stopped => "STOPPED",
            Self::TimedOut => "TIMED_OUT",
        }
    }

    /// Whether this status maps to a successful exit.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown build status '{s}'"))
    }
}

/// Where a finished build stored its artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    /// Raw location as reported by the service (usually an S3 ARN)
    pub location: String,
}

/// Log coordinates reported on a build record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildLogs {
    /// Log group, absent until the build reaches a running phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    /// Log stream, absent until the build reaches a running phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_name: Option<String>,
    /// Console link to the logs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep_link: Option<String>,
}

impl BuildLogs {
    /// Resolve to a descriptor when both group and stream are known.
    #[must_use]
    pub fn descriptor(&self) -> Option<LogDescriptor> {
        match (&self.group_name, &self.stream_name) {
            (Some(group), Some(stream)) if !group.is_empty() && !stream.is_empty() => {
                Some(LogDescriptor::new(group.clone(), stream.clone()))
            }
            _ => None,
        }
    }
}

/// Snapshot of a build record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    /// Build identifier
    pub build_id: String,
    /// Status at the time of the fetch
    pub status: BuildStatus,
    /// Artifact location, when the build produced any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ArtifactLocation>,
    /// Log coordinates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<BuildLogs>,
    /// Phase the build was in when fetched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<String>,
}

impl BuildResult {
    /// Artifact location, ignoring empty strings.
    #[must_use]
    pub fn artifact_location(&self) -> Option<&str> {
        self.artifacts
            .as_ref()
            .map(|a| a.location.as_str())
            .filter(|l| !l.is_empty())
    }
}

/// Resolved log group and stream for a build.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogDescriptor {
    /// Log group name
    pub group: String,
    /// Log stream name
    pub stream: String,
}

impl LogDescriptor {
    /// Create a new descriptor.
    #[must_use]
    pub fn new(group: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            stream: stream.into(),
        }
    }
}

/// One log line emitted by the remote build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Raw message, usually newline terminated
    pub message: String,
}

impl LogEvent {
    /// Create a new event.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One page of log events plus the forward token to resume from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogPage {
    /// Events in arrival order
    pub events: Vec<LogEvent>,
    /// Opaque forward token; unchanged from the request token once caught up
    pub next_token: Option<String>,
}

/// How produced artifacts are laid out in the artifact bucket.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PackagingMode {
    /// Loose directory tree under a key prefix
    None,
    /// A single zip archive
    #[default]
    Zip,
    /// Anything else; reported and skipped
    Unsupported(String),
}

impl FromStr for PackagingMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "NONE" => Self::None,
            "ZIP" => Self::Zip,
            _ => Self::Unsupported(s.to_string()),
        })
    }
}

impl fmt::Display for PackagingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("NONE"),
            Self::Zip => f.write_str("ZIP"),
            Self::Unsupported(raw) => f.write_str(raw),
        }
    }
}

/// A bucket and key pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct S3Location {
    /// Bucket name
    pub bucket: String,
    /// Object key or key prefix, without a leading slash
    pub key: String,
}

impl S3Location {
    /// Create a new location.
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse `arn:<partition>:s3:::bucket/key`, `s3://bucket/key` or
    /// `bucket/key`.
    ///
    /// Returns `None` when either component is empty.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let rest = if let Some(arn) = raw.strip_prefix("arn:") {
            let (partition, rest) = arn.split_once(":s3:::")?;
            if partition.is_empty() || partition.contains(':') {
                return None;
            }
            rest
        } else {
            raw.strip_prefix("s3://").unwrap_or(raw)
        };
        let (bucket, key) = rest.split_once('/')?;
        let key = key.trim_start_matches('/');
        if bucket.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self::new(bucket, key))
    }
}

impl fmt::Display for S3Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}
