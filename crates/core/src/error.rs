//! Error types for the build lifecycle.
//!
//! Only fatal conditions are errors. Degraded best-effort steps (result
//! archival, artifact download) are reported as [`Warning`] values and never
//! change the exit status of a run.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for buildrelay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors that abort a relay run.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Required configuration is missing; raised before any remote call.
    #[error("Missing required configuration: {}", missing.join(", "))]
    #[diagnostic(
        code(buildrelay::precondition),
        help("Set the listed options on the command line or via their BUILDRELAY_* environment variables")
    )]
    Precondition {
        /// Every missing item, in the order they were checked
        missing: Vec<String>,
    },

    /// The remote service rejected the build start request.
    #[error("Build submission rejected: {message}")]
    #[diagnostic(
        code(buildrelay::submission),
        help("Check the project name, override values and credentials; the build was not started")
    )]
    Submission {
        /// The rejection reason reported by the service
        message: String,
    },

    /// A remote call in the polling or resolution phase failed.
    #[error("{operation} failed: {message}")]
    #[diagnostic(code(buildrelay::remote))]
    Remote {
        /// The remote operation that failed
        operation: &'static str,
        /// The error message
        message: String,
    },

    /// The build finished with a non-success status.
    #[error("Build {build_id} finished with status {status}")]
    #[diagnostic(code(buildrelay::build_failed))]
    BuildFailed {
        /// Identifier of the failed build
        build_id: String,
        /// Terminal status name, e.g. `FAILED`
        status: String,
    },

    /// Polling was interrupted before the build completed.
    #[error("Interrupted while waiting for build {build_id}")]
    #[diagnostic(
        code(buildrelay::cancelled),
        help("The remote build keeps running unless --stop-on-cancel is set")
    )]
    Cancelled {
        /// Identifier of the build being polled
        build_id: String,
    },

    /// The request template could not be interpreted.
    #[error("Invalid request template: {message}")]
    #[diagnostic(
        code(buildrelay::template),
        help("The template must be a JSON object shaped like a StartBuild request")
    )]
    Template {
        /// The error message
        message: String,
    },

    /// An environment name pattern is not a valid regular expression.
    #[error("Invalid environment pattern '{pattern}': {source}")]
    #[diagnostic(code(buildrelay::pattern))]
    Pattern {
        /// The offending pattern
        pattern: String,
        /// The regex compilation error
        #[source]
        source: regex::Error,
    },

    /// Wrapped I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(buildrelay::io))]
    Io(#[from] std::io::Error),

    /// Wrapped JSON error.
    #[error("JSON error: {0}")]
    #[diagnostic(code(buildrelay::json))]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a precondition error for the given missing items.
    #[must_use]
    pub fn precondition<I, S>(missing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Precondition {
            missing: missing.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a submission error.
    #[must_use]
    pub fn submission(message: impl Into<String>) -> Self {
        Self::Submission {
            message: message.into(),
        }
    }

    /// Create a remote call error.
    #[must_use]
    pub fn remote(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Remote {
            operation,
            message: message.into(),
        }
    }

    /// Create a template error.
    #[must_use]
    pub fn template(message: impl Into<String>) -> Self {
        Self::Template {
            message: message.into(),
        }
    }
}

/// Which best-effort step produced a [`Warning`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Two overrides share a name but carry different values
    OverrideConflict,
    /// Uploading the build record failed
    Archive,
    /// Downloading or unpacking artifacts failed or was skipped
    Artifact,
    /// Stopping the remote build after cancellation failed
    Stop,
}

/// A non-fatal problem surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Step that produced the warning
    pub kind: WarningKind,
    /// Human readable description
    pub message: String,
}

impl Warning {
    /// Create a new warning.
    #[must_use]
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_lists_every_missing_item() {
        let err = Error::precondition(["source bucket", "source key"]);
        assert_eq!(
            err.to_string(),
            "Missing required configuration: source bucket, source key"
        );
    }

    #[test]
    fn test_build_failed_carries_status_name() {
        let err = Error::BuildFailed {
            build_id: "proj:1234".to_string(),
            status: "TIMED_OUT".to_string(),
        };
        assert!(err.to_string().contains("TIMED_OUT"));
    }

    #[test]
    fn test_diagnostic_codes() {
        let err = Error::submission("AccessDenied");
        assert_eq!(
            err.code().map(|c| c.to_string()),
            Some("buildrelay::submission".to_string())
        );
    }
}
