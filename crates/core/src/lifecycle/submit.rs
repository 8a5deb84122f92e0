//! Build submission.

use crate::error::{Error, Result};
use crate::reporter::Reporter;
use crate::service::BuildService;
use crate::types::{BuildHandle, BuildRequest};
use tracing::{debug, info};

/// Start a build. Any failure is reported as [`Error::Submission`]; there is
/// no retry.
///
/// # Errors
/// Returns [`Error::Submission`] when the service rejects the request or the
/// call itself fails.
pub async fn submit(
    builds: &dyn BuildService,
    request: &BuildRequest,
    reporter: &dyn Reporter,
) -> Result<BuildHandle> {
    debug!(
        project = request.project_name.as_deref().unwrap_or("<default>"),
        source_version = %request.source_version,
        overrides = request.overrides.len(),
        extra_fields = request.extra_fields.len(),
        "Starting build"
    );

    let handle = builds.start_build(request).await.map_err(|e| match e {
        Error::Submission { .. } => e,
        other => Error::submission(other.to_string()),
    })?;

    info!(build_id = %handle, "Build started");
    reporter.submitted(&handle);
    Ok(handle)
}
