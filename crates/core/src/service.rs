//! Remote collaborators consumed by the lifecycle.
//!
//! Each trait covers one concern so tests can fake them independently. The
//! AWS implementations live in `buildrelay-aws`.

use crate::error::Result;
use crate::types::{
    BuildHandle, BuildRequest, BuildResult, LogDescriptor, LogPage, PackagingMode, S3Location,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

/// The remote build service.
#[async_trait]
pub trait BuildService: Send + Sync {
    /// Start a build. Rejections must surface as [`crate::Error::Submission`].
    async fn start_build(&self, request: &BuildRequest) -> Result<BuildHandle>;

    /// Whether the build has reached a terminal state.
    async fn is_build_complete(&self, handle: &BuildHandle) -> Result<bool>;

    /// Fetch the current build record.
    async fn get_build_record(&self, handle: &BuildHandle) -> Result<BuildResult>;

    /// Log group and stream, once the build has started writing logs.
    async fn log_descriptor(&self, handle: &BuildHandle) -> Result<Option<LogDescriptor>> {
        let record = self.get_build_record(handle).await?;
        Ok(record.logs.as_ref().and_then(|logs| logs.descriptor()))
    }

    /// Ask the service to stop a running build.
    async fn stop_build(&self, handle: &BuildHandle) -> Result<()>;
}

/// Paginated access to build log events.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Fetch the events after `token`, or from the head of the stream when
    /// `token` is `None`.
    async fn fetch_log_events(
        &self,
        descriptor: &LogDescriptor,
        token: Option<&str>,
    ) -> Result<LogPage>;
}

/// Storage for the packaged source tree.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Upload the archive and return the object version, if the store
    /// versions objects.
    async fn upload_archive(&self, archive: Bytes, location: &S3Location) -> Result<Option<String>>;
}

/// Destination for serialized build records.
#[async_trait]
pub trait ResultArchive: Send + Sync {
    /// Store `contents` at `destination`.
    async fn archive_result(&self, contents: Bytes, destination: &S3Location) -> Result<()>;
}

/// Downloads produced artifacts.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Fetch the artifacts at `location` into `dest_dir`, returning the
    /// directory the artifacts ended up in. `mode` is never
    /// [`PackagingMode::Unsupported`].
    async fn fetch_artifact(
        &self,
        location: &S3Location,
        mode: &PackagingMode,
        dest_dir: &Path,
    ) -> Result<PathBuf>;
}
