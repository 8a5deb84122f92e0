//! Amazon S3 storage: source upload, record archival and artifact download

use crate::archive::extract_zip;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use buildrelay_core::{
    ArtifactFetcher, Error, PackagingMode, ResultArchive, Result, S3Location, SourceStore,
};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Concurrent object downloads when syncing a prefix.
const SYNC_CONCURRENCY: usize = 8;

/// S3-backed source store, result archive and artifact fetcher.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    /// Wrap an S3 client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn put(
        &self,
        contents: Bytes,
        location: &S3Location,
        content_type: &str,
    ) -> Result<Option<String>> {
        let output = self
            .client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .content_type(content_type)
            .body(ByteStream::from(contents))
            .send()
            .await
            .map_err(|e| Error::remote("PutObject", DisplayErrorContext(&e).to_string()))?;
        Ok(output.version_id().map(String::from))
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::remote("GetObject", DisplayErrorContext(&e).to_string()))?;
        let body = output
            .body
            .collect()
            .await
            .map_err(|e| Error::remote("GetObject", e.to_string()))?;
        Ok(body.into_bytes())
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation = None;
        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation)
                .send()
                .await
                .map_err(|e| Error::remote("ListObjectsV2", DisplayErrorContext(&e).to_string()))?;
            keys.extend(output.contents().iter().filter_map(|o| o.key()).map(String::from));

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        Ok(keys)
    }

    async fn fetch_zip(&self, location: &S3Location, dest_dir: &Path) -> Result<PathBuf> {
        let data = self.get(&location.bucket, &location.key).await?;
        debug!(location = %location, bytes = data.len(), "Downloaded artifact archive");

        let dest = dest_dir.to_path_buf();
        let files = tokio::task::spawn_blocking(move || extract_zip(&data, &dest))
            .await
            .map_err(|e| Error::remote("ExtractArtifacts", e.to_string()))??;
        info!(location = %location, files, dest = %dest_dir.display(), "Extracted artifacts");
        Ok(dest_dir.to_path_buf())
    }

    async fn sync_prefix(&self, location: &S3Location, dest_dir: &Path) -> Result<PathBuf> {
        let prefix = format!("{}/", location.key.trim_end_matches('/'));
        let keys = self.list_keys(&location.bucket, &prefix).await?;
        let targets: Vec<(String, PathBuf)> = keys
            .into_iter()
            .filter_map(|key| {
                let target = relative_path(&prefix, &key)?;
                Some((key, dest_dir.join(target)))
            })
            .collect();

        let files = targets.len();
        stream::iter(targets)
            .map(|(key, target)| async move {
                let data = self.get(&location.bucket, &key).await?;
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&target, &data).await?;
                Ok::<_, Error>(())
            })
            .buffer_unordered(SYNC_CONCURRENCY)
            .try_collect::<Vec<()>>()
            .await?;

        info!(location = %location, files, dest = %dest_dir.display(), "Synced artifacts");
        Ok(dest_dir.to_path_buf())
    }
}

/// Path of `key` below `prefix`, or `None` for directory markers and keys
/// that would leave the destination.
fn relative_path(prefix: &str, key: &str) -> Option<PathBuf> {
    let rest = key.strip_prefix(prefix)?;
    if rest.is_empty() || rest.ends_with('/') {
        return None;
    }
    let path = PathBuf::from(rest);
    path.components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then_some(path)
}

#[async_trait]
impl SourceStore for S3Store {
    async fn upload_archive(&self, archive: Bytes, location: &S3Location) -> Result<Option<String>> {
        let version = self.put(archive, location, "application/zip").await?;
        debug!(location = %location, version = ?version, "Uploaded source archive");
        Ok(version)
    }
}

#[async_trait]
impl ResultArchive for S3Store {
    async fn archive_result(&self, contents: Bytes, destination: &S3Location) -> Result<()> {
        self.put(contents, destination, "application/json").await?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactFetcher for S3Store {
    async fn fetch_artifact(
        &self,
        location: &S3Location,
        mode: &PackagingMode,
        dest_dir: &Path,
    ) -> Result<PathBuf> {
        match mode {
            PackagingMode::Zip => self.fetch_zip(location, dest_dir).await,
            PackagingMode::None => self.sync_prefix(location, dest_dir).await,
            PackagingMode::Unsupported(mode) => Err(Error::remote(
                "FetchArtifacts",
                format!("unsupported packaging '{mode}'"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_strips_prefix() {
        assert_eq!(
            relative_path("app/out/", "app/out/reports/junit.xml"),
            Some(PathBuf::from("reports/junit.xml"))
        );
    }

    #[test]
    fn test_relative_path_skips_directory_markers() {
        assert_eq!(relative_path("app/out/", "app/out/reports/"), None);
        assert_eq!(relative_path("app/out/", "app/out/"), None);
    }

    #[test]
    fn test_relative_path_rejects_traversal() {
        assert_eq!(relative_path("app/", "app/../../etc/passwd"), None);
        assert_eq!(relative_path("app/", "app//abs"), None);
    }

    #[test]
    fn test_relative_path_requires_prefix() {
        assert_eq!(relative_path("app/", "other/file"), None);
    }

    #[test]
    fn test_unsupported_packaging_is_refused_locally() {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .build();
        let store = S3Store::new(Client::from_conf(config));
        let dest = tempfile::tempdir().unwrap();

        let err = tokio_test::block_on(store.fetch_artifact(
            &S3Location::new("artifacts", "app/output.tar"),
            &PackagingMode::Unsupported("TAR".into()),
            dest.path(),
        ))
        .unwrap_err();

        assert!(matches!(err, Error::Remote { operation: "FetchArtifacts", .. }));
    }
}
