//! In-memory collaborator fakes.
//!
//! Available to this crate's unit tests and, through the `testing` feature,
//! to downstream test suites.

use crate::error::{Error, Result, Warning};
use crate::reporter::{Reporter, WaitingReason};
use crate::service::{ArtifactFetcher, BuildService, LogSource, ResultArchive, SourceStore};
use crate::types::{
    BuildHandle, BuildLogs, BuildRequest, BuildResult, BuildStatus, LogDescriptor, LogEvent,
    LogPage, PackagingMode, S3Location,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build a log page from messages and a forward token.
#[must_use]
pub fn page<'a>(messages: &[&str], token: impl Into<Option<&'a str>>) -> LogPage {
    LogPage {
        events: messages.iter().map(|m| LogEvent::new(*m)).collect(),
        next_token: token.into().map(String::from),
    }
}

/// A scripted build service.
///
/// `is_build_complete` answers from a queue and reports `true` once the
/// queue is exhausted.
#[derive(Debug)]
pub struct FakeBuildService {
    build_id: String,
    reject_with: Option<String>,
    completion: Mutex<VecDeque<bool>>,
    descriptors: Mutex<VecDeque<Option<LogDescriptor>>>,
    record: Mutex<BuildResult>,
    submitted: Mutex<Vec<BuildRequest>>,
    completion_checks: Mutex<usize>,
    stopped: Mutex<Vec<BuildHandle>>,
}

impl Default for FakeBuildService {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBuildService {
    /// A service whose build succeeds immediately and never has logs.
    #[must_use]
    pub fn new() -> Self {
        let build_id = "app:0f3c9a1e".to_string();
        Self {
            record: Mutex::new(BuildResult {
                build_id: build_id.clone(),
                status: BuildStatus::Succeeded,
                artifacts: None,
                logs: None,
                current_phase: Some("COMPLETED".to_string()),
            }),
            build_id,
            reject_with: None,
            completion: Mutex::new(VecDeque::new()),
            descriptors: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            completion_checks: Mutex::new(0),
            stopped: Mutex::new(Vec::new()),
        }
    }

    /// Reject every start request with `message`.
    #[must_use]
    pub fn rejecting(mut self, message: impl Into<String>) -> Self {
        self.reject_with = Some(message.into());
        self
    }

    /// Answer completion checks from `answers`, then `true`.
    #[must_use]
    pub fn with_completion(self, answers: impl IntoIterator<Item = bool>) -> Self {
        *lock(&self.completion) = answers.into_iter().collect();
        self
    }

    /// Always report `descriptor` as the build's log stream.
    #[must_use]
    pub fn with_descriptor(self, descriptor: LogDescriptor) -> Self {
        lock(&self.record).logs = Some(BuildLogs {
            group_name: Some(descriptor.group),
            stream_name: Some(descriptor.stream),
            deep_link: None,
        });
        self
    }

    /// Answer descriptor lookups from `answers`, then from the record.
    #[must_use]
    pub fn with_descriptor_sequence(
        self,
        answers: impl IntoIterator<Item = Option<LogDescriptor>>,
    ) -> Self {
        *lock(&self.descriptors) = answers.into_iter().collect();
        self
    }

    /// Set the terminal status.
    #[must_use]
    pub fn with_status(self, status: BuildStatus) -> Self {
        lock(&self.record).status = status;
        self
    }

    /// Set the artifact location on the record.
    #[must_use]
    pub fn with_artifacts(self, location: impl Into<String>) -> Self {
        lock(&self.record).artifacts = Some(crate::types::ArtifactLocation {
            location: location.into(),
        });
        self
    }

    /// Requests passed to `start_build`.
    #[must_use]
    pub fn submitted(&self) -> Vec<BuildRequest> {
        lock(&self.submitted).clone()
    }

    /// Number of completion checks made.
    #[must_use]
    pub fn completion_checks(&self) -> usize {
        *lock(&self.completion_checks)
    }

    /// Builds passed to `stop_build`.
    #[must_use]
    pub fn stopped(&self) -> Vec<BuildHandle> {
        lock(&self.stopped).clone()
    }
}

#[async_trait]
impl BuildService for FakeBuildService {
    async fn start_build(&self, request: &BuildRequest) -> Result<BuildHandle> {
        if let Some(message) = &self.reject_with {
            return Err(Error::submission(message.clone()));
        }
        lock(&self.submitted).push(request.clone());
        Ok(BuildHandle::new(self.build_id.clone()))
    }

    async fn is_build_complete(&self, _handle: &BuildHandle) -> Result<bool> {
        *lock(&self.completion_checks) += 1;
        Ok(lock(&self.completion).pop_front().unwrap_or(true))
    }

    async fn get_build_record(&self, _handle: &BuildHandle) -> Result<BuildResult> {
        Ok(lock(&self.record).clone())
    }

    async fn log_descriptor(&self, handle: &BuildHandle) -> Result<Option<LogDescriptor>> {
        if let Some(answer) = lock(&self.descriptors).pop_front() {
            return Ok(answer);
        }
        let record = self.get_build_record(handle).await?;
        Ok(record.logs.as_ref().and_then(BuildLogs::descriptor))
    }

    async fn stop_build(&self, handle: &BuildHandle) -> Result<()> {
        lock(&self.stopped).push(handle.clone());
        Ok(())
    }
}

/// A scripted log source.
///
/// Pages are served in order. Once the script runs out, every fetch returns
/// an empty page carrying the requested token, i.e. the stream is caught up.
#[derive(Debug, Default)]
pub struct FakeLogSource {
    pages: Mutex<VecDeque<LogPage>>,
    requests: Mutex<Vec<Option<String>>>,
}

impl FakeLogSource {
    /// Serve `pages` in order.
    #[must_use]
    pub fn new(pages: impl IntoIterator<Item = LogPage>) -> Self {
        Self {
            pages: Mutex::new(pages.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Append pages to the script.
    pub fn push(&self, pages: impl IntoIterator<Item = LogPage>) {
        lock(&self.pages).extend(pages);
    }

    /// Number of fetches made.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Tokens passed to each fetch.
    #[must_use]
    pub fn requested_tokens(&self) -> Vec<Option<String>> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl LogSource for FakeLogSource {
    async fn fetch_log_events(
        &self,
        _descriptor: &LogDescriptor,
        token: Option<&str>,
    ) -> Result<LogPage> {
        lock(&self.requests).push(token.map(String::from));
        Ok(lock(&self.pages).pop_front().unwrap_or_else(|| LogPage {
            events: Vec::new(),
            next_token: token.map(String::from),
        }))
    }
}

/// One call recorded by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    /// `submitted`
    Submitted(String),
    /// `waiting`
    Waiting(WaitingReason),
    /// `stream_started`
    StreamStarted,
    /// `log_line`
    Line(String),
    /// `warning`
    Warning(Warning),
    /// `artifacts_fetched`
    ArtifactsFetched(PathBuf),
    /// `finished`
    Finished(BuildStatus),
}

/// A reporter that records every call.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl RecordingReporter {
    /// Every recorded call, in order.
    #[must_use]
    pub fn events(&self) -> Vec<ReportEvent> {
        lock(&self.events).clone()
    }

    /// Relayed log lines, in order.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ReportEvent::Line(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    /// Waiting notices, in order.
    #[must_use]
    pub fn waiting_notices(&self) -> Vec<WaitingReason> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ReportEvent::Waiting(reason) => Some(reason),
                _ => None,
            })
            .collect()
    }

    /// Number of stream banners printed.
    #[must_use]
    pub fn banners(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ReportEvent::StreamStarted))
            .count()
    }

    /// Reported warnings, in order.
    #[must_use]
    pub fn warnings(&self) -> Vec<Warning> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ReportEvent::Warning(w) => Some(w),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: ReportEvent) {
        lock(&self.events).push(event);
    }
}

impl Reporter for RecordingReporter {
    fn submitted(&self, handle: &BuildHandle) {
        self.record(ReportEvent::Submitted(handle.build_id.clone()));
    }

    fn waiting(&self, _handle: &BuildHandle, reason: WaitingReason) {
        self.record(ReportEvent::Waiting(reason));
    }

    fn stream_started(&self, _descriptor: &LogDescriptor) {
        self.record(ReportEvent::StreamStarted);
    }

    fn log_line(&self, message: &str) {
        self.record(ReportEvent::Line(message.to_string()));
    }

    fn warning(&self, warning: &Warning) {
        self.record(ReportEvent::Warning(warning.clone()));
    }

    fn artifacts_fetched(&self, dest: &Path) {
        self.record(ReportEvent::ArtifactsFetched(dest.to_path_buf()));
    }

    fn finished(&self, result: &BuildResult) {
        self.record(ReportEvent::Finished(result.status));
    }
}

/// An object store that keeps uploads in memory.
#[derive(Debug)]
pub struct MemoryStore {
    version: Option<String>,
    fail_with: Option<String>,
    objects: Mutex<Vec<(S3Location, Bytes)>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            version: Some("v-0001".to_string()),
            fail_with: None,
            objects: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryStore {
    /// A store that returns no object version, like an unversioned bucket.
    #[must_use]
    pub fn unversioned() -> Self {
        Self {
            version: None,
            ..Self::default()
        }
    }

    /// A store whose writes fail with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::default()
        }
    }

    /// Objects written so far.
    #[must_use]
    pub fn objects(&self) -> Vec<(S3Location, Bytes)> {
        lock(&self.objects).clone()
    }

    fn put(&self, contents: Bytes, location: &S3Location) -> Result<()> {
        if let Some(message) = &self.fail_with {
            return Err(Error::remote("PutObject", message.clone()));
        }
        lock(&self.objects).push((location.clone(), contents));
        Ok(())
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn upload_archive(&self, archive: Bytes, location: &S3Location) -> Result<Option<String>> {
        self.put(archive, location)?;
        Ok(self.version.clone())
    }
}

#[async_trait]
impl ResultArchive for MemoryStore {
    async fn archive_result(&self, contents: Bytes, destination: &S3Location) -> Result<()> {
        self.put(contents, destination)
    }
}

/// An artifact fetcher that records calls instead of downloading.
#[derive(Debug, Default)]
pub struct RecordingFetcher {
    fail_with: Option<String>,
    calls: Mutex<Vec<(S3Location, PackagingMode, PathBuf)>>,
}

impl RecordingFetcher {
    /// A fetcher whose downloads fail with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Calls made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<(S3Location, PackagingMode, PathBuf)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl ArtifactFetcher for RecordingFetcher {
    async fn fetch_artifact(
        &self,
        location: &S3Location,
        mode: &PackagingMode,
        dest_dir: &Path,
    ) -> Result<PathBuf> {
        lock(&self.calls).push((location.clone(), mode.clone(), dest_dir.to_path_buf()));
        match &self.fail_with {
            Some(message) => Err(Error::remote("GetObject", message.clone())),
            None => Ok(dest_dir.to_path_buf()),
        }
    }
}
