//! User-facing progress output.
//!
//! The lifecycle never prints directly. Everything a user should see goes
//! through a [`Reporter`], which keeps the core testable and lets the binary
//! choose the presentation.

use crate::error::Warning;
use crate::types::{BuildHandle, BuildResult, LogDescriptor};
use std::path::Path;

/// Why the tailer is still waiting for log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitingReason {
    /// The build record has no log group or stream yet
    NoLogStream,
    /// The stream exists but has not produced any events
    EmptyStream,
}

/// Sink for progress output.
pub trait Reporter: Send + Sync {
    /// A build was accepted by the service.
    fn submitted(&self, handle: &BuildHandle);

    /// The build has not produced logs yet.
    fn waiting(&self, handle: &BuildHandle, reason: WaitingReason);

    /// The first log events arrived.
    fn stream_started(&self, descriptor: &LogDescriptor);

    /// One relayed log message, verbatim.
    fn log_line(&self, message: &str);

    /// A non-fatal problem.
    fn warning(&self, warning: &Warning);

    /// Artifacts were downloaded.
    fn artifacts_fetched(&self, dest: &Path);

    /// The terminal build record was resolved.
    fn finished(&self, result: &BuildResult);
}
