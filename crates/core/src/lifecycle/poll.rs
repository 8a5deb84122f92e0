//! Completion polling.

use super::tail::{LogCursor, LogTailer};
use crate::error::{Error, Result, Warning, WarningKind};
use crate::reporter::Reporter;
use crate::service::BuildService;
use crate::types::BuildHandle;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Polls a build until it completes, relaying logs every cycle.
#[derive(Debug, Clone)]
pub struct CompletionPoller {
    interval: Duration,
    stop_on_cancel: bool,
}

impl CompletionPoller {
    /// Create a poller that sleeps `interval` between cycles.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stop_on_cancel: false,
        }
    }

    /// Ask the service to stop the build when polling is cancelled.
    #[must_use]
    pub fn stop_on_cancel(mut self, stop: bool) -> Self {
        self.stop_on_cancel = stop;
        self
    }

    /// Poll until the build completes, then flush trailing log events.
    ///
    /// Returns the number of poll cycles.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] when `cancel` fires first, or the first
    /// failed remote call.
    pub async fn wait(
        &self,
        builds: &dyn BuildService,
        tailer: &LogTailer<'_>,
        reporter: &dyn Reporter,
        handle: &BuildHandle,
        cursor: &mut LogCursor,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let mut cycles = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(builds, reporter, handle).await);
            }
            cycles += 1;

            tailer.tail(handle, cursor).await?;
            if builds.is_build_complete(handle).await? {
                tailer.tail(handle, cursor).await?;
                info!(build_id = %handle, cycles, "Build complete");
                return Ok(cycles);
            }

            debug!(build_id = %handle, cycle = cycles, state = ?cursor.state(), "Build still running");
            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                () = cancel.cancelled() => {
                    return Err(self.cancelled(builds, reporter, handle).await);
                }
            }
        }
    }

    async fn cancelled(
        &self,
        builds: &dyn BuildService,
        reporter: &dyn Reporter,
        handle: &BuildHandle,
    ) -> Error {
        warn!(build_id = %handle, "Polling cancelled");
        if self.stop_on_cancel {
            match builds.stop_build(handle).await {
                Ok(()) => info!(build_id = %handle, "Requested build stop"),
                Err(e) => reporter.warning(&Warning::new(
                    WarningKind::Stop,
                    format!("Could not stop build {handle}: {e}"),
                )),
            }
        }
        Error::Cancelled {
            build_id: handle.build_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBuildService, FakeLogSource, RecordingReporter, page};
    use crate::types::LogDescriptor;

    fn descriptor() -> LogDescriptor {
        LogDescriptor::new("/aws/codebuild/app", "stream-1")
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_complete_and_flushes() {
        let builds = FakeBuildService::new()
            .with_descriptor(descriptor())
            .with_completion([false, false, true]);
        let logs = FakeLogSource::new([page(&["a"], "t1"), page(&[], "t1")]);
        let reporter = RecordingReporter::default();
        let tailer = LogTailer::new(&builds, &logs, &reporter);
        let mut cursor = LogCursor::new();

        let cycles = CompletionPoller::new(Duration::from_secs(10))
            .wait(
                &builds,
                &tailer,
                &reporter,
                &BuildHandle::new("b:1"),
                &mut cursor,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(cycles, 3);
        assert_eq!(builds.completion_checks(), 3);
        assert_eq!(reporter.lines(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_tail_catches_trailing_events() {
        let builds = FakeBuildService::new()
            .with_descriptor(descriptor())
            .with_completion([true]);
        // The last two pages only become visible after the completion check.
        let logs = FakeLogSource::new([
            page(&["early"], "t1"),
            page(&[], "t1"),
            page(&["late"], "t2"),
            page(&[], "t2"),
        ]);
        let reporter = RecordingReporter::default();
        let tailer = LogTailer::new(&builds, &logs, &reporter);
        let mut cursor = LogCursor::new();

        CompletionPoller::new(Duration::from_secs(10))
            .wait(
                &builds,
                &tailer,
                &reporter,
                &BuildHandle::new("b:1"),
                &mut cursor,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(logs.fetch_count(), 4);
        assert_eq!(reporter.lines(), vec!["early", "late"]);
        assert_eq!(builds.completion_checks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_polling() {
        let builds = FakeBuildService::new().with_completion([false; 100]);
        let logs = FakeLogSource::new([]);
        let reporter = RecordingReporter::default();
        let tailer = LogTailer::new(&builds, &logs, &reporter);
        let mut cursor = LogCursor::new();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            trigger.cancel();
        });

        let err = CompletionPoller::new(Duration::from_secs(10))
            .wait(
                &builds,
                &tailer,
                &reporter,
                &BuildHandle::new("b:1"),
                &mut cursor,
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled { .. }));
        assert_eq!(builds.completion_checks(), 3);
        assert!(builds.stopped().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_on_cancel_stops_remote_build() {
        let builds = FakeBuildService::new().with_completion([false; 10]);
        let logs = FakeLogSource::new([]);
        let reporter = RecordingReporter::default();
        let tailer = LogTailer::new(&builds, &logs, &reporter);
        let mut cursor = LogCursor::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = CompletionPoller::new(Duration::from_secs(10))
            .stop_on_cancel(true)
            .wait(
                &builds,
                &tailer,
                &reporter,
                &BuildHandle::new("b:1"),
                &mut cursor,
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled { .. }));
        assert_eq!(builds.stopped(), vec![BuildHandle::new("b:1")]);
        assert_eq!(builds.completion_checks(), 0);
    }
}
