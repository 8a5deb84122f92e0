//! Incremental log relay built on the forward pagination token.
//!
//! The cursor is an explicit value owned by the poll loop and passed into
//! every [`LogTailer::tail`] call. A fetch is drained once the token returned
//! by the service equals the token the fetch was made with.

use crate::error::Result;
use crate::reporter::{Reporter, WaitingReason};
use crate::service::{BuildService, LogSource};
use crate::types::{BuildHandle, LogDescriptor};
use tracing::{debug, trace};

/// Observable state of a [`LogCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    /// No events have been relayed yet
    AwaitingStream,
    /// Events were relayed and the last fetch returned a new token
    Streaming,
    /// Events were relayed and the last fetch returned the same token
    Drained,
}

/// Position in a build's log stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogCursor {
    descriptor: Option<LogDescriptor>,
    next_token: Option<String>,
    previous_token: Option<String>,
    started: bool,
    last_notice: Option<WaitingReason>,
}

impl LogCursor {
    /// A cursor positioned before the first event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TailState {
        if !self.started {
            TailState::AwaitingStream
        } else if self.next_token == self.previous_token {
            TailState::Drained
        } else {
            TailState::Streaming
        }
    }

    /// Whether any events have been relayed.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Token the next fetch resumes from.
    #[must_use]
    pub fn next_token(&self) -> Option<&str> {
        self.next_token.as_deref()
    }

    /// Log group and stream, once known.
    #[must_use]
    pub fn descriptor(&self) -> Option<&LogDescriptor> {
        self.descriptor.as_ref()
    }

    /// Record a waiting condition, returning whether it is new.
    fn note_waiting(&mut self, reason: WaitingReason) -> bool {
        if self.started || self.last_notice == Some(reason) {
            return false;
        }
        self.last_notice = Some(reason);
        true
    }

    /// Advance to `token`. A missing token keeps the current position.
    fn advance(&mut self, token: Option<String>) {
        let token = token.or_else(|| self.next_token.clone());
        self.previous_token = std::mem::replace(&mut self.next_token, token);
    }

    fn is_caught_up(&self) -> bool {
        self.next_token == self.previous_token
    }
}

/// What one [`LogTailer::tail`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TailCycle {
    /// Number of event fetches made
    pub fetches: usize,
    /// Number of events relayed
    pub events: usize,
}

/// Relays new log events to a [`Reporter`].
pub struct LogTailer<'a> {
    builds: &'a dyn BuildService,
    logs: &'a dyn LogSource,
    reporter: &'a dyn Reporter,
}

impl std::fmt::Debug for LogTailer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogTailer").finish_non_exhaustive()
    }
}

impl<'a> LogTailer<'a> {
    /// Create a tailer over the given collaborators.
    #[must_use]
    pub fn new(
        builds: &'a dyn BuildService,
        logs: &'a dyn LogSource,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            builds,
            logs,
            reporter,
        }
    }

    /// Relay every event available now, fetching until the token settles.
    ///
    /// A build without a log stream yet is not an error: the call returns
    /// without touching the token.
    ///
    /// # Errors
    /// Propagates any failed descriptor or event fetch.
    pub async fn tail(&self, handle: &BuildHandle, cursor: &mut LogCursor) -> Result<TailCycle> {
        let mut cycle = TailCycle::default();

        let Some(descriptor) = self.builds.log_descriptor(handle).await? else {
            if cursor.note_waiting(WaitingReason::NoLogStream) {
                self.reporter.waiting(handle, WaitingReason::NoLogStream);
            }
            trace!(build_id = %handle, "Log stream not available yet");
            return Ok(cycle);
        };

        if cursor.descriptor.as_ref() != Some(&descriptor) {
            debug!(
                build_id = %handle,
                group = %descriptor.group,
                stream = %descriptor.stream,
                "Resolved log stream"
            );
            cursor.descriptor = Some(descriptor.clone());
        }

        loop {
            let page = self
                .logs
                .fetch_log_events(&descriptor, cursor.next_token())
                .await?;
            cycle.fetches += 1;

            if page.events.is_empty() {
                if cursor.note_waiting(WaitingReason::EmptyStream) {
                    self.reporter.waiting(handle, WaitingReason::EmptyStream);
                }
            } else {
                if !cursor.started {
                    cursor.started = true;
                    self.reporter.stream_started(&descriptor);
                }
                for event in &page.events {
                    self.reporter.log_line(&event.message);
                }
                cycle.events += page.events.len();
            }

            cursor.advance(page.next_token);
            if cursor.is_caught_up() {
                break;
            }
        }

        trace!(
            build_id = %handle,
            fetches = cycle.fetches,
            events = cycle.events,
            "Log stream drained"
        );
        Ok(cycle)
    }
}
