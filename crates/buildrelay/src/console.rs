//! Terminal output of a relay run
//!
//! Relayed build output goes to stdout verbatim; progress notices, warnings
//! and the final summary go to stderr.

use buildrelay_core::lifecycle::BuildOutcome;
use buildrelay_core::{BuildHandle, BuildResult, LogDescriptor, Reporter, WaitingReason, Warning};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

const DIVIDER: &str = "----------------------------------------------------------------";

type Sink = Mutex<Box<dyn Write + Send>>;

/// [`Reporter`] writing to a pair of output streams.
pub struct ConsoleReporter {
    out: Sink,
    err: Sink,
}

impl std::fmt::Debug for ConsoleReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleReporter").finish_non_exhaustive()
    }
}

impl ConsoleReporter {
    /// Report to the process stdout and stderr.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }

    /// Report to arbitrary writers.
    pub fn new(out: impl Write + Send + 'static, err: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
            err: Mutex::new(Box::new(err)),
        }
    }

    fn emit(sink: &Sink, text: &str) {
        let mut w = sink.lock().unwrap_or_else(PoisonError::into_inner);
        // A closed terminal must not abort the run.
        let _ = w.write_all(text.as_bytes()).and_then(|()| w.flush());
    }

    fn notice(&self, text: &str) {
        Self::emit(&self.err, &format!("{text}\n"));
    }
}

impl Reporter for ConsoleReporter {
    fn submitted(&self, handle: &BuildHandle) {
        self.notice(&format!("Started build {handle}"));
    }

    fn waiting(&self, handle: &BuildHandle, reason: WaitingReason) {
        let text = match reason {
            WaitingReason::NoLogStream => format!("Waiting for build {handle} to start..."),
            WaitingReason::EmptyStream => format!("Waiting for build {handle} to produce output..."),
        };
        self.notice(&text);
    }

    fn stream_started(&self, descriptor: &LogDescriptor) {
        self.notice(&format!(
            "{DIVIDER}\nLogs: {} / {}\n{DIVIDER}",
            descriptor.group, descriptor.stream
        ));
    }

    fn log_line(&self, message: &str) {
        if message.ends_with('\n') {
            Self::emit(&self.out, message);
        } else {
            Self::emit(&self.out, &format!("{message}\n"));
        }
    }

    fn warning(&self, warning: &Warning) {
        self.notice(&format!("warning: {warning}"));
    }

    fn artifacts_fetched(&self, dest: &Path) {
        self.notice(&format!("Artifacts downloaded to {}", dest.display()));
    }

    fn finished(&self, result: &BuildResult) {
        let mut text = format!("{DIVIDER}\nBuild {}: {}", result.build_id, result.status);
        if let Some(link) = result.logs.as_ref().and_then(|l| l.deep_link.as_deref()) {
            text.push_str(&format!("\nLogs: {link}"));
        }
        self.notice(&text);
    }
}

/// One-line JSON summary of a finished build, for `--json` mode.
#[must_use]
pub fn summary_json(outcome: &BuildOutcome) -> serde_json::Value {
    serde_json::json!({
        "buildId": outcome.result.build_id,
        "status": outcome.result.status,
        "exitCode": outcome.exit_code(),
        "artifacts": outcome.artifacts,
        "warnings": outcome.warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
    })
}
