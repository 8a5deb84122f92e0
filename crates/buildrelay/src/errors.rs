//! CLI errors and their exit codes

use miette::{Diagnostic, Report};
use std::io::{self, Write};
use thiserror::Error;

/// Successful run
pub const EXIT_OK: i32 = 0;
/// Precondition, submission, remote or build failure
pub const EXIT_FAILURE: i32 = 1;
/// Interrupted by a signal or the timeout
pub const EXIT_CANCELLED: i32 = 130;

/// CLI-specific error types with exit code mapping
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Invalid command line input, detected before any remote call.
    #[error("{message}")]
    #[diagnostic(code(buildrelay::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },

    /// Packaging the working tree failed.
    #[error("Failed to package {path}: {message}")]
    #[diagnostic(
        code(buildrelay::cli::package),
        help("Check that the source directory exists and is readable")
    )]
    Package {
        /// Source directory
        path: String,
        /// The error message
        message: String,
    },

    /// A lifecycle error.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Relay(#[from] buildrelay_core::Error),
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Relay(buildrelay_core::Error::Cancelled { .. }) => EXIT_CANCELLED,
        _ => EXIT_FAILURE,
    }
}

/// Render an error to stderr, as a miette report or a JSON line.
#[allow(clippy::print_stderr)]
pub fn render_error(err: CliError, json_mode: bool) {
    if json_mode {
        let code = err.code().map(|c| c.to_string());
        let envelope = serde_json::json!({
            "error": {
                "code": code,
                "message": err.to_string(),
                "correlationId": crate::tracing::correlation_id().to_string(),
            }
        });
        eprintln!("{envelope}");
    } else {
        let report = Report::new(err);
        eprintln!("{report:?}");
    }
    // Ensure output is flushed before potential process exit
    let _ = io::stderr().flush();
}
