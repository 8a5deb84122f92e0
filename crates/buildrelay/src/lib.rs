//! buildrelay command line
//!
//! Runs the current CI job on AWS CodeBuild: the working tree is packaged and
//! uploaded, a build is started with the job's environment, its logs are
//! streamed back and its status becomes the process exit code.

pub mod cli;
pub mod console;
pub mod errors;
pub mod package;
pub mod run;
pub mod shutdown;
pub mod tracing;

pub use cli::Cli;
pub use errors::{CliError, exit_code_for, render_error};
