//! CI platform detection for buildrelay
//!
//! Identifies the CI system the relay runs under and describes which
//! environment variables that system exposes to a build.

pub mod context;
pub mod provider;

pub use context::CIContext;
pub use provider::{CIProvider, detect};
