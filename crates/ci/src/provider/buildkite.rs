//! Buildkite
//!
//! Detects Buildkite from its environment variables.

use super::{CIContext, CIProvider, flag, var};
use tracing::info;

/// Variables exposed by Buildkite.
pub const ENV_PATTERN: &str = "^BUILDKITE";

/// Buildkite CI provider.
#[derive(Debug, Clone)]
pub struct BuildkiteProvider {
    context: CIContext,
}

impl CIProvider for BuildkiteProvider {
    fn detect() -> Option<Self> {
        // Buildkite sets BUILDKITE=true
        if !flag("BUILDKITE") {
            return None;
        }

        let event = var("BUILDKITE_SOURCE").unwrap_or_else(|| "unknown".to_string());
        let ref_name = var("BUILDKITE_BRANCH").unwrap_or_default();
        let sha = var("BUILDKITE_COMMIT").unwrap_or_else(|| "HEAD".to_string());

        info!("Detected Buildkite CI: branch={}, sha={}", ref_name, sha);

        Some(Self {
            context: CIContext {
                provider: "buildkite".to_string(),
                event,
                ref_name,
                sha,
            },
        })
    }

    fn context(&self) -> &CIContext {
        &self.context
    }

    fn env_pattern(&self) -> Option<&'static str> {
        Some(ENV_PATTERN)
    }
}
