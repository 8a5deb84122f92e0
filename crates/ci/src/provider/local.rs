use super::{CIContext, CIProvider};
use std::process::Command;
use tracing::debug;

/// Fallback when no CI platform is detected.
///
/// Reads the branch and commit from the local git checkout when available
/// and forwards no platform variables.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    context: CIContext,
}

impl LocalProvider {
    /// Build the context from `git rev-parse`, using `current` for anything
    /// git cannot answer.
    #[must_use]
    pub fn from_git() -> Self {
        Self {
            context: CIContext {
                provider: "local".to_string(),
                event: "manual".to_string(),
                ref_name: git(&["rev-parse", "--abbrev-ref", "HEAD"])
                    .unwrap_or_else(|| "current".to_string()),
                sha: git(&["rev-parse", "HEAD"]).unwrap_or_else(|| "current".to_string()),
            },
        }
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        debug!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return None;
    }
    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!value.is_empty()).then_some(value)
}

impl CIProvider for LocalProvider {
    fn detect() -> Option<Self> {
        // Always available as fallback
        Some(Self::from_git())
    }

    fn context(&self) -> &CIContext {
        &self.context
    }

    fn env_pattern(&self) -> Option<&'static str> {
        None
    }
}
