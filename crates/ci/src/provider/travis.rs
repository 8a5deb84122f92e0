use super::{CIContext, CIProvider, flag, var};

/// Variables exposed by Travis CI.
pub const ENV_PATTERN: &str = "^TRAVIS";

/// Travis CI.
#[derive(Debug, Clone)]
pub struct TravisProvider {
    context: CIContext,
}

impl CIProvider for TravisProvider {
    fn detect() -> Option<Self> {
        if !flag("TRAVIS") {
            return None;
        }

        Some(Self {
            context: CIContext {
                provider: "travis".to_string(),
                event: var("TRAVIS_EVENT_TYPE").unwrap_or_else(|| "unknown".to_string()),
                ref_name: var("TRAVIS_BRANCH").unwrap_or_default(),
                sha: var("TRAVIS_COMMIT").unwrap_or_default(),
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
