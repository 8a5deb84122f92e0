use super::{CIContext, CIProvider, flag, var};

/// Variables exposed by CircleCI.
pub const ENV_PATTERN: &str = "^CIRCLE";

/// CircleCI.
#[derive(Debug, Clone)]
pub struct CircleCIProvider {
    context: CIContext,
}

impl CIProvider for CircleCIProvider {
    fn detect() -> Option<Self> {
        if !flag("CIRCLECI") {
            return None;
        }

        let event = if var("CIRCLE_PULL_REQUEST").is_some() {
            "pull_request"
        } else if var("CIRCLE_TAG").is_some() {
            "tag"
        } else {
            "push"
        };

        Some(Self {
            context: CIContext {
                provider: "circleci".to_string(),
                event: event.to_string(),
                ref_name: var("CIRCLE_BRANCH")
                    .or_else(|| var("CIRCLE_TAG"))
                    .unwrap_or_default(),
                sha: var("CIRCLE_SHA1").unwrap_or_default(),
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
