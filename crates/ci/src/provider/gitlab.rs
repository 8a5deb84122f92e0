use super::{CIContext, CIProvider, flag, var};

/// Variables exposed by GitLab CI.
pub const ENV_PATTERN: &str = "^(CI_|GITLAB_)";

/// GitLab CI/CD.
#[derive(Debug, Clone)]
pub struct GitLabProvider {
    context: CIContext,
}

impl CIProvider for GitLabProvider {
    fn detect() -> Option<Self> {
        if !flag("GITLAB_CI") {
            return None;
        }

        Some(Self {
            context: CIContext {
                provider: "gitlab".to_string(),
                event: var("CI_PIPELINE_SOURCE").unwrap_or_else(|| "unknown".to_string()),
                ref_name: var("CI_COMMIT_REF_NAME").unwrap_or_default(),
                sha: var("CI_COMMIT_SHA").unwrap_or_default(),
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
