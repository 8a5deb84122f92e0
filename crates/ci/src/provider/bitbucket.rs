use super::{CIContext, CIProvider, var};

/// Variables exposed by Bitbucket Pipelines.
pub const ENV_PATTERN: &str = "^BITBUCKET_";

/// Bitbucket Pipelines.
#[derive(Debug, Clone)]
pub struct BitbucketProvider {
    context: CIContext,
}

impl CIProvider for BitbucketProvider {
    fn detect() -> Option<Self> {
        // No boolean marker; every pipeline step has a build number.
        var("BITBUCKET_BUILD_NUMBER")?;

        let event = if var("BITBUCKET_PR_ID").is_some() {
            "pull_request"
        } else if var("BITBUCKET_TAG").is_some() {
            "tag"
        } else {
            "push"
        };

        Some(Self {
            context: CIContext {
                provider: "bitbucket".to_string(),
                event: event.to_string(),
                ref_name: var("BITBUCKET_BRANCH")
                    .or_else(|| var("BITBUCKET_TAG"))
                    .unwrap_or_default(),
                sha: var("BITBUCKET_COMMIT").unwrap_or_default(),
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
