use super::{CIContext, CIProvider, flag, var};

/// Variables exposed by GitHub Actions.
pub const ENV_PATTERN: &str = "^GITHUB_";

/// GitHub Actions.
#[derive(Debug, Clone)]
pub struct GitHubProvider {
    context: CIContext,
}

impl CIProvider for GitHubProvider {
    fn detect() -> Option<Self> {
        if !flag("GITHUB_ACTIONS") {
            return None;
        }

        Some(Self {
            context: CIContext {
                provider: "github".to_string(),
                event: var("GITHUB_EVENT_NAME").unwrap_or_default(),
                ref_name: var("GITHUB_REF_NAME").unwrap_or_default(),
                sha: var("GITHUB_SHA").unwrap_or_default(),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_not_github() {
        temp_env::with_var_unset("GITHUB_ACTIONS", || {
            assert!(GitHubProvider::detect().is_none());
        });
    }

    #[test]
    fn test_detect_github() {
        temp_env::with_vars(
            [
                ("GITHUB_ACTIONS", Some("true")),
                ("GITHUB_EVENT_NAME", Some("pull_request")),
                ("GITHUB_REF_NAME", Some("42/merge")),
                ("GITHUB_SHA", Some("ffac537e6cbbf934b08745a378932722df287a53")),
            ],
            || {
                let provider = GitHubProvider::detect().unwrap();
                assert_eq!(provider.context.provider, "github");
                assert_eq!(provider.context.event, "pull_request");
                assert_eq!(provider.context.ref_name, "42/merge");
                assert_eq!(provider.context.short_sha(), "ffac537");
            },
        );
    }
}
