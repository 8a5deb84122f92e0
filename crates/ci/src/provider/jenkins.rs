use super::{CIContext, CIProvider, var};

/// Variables exposed by Jenkins. Jenkins has no common prefix, so the
/// pattern lists the standard build and git plugin variables.
pub const ENV_PATTERN: &str = "^(JENKINS_|GIT_(BRANCH|COMMIT|URL)$|BUILD_(ID|NUMBER|TAG|URL)$|JOB_(NAME|URL)$|CHANGE_)";

/// Jenkins.
#[derive(Debug, Clone)]
pub struct JenkinsProvider {
    context: CIContext,
}

impl CIProvider for JenkinsProvider {
    fn detect() -> Option<Self> {
        var("JENKINS_URL")?;
        var("BUILD_ID")?;

        let event = if var("CHANGE_ID").is_some() {
            "pull_request"
        } else {
            "push"
        };
        let ref_name = var("BRANCH_NAME")
            .or_else(|| var("GIT_BRANCH"))
            .map(|b| b.trim_start_matches("origin/").to_string())
            .unwrap_or_default();

        Some(Self {
            context: CIContext {
                provider: "jenkins".to_string(),
                event: event.to_string(),
                ref_name,
                sha: var("GIT_COMMIT").unwrap_or_default(),
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
    fn test_detect_jenkins_strips_remote() {
        temp_env::with_vars(
            [
                ("JENKINS_URL", Some("https://ci.test/")),
                ("BUILD_ID", Some("88")),
                ("BRANCH_NAME", None),
                ("CHANGE_ID", None),
                ("GIT_BRANCH", Some("origin/release")),
                ("GIT_COMMIT", Some("9f8e7d6")),
            ],
            || {
                let provider = JenkinsProvider::detect().unwrap();
                assert_eq!(provider.context.ref_name, "release");
                assert_eq!(provider.context.event, "push");
            },
        );
    }

    #[test]
    fn test_pattern_skips_unrelated_build_vars() {
        let re = regex::Regex::new(ENV_PATTERN).unwrap();
        assert!(re.is_match("GIT_COMMIT"));
        assert!(re.is_match("BUILD_NUMBER"));
        assert!(!re.is_match("GIT_AUTHOR_EMAIL"));
        assert!(!re.is_match("BUILD_SECRET"));
    }
}
