use std::fmt;

/// Context information about the current CI environment.
///
/// Names the CI provider and the git revision the relayed build is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CIContext {
    /// The CI provider name (e.g., "github", "gitlab", "local").
    pub provider: String,
    /// The event that triggered the pipeline (e.g., "push", "pull_request").
    pub event: String,
    /// The git ref name (e.g., "main", "v1.0.0").
    pub ref_name: String,
    /// The git commit SHA.
    pub sha: String,
}

impl CIContext {
    /// The commit SHA truncated to seven characters.
    #[must_use]
    pub fn short_sha(&self) -> &str {
        self.sha.get(..7).unwrap_or(&self.sha)
    }
}

impl Default for CIContext {
    fn default() -> Self {
        Self {
            provider: String::from("local"),
            event: String::from("manual"),
            ref_name: String::new(),
            sha: String::new(),
        }
    }
}

impl fmt::Display for CIContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} on {} ({})",
            self.provider,
            self.event,
            self.ref_name,
            self.short_sha()
        )
    }
}
