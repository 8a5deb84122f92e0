//! CI provider detection.
//!
//! Each provider recognizes its platform from the environment and names the
//! variables that platform exposes, so they can be forwarded to the remote
//! build.

use crate::context::CIContext;
use tracing::debug;

/// A CI platform the relay can run under.
pub trait CIProvider: Send + Sync {
    /// Detect if running in this CI environment
    fn detect() -> Option<Self>
    where
        Self: Sized;

    /// Get normalized CI context
    fn context(&self) -> &CIContext;

    /// Regular expression selecting the platform's environment variable
    /// names, or `None` when nothing is forwarded by default.
    fn env_pattern(&self) -> Option<&'static str>;
}

pub mod bitbucket;
pub mod buildkite;
pub mod circleci;
pub mod github;
pub mod gitlab;
pub mod jenkins;
pub mod local;
pub mod travis;

pub use bitbucket::BitbucketProvider;
pub use buildkite::BuildkiteProvider;
pub use circleci::CircleCIProvider;
pub use github::GitHubProvider;
pub use gitlab::GitLabProvider;
pub use jenkins::JenkinsProvider;
pub use local::LocalProvider;
pub use travis::TravisProvider;

/// Detect the current CI platform, falling back to [`LocalProvider`].
#[must_use]
pub fn detect() -> Box<dyn CIProvider> {
    let provider: Box<dyn CIProvider> = if let Some(p) = GitHubProvider::detect() {
        Box::new(p)
    } else if let Some(p) = GitLabProvider::detect() {
        Box::new(p)
    } else if let Some(p) = BuildkiteProvider::detect() {
        Box::new(p)
    } else if let Some(p) = CircleCIProvider::detect() {
        Box::new(p)
    } else if let Some(p) = TravisProvider::detect() {
        Box::new(p)
    } else if let Some(p) = BitbucketProvider::detect() {
        Box::new(p)
    } else if let Some(p) = JenkinsProvider::detect() {
        Box::new(p)
    } else {
        Box::new(LocalProvider::from_git())
    };
    debug!(context = %provider.context(), "Detected CI platform");
    provider
}

/// Read a variable, treating empty values as unset.
pub(crate) fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Whether `name` is set to `true` (case-insensitive).
pub(crate) fn flag(name: &str) -> bool {
    var(name).is_some_and(|v| v.eq_ignore_ascii_case("true"))
}
