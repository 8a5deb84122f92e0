//! Selection of caller environment variables forwarded to the remote build.

use crate::error::{Error, Result};
use crate::types::EnvOverride;
use regex::Regex;
use tracing::debug;

/// Selects environment entries whose names match any configured pattern.
///
/// Patterns are regular expressions matched against the variable name.
/// Platform patterns are anchored prefixes such as `^GITHUB_`; a
/// caller-supplied pattern is used as written.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentCollector {
    patterns: Vec<Regex>,
}

impl EnvironmentCollector {
    /// Compile the given patterns. Empty strings are ignored.
    ///
    /// # Errors
    /// Returns [`Error::Pattern`] if a pattern is not a valid regex.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .filter(|p| !p.as_ref().is_empty())
            .map(|p| {
                let pattern = p.as_ref();
                Regex::new(pattern).map_err(|source| Error::Pattern {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Whether no pattern is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `name` matches any pattern.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(name))
    }

    /// Select matching pairs, keeping enumeration order.
    pub fn collect_from<I, K, V>(&self, vars: I) -> Vec<EnvOverride>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if self.is_empty() {
            return Vec::new();
        }
        vars.into_iter()
            .map(|(k, v)| -> (String, String) { (k.into(), v.into()) })
            .filter(|(k, _)| self.matches(k))
            .map(|(name, value)| EnvOverride::new(name, value))
            .collect()
    }

    /// Select matching raw `NAME=VALUE` entries.
    ///
    /// Each entry is split on its first `=`; entries without one are skipped.
    pub fn collect_entries<'a, I>(&self, entries: I) -> Vec<EnvOverride>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.collect_from(entries.into_iter().filter_map(|entry| entry.split_once('=')))
    }

    /// Select matching variables from the current process environment.
    ///
    /// Variables whose name or value is not valid UTF-8 are skipped.
    #[must_use]
    pub fn collect(&self) -> Vec<EnvOverride> {
        let vars = std::env::vars_os().filter_map(|(k, v)| match (k.into_string(), v.into_string()) {
            (Ok(k), Ok(v)) => Some((k, v)),
            (Ok(k), Err(_)) => {
                debug!(name = %k, "Skipping environment variable with non UTF-8 value");
                None
            }
            _ => None,
        });
        let collected = self.collect_from(vars);
        debug!(
            count = collected.len(),
            patterns = self.patterns.len(),
            "Collected environment overrides"
        );
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_pattern_yields_empty() {
        let collector = EnvironmentCollector::new(Vec::<String>::new()).unwrap();
        assert!(collector.is_empty());
        assert!(collector.collect_from([("GITHUB_SHA", "abc")]).is_empty());
    }

    #[test]
    fn test_empty_pattern_strings_are_ignored() {
        let collector = EnvironmentCollector::new(["", ""]).unwrap();
        assert!(collector.is_empty());
    }

    #[test]
    fn test_selects_matching_names_in_order() {
        let collector = EnvironmentCollector::new(["^GITHUB_", "^MY_"]).unwrap();
        let got = collector.collect_from([
            ("GITHUB_SHA", "abc"),
            ("HOME", "/root"),
            ("MY_FLAG", "1"),
            ("GITHUB_REF", "refs/heads/main"),
        ]);
        assert_eq!(
            got,
            vec![
                EnvOverride::new("GITHUB_SHA", "abc"),
                EnvOverride::new("MY_FLAG", "1"),
                EnvOverride::new("GITHUB_REF", "refs/heads/main"),
            ]
        );
    }

    #[test]
    fn test_raw_entries_split_on_first_delimiter() {
        let collector = EnvironmentCollector::new(["^CI_"]).unwrap();
        let got = collector.collect_entries(["CI_URL=a=b=c", "CI_BROKEN", "OTHER=x"]);
        assert_eq!(got, vec![EnvOverride::new("CI_URL", "a=b=c")]);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let err = EnvironmentCollector::new(["^BAD("]).unwrap_err();
        assert!(matches!(err, Error::Pattern { ref pattern, .. } if pattern == "^BAD("));
    }

    #[test]
    fn test_collect_reads_process_environment() {
        temp_env::with_vars(
            [
                ("BUILDRELAY_TEST_ALPHA", Some("one=two")),
                ("BUILDRELAY_TEST_BETA", Some("three")),
            ],
            || {
                let collector = EnvironmentCollector::new(["^BUILDRELAY_TEST_"]).unwrap();
                let mut got = collector.collect();
                got.sort_by(|a, b| a.name.cmp(&b.name));
                assert_eq!(
                    got,
                    vec![
                        EnvOverride::new("BUILDRELAY_TEST_ALPHA", "one=two"),
                        EnvOverride::new("BUILDRELAY_TEST_BETA", "three"),
                    ]
                );
            },
        );
    }
}
