//! Assembly of the build start request.
//!
//! Collected overrides form the base document. A caller template shaped like
//! a StartBuild `--cli-input-json` document is merged on top: list fields
//! present on both sides are concatenated, any other field from the template
//! replaces the base value. Overrides are then deduplicated.

use crate::error::{Error, Result, Warning, WarningKind};
use crate::types::{BuildRequest, EnvOverride};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Request field carrying environment overrides.
pub const OVERRIDES_FIELD: &str = "environmentVariablesOverride";

/// Template fields that are owned by the source upload step.
const RESERVED_FIELDS: [&str; 3] = ["sourceVersion", "sourceLocationOverride", "sourceTypeOverride"];

/// How duplicate overrides are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DedupPolicy {
    /// Drop exact (name, value) duplicates; same-name conflicts are kept
    /// and reported as warnings.
    #[default]
    Exact,
    /// Keep one entry per name holding the last value seen, at the position
    /// of the first occurrence.
    LastWriteWins,
}

/// Identity of the uploaded source snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceIdentity {
    /// Bucket the archive was uploaded to
    pub bucket: Option<String>,
    /// Object key of the archive
    pub key: Option<String>,
    /// Object version returned by the upload
    pub version: Option<String>,
}

impl SourceIdentity {
    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.bucket.as_deref().is_none_or(str::is_empty) {
            missing.push("source bucket");
        }
        if self.key.as_deref().is_none_or(str::is_empty) {
            missing.push("source key");
        }
        if self.version.as_deref().is_none_or(str::is_empty) {
            missing.push("source version");
        }
        missing
    }
}

/// A merged request plus any risks found while merging.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRequest {
    /// The request to submit
    pub request: BuildRequest,
    /// Same-name override conflicts and similar non-fatal findings
    pub warnings: Vec<Warning>,
}

/// Builds a [`BuildRequest`] from collected overrides and a template.
#[derive(Debug, Clone, Default)]
pub struct RequestMerger {
    project_name: Option<String>,
    policy: DedupPolicy,
}

impl RequestMerger {
    /// Create a merger. A configured project name takes precedence over a
    /// `projectName` in the template.
    #[must_use]
    pub fn new(project_name: Option<String>, policy: DedupPolicy) -> Self {
        Self {
            project_name,
            policy,
        }
    }

    /// Merge overrides, template and source identity into one request.
    ///
    /// # Errors
    /// Returns [`Error::Precondition`] when the source identity is
    /// incomplete, and [`Error::Template`] when the template is not an object,
    /// sets upload-owned fields, or carries malformed overrides.
    pub fn merge(
        &self,
        source: &SourceIdentity,
        overrides: Vec<EnvOverride>,
        template: Option<&Value>,
    ) -> Result<MergedRequest> {
        let missing = source.missing();
        if !missing.is_empty() {
            return Err(Error::precondition(missing));
        }

        let mut document = Map::new();
        document.insert(OVERRIDES_FIELD.to_string(), serde_json::to_value(overrides)?);

        if let Some(template) = template {
            let template = template
                .as_object()
                .ok_or_else(|| Error::template("expected a JSON object at the top level"))?;
            if let Some(field) = RESERVED_FIELDS.iter().find(|f| template.contains_key(**f)) {
                return Err(Error::template(format!(
                    "'{field}' is derived from the uploaded source archive and cannot be set"
                )));
            }
            deep_merge(&mut document, template);
        }

        let overrides: Vec<EnvOverride> = match document.remove(OVERRIDES_FIELD) {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| Error::template(format!("{OVERRIDES_FIELD}: {e}")))?,
            None => Vec::new(),
        };
        let template_project = match document.remove("projectName") {
            Some(Value::String(name)) => Some(name),
            Some(Value::Null) | None => None,
            Some(other) => {
                return Err(Error::template(format!(
                    "projectName must be a string, got {other}"
                )));
            }
        };

        let before = overrides.len();
        let (overrides, warnings) = dedupe(overrides, self.policy);
        debug!(
            before,
            after = overrides.len(),
            policy = ?self.policy,
            "Deduplicated environment overrides"
        );
        for warning in &warnings {
            warn!("{warning}");
        }

        let request = BuildRequest {
            project_name: self.project_name.clone().or(template_project),
            source_version: source.version.clone().unwrap_or_default(),
            source_location: match (&source.bucket, &source.key) {
                (Some(bucket), Some(key)) => Some(format!("{bucket}/{key}")),
                _ => None,
            },
            overrides,
            extra_fields: document,
        };

        Ok(MergedRequest { request, warnings })
    }
}

/// Merge `template` into `base`: lists on both sides concatenate, anything
/// else from the template wins.
fn deep_merge(base: &mut Map<String, Value>, template: &Map<String, Value>) {
    for (key, value) in template {
        match (base.get_mut(key), value) {
            (Some(Value::Array(existing)), Value::Array(extra)) => {
                existing.extend(extra.iter().cloned());
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Apply a dedup policy, returning the surviving overrides and conflict
/// warnings.
#[must_use]
pub fn dedupe(overrides: Vec<EnvOverride>, policy: DedupPolicy) -> (Vec<EnvOverride>, Vec<Warning>) {
    match policy {
        DedupPolicy::Exact => {
            let mut seen = HashSet::new();
            let unique: Vec<EnvOverride> = overrides
                .into_iter()
                .filter(|o| seen.insert(o.clone()))
                .collect();
            let warnings = conflicts(&unique)
                .into_iter()
                .map(|name| {
                    Warning::new(
                        WarningKind::OverrideConflict,
                        format!(
                            "Environment override {name} is set more than once with different values"
                        ),
                    )
                })
                .collect();
            (unique, warnings)
        }
        DedupPolicy::LastWriteWins => {
            let mut index: HashMap<String, usize> = HashMap::new();
            let mut unique: Vec<EnvOverride> = Vec::with_capacity(overrides.len());
            for o in overrides {
                if let Some(&i) = index.get(&o.name) {
                    unique[i] = o;
                } else {
                    index.insert(o.name.clone(), unique.len());
                    unique.push(o);
                }
            }
            (unique, Vec::new())
        }
    }
}

/// Names that appear more than once, in first-seen order.
fn conflicts(overrides: &[EnvOverride]) -> Vec<&str> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order = Vec::new();
    for o in overrides {
        let count = counts.entry(o.name.as_str()).or_insert(0);
        if *count == 0 {
            order.push(o.name.as_str());
        }
        *count += 1;
    }
    order.into_iter().filter(|name| counts[name] > 1).collect()
}
