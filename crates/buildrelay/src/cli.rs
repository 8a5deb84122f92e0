use crate::errors::CliError;
use crate::tracing::{LogLevel, TracingFormat};
use buildrelay_ci::CIContext;
use buildrelay_core::config::{DEFAULT_ARTIFACT_DIR, DEFAULT_POLL_INTERVAL};
use buildrelay_core::{
    ArchiveNaming, ArchiveTarget, DedupPolicy, EnvOverride, PackagingMode, RelayConfig, S3Location,
};
use clap::Parser;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

/// Command line of the `buildrelay` binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "buildrelay")]
#[command(
    about = "Run a CI job on AWS CodeBuild and relay its logs, artifacts and status"
)]
#[command(
    after_help = "Options after `--` are forwarded to StartBuild, e.g. `-- --image-override aws/codebuild/standard:7.0`"
)]
#[command(version)]
pub struct Cli {
    /// CodeBuild project to start; the template's projectName is used otherwise
    #[arg(long, short = 'p', env = "BUILDRELAY_PROJECT")]
    pub project: Option<String>,

    /// Bucket the source archive is uploaded to (must be versioned)
    #[arg(long, env = "BUILDRELAY_BUCKET")]
    pub bucket: Option<String>,

    /// Object key of the source archive
    #[arg(long, env = "BUILDRELAY_KEY")]
    pub key: Option<String>,

    /// Directory packaged as the build source
    #[arg(long, env = "BUILDRELAY_SOURCE_DIR", default_value = ".")]
    pub source_dir: PathBuf,

    /// Return after the build is started instead of following it
    #[arg(long, env = "BUILDRELAY_NO_WAIT")]
    pub no_wait: bool,

    /// Archive the final build record under this S3 prefix (s3://bucket/prefix)
    #[arg(long, env = "BUILDRELAY_ARCHIVE_TO", value_name = "S3_PREFIX")]
    pub archive_to: Option<String>,

    /// Artifact packaging of the project: ZIP or NONE
    #[arg(long, env = "BUILDRELAY_PACKAGING", default_value = "ZIP")]
    pub packaging: PackagingMode,

    /// Directory artifacts are downloaded into
    #[arg(long, env = "BUILDRELAY_ARTIFACT_DIR", default_value = DEFAULT_ARTIFACT_DIR)]
    pub artifact_dir: PathBuf,

    /// Extra regular expression selecting environment variables to forward
    #[arg(long, env = "BUILDRELAY_ENV_PATTERN", value_name = "REGEX")]
    pub env_pattern: Option<String>,

    /// Additional NAME=VALUE override, appended after collected variables
    #[arg(long = "env", short = 'e', value_name = "NAME=VALUE")]
    pub env: Vec<EnvOverride>,

    /// StartBuild request template (JSON file, optionally prefixed with file://)
    #[arg(long, env = "BUILDRELAY_CLI_INPUT_JSON", value_name = "FILE")]
    pub cli_input_json: Option<String>,

    /// Keep only the last value for each override name
    #[arg(long, env = "BUILDRELAY_DEDUP_BY_NAME")]
    pub dedup_by_name: bool,

    /// Stop the remote build when interrupted
    #[arg(long, env = "BUILDRELAY_STOP_ON_CANCEL")]
    pub stop_on_cancel: bool,

    /// Stop waiting after this many seconds
    #[arg(long, env = "BUILDRELAY_TIMEOUT", value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Seconds between completion checks
    #[arg(
        long,
        env = "BUILDRELAY_POLL_INTERVAL",
        value_name = "SECONDS",
        default_value_t = DEFAULT_POLL_INTERVAL.as_secs()
    )]
    pub poll_interval: u64,

    /// Shorthand for --level debug
    #[arg(long, short = 'v')]
    pub verbose: bool,

    #[arg(
        short = 'l',
        long,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    #[arg(long, help = "Log format", default_value = "compact", value_enum)]
    pub log_format: TracingFormat,

    #[arg(long, help = "Output logs and errors in JSON format")]
    pub json: bool,

    /// StartBuild options, as `--kebab-name value` pairs
    #[arg(last = true, value_name = "STARTBUILD_OPTIONS")]
    pub forwarded: Vec<String>,
}

impl Cli {
    /// Effective log level.
    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        if self.verbose && !matches!(self.level, LogLevel::Trace) {
            LogLevel::Debug
        } else {
            self.level
        }
    }

    /// Effective log format.
    #[must_use]
    pub fn log_format(&self) -> TracingFormat {
        if self.json {
            TracingFormat::Json
        } else {
            self.log_format
        }
    }

    /// Resolve the run configuration. Does not validate required settings.
    ///
    /// # Errors
    /// Returns [`CliError::Config`] for a malformed archive destination.
    pub fn relay_config(&self, ci: &CIContext) -> Result<RelayConfig, CliError> {
        let archive = self
            .archive_to
            .as_deref()
            .map(|raw| {
                let destination = parse_prefix(raw).ok_or_else(|| {
                    CliError::config_with_help(
                        format!("Invalid archive destination '{raw}'"),
                        "Use s3://bucket or s3://bucket/prefix",
                    )
                })?;
                Ok::<_, CliError>(ArchiveTarget {
                    destination,
                    naming: ArchiveNaming {
                        platform: ci.provider.clone(),
                        commit: ci.sha.clone(),
                    },
                })
            })
            .transpose()?;

        Ok(RelayConfig {
            project_name: self.project.clone(),
            source_bucket: self.bucket.clone(),
            source_key: self.key.clone(),
            wait: !self.no_wait,
            poll_interval: Duration::from_secs(self.poll_interval.max(1)),
            stop_on_cancel: self.stop_on_cancel,
            archive,
            packaging: self.packaging.clone(),
            artifact_dir: self.artifact_dir.clone(),
            dedup: if self.dedup_by_name {
                DedupPolicy::LastWriteWins
            } else {
                DedupPolicy::Exact
            },
        })
    }

    /// Load the template file, if any, and lay the forwarded options over it.
    ///
    /// # Errors
    /// Returns [`CliError::Config`] if the file cannot be read or parsed, is
    /// not a JSON object, or the forwarded options are malformed.
    pub fn template(&self) -> Result<Option<Value>, CliError> {
        let mut template = match &self.cli_input_json {
            Some(raw) => {
                let path = raw.strip_prefix("file://").unwrap_or(raw);
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    CliError::config(format!("Cannot read request template {path}: {e}"))
                })?;
                let value: Value = serde_json::from_str(&contents).map_err(|e| {
                    CliError::config(format!("Request template {path} is not valid JSON: {e}"))
                })?;
                match value {
                    Value::Object(map) => Some(map),
                    _ => {
                        return Err(CliError::config(format!(
                            "Request template {path} must contain a JSON object"
                        )));
                    }
                }
            }
            None => None,
        };

        let forwarded = forwarded_fields(&self.forwarded)?;
        if !forwarded.is_empty() {
            template.get_or_insert_with(Map::new).extend(forwarded);
        }
        Ok(template.map(Value::Object))
    }
}

/// Parse `s3://bucket[/prefix]` or `bucket[/prefix]`.
fn parse_prefix(raw: &str) -> Option<S3Location> {
    let rest = raw.strip_prefix("s3://").unwrap_or(raw);
    let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return None;
    }
    Some(S3Location::new(bucket, prefix.trim_matches('/')))
}

/// Convert trailing `--kebab-name value` pairs to camelCase request fields.
///
/// An option followed by another option, or by nothing, is a `true` flag.
///
/// # Errors
/// Returns [`CliError::Config`] for a value without an option name.
pub fn forwarded_fields(args: &[String]) -> Result<Map<String, Value>, CliError> {
    let mut fields = Map::new();
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        let Some(name) = arg.strip_prefix("--").filter(|n| !n.is_empty()) else {
            return Err(CliError::config_with_help(
                format!("Unexpected StartBuild argument '{arg}'"),
                "Forwarded options take the form --option-name value",
            ));
        };
        let (name, value) = match name.split_once('=') {
            Some((name, value)) => (name, Value::String(value.to_string())),
            None => match iter.next_if(|next| !next.starts_with("--")) {
                Some(value) => (name, Value::String(value.clone())),
                None => (name, Value::Bool(true)),
            },
        };
        fields.insert(camel_case(name), value);
    }
    Ok(fields)
}

fn camel_case(kebab: &str) -> String {
    let mut out = String::with_capacity(kebab.len());
    let mut upper = false;
    for c in kebab.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse the process arguments.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}
