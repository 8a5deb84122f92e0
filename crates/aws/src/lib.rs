//! AWS backends for buildrelay
//!
//! Implements the collaborator traits of `buildrelay-core` on top of the AWS
//! SDK:
//! - AWS CodeBuild via the [`codebuild`] module, with StartBuild parameters
//!   in [`request`]
//! - CloudWatch Logs via the [`logs`] module
//! - Amazon S3 via the [`s3`] module, with ZIP handling in [`archive`]

pub mod archive;
pub mod codebuild;
pub mod logs;
pub mod request;
pub mod s3;

// Re-export main types for convenience
pub use codebuild::CodeBuildService;
pub use logs::CloudWatchLogSource;
pub use request::ForwardedFields;
pub use s3::S3Store;

/// One shared SDK configuration and a client per service.
#[derive(Debug, Clone)]
pub struct AwsBackend {
    /// CodeBuild client
    pub builds: CodeBuildService,
    /// CloudWatch Logs client
    pub logs: CloudWatchLogSource,
    /// S3 client
    pub store: S3Store,
}

impl AwsBackend {
    /// Load credentials and region from the standard AWS provider chain.
    pub async fn from_env() -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        tracing::debug!(region = ?config.region(), "Loaded AWS configuration");
        Self::from_config(&config)
    }

    /// Build clients from an already loaded configuration.
    #[must_use]
    pub fn from_config(config: &aws_config::SdkConfig) -> Self {
        Self {
            builds: CodeBuildService::new(aws_sdk_codebuild::Client::new(config)),
            logs: CloudWatchLogSource::new(aws_sdk_cloudwatchlogs::Client::new(config)),
            store: S3Store::new(aws_sdk_s3::Client::new(config)),
        }
    }
}
