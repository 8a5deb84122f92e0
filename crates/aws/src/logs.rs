//! CloudWatch Logs event source

use async_trait::async_trait;
use aws_sdk_cloudwatchlogs::Client;
use aws_sdk_cloudwatchlogs::error::DisplayErrorContext;
use aws_sdk_cloudwatchlogs::types::OutputLogEvent;
use buildrelay_core::types::LogEvent;
use buildrelay_core::{Error, LogDescriptor, LogPage, LogSource, Result};
use tracing::{debug, trace};

/// [`LogSource`] reading a build's stream with `GetLogEvents`, oldest first.
#[derive(Debug, Clone)]
pub struct CloudWatchLogSource {
    client: Client,
}

impl CloudWatchLogSource {
    /// Wrap a CloudWatch Logs client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn to_page(events: &[OutputLogEvent], next_forward_token: Option<&str>) -> LogPage {
    LogPage {
        events: events
            .iter()
            .filter_map(OutputLogEvent::message)
            .map(LogEvent::new)
            .collect(),
        next_token: next_forward_token.map(String::from),
    }
}

#[async_trait]
impl LogSource for CloudWatchLogSource {
    async fn fetch_log_events(
        &self,
        descriptor: &LogDescriptor,
        token: Option<&str>,
    ) -> Result<LogPage> {
        let response = self
            .client
            .get_log_events()
            .log_group_name(&descriptor.group)
            .log_stream_name(&descriptor.stream)
            .start_from_head(true)
            .set_next_token(token.map(String::from))
            .send()
            .await;

        match response {
            Ok(output) => {
                let page = to_page(output.events(), output.next_forward_token());
                trace!(events = page.events.len(), "Fetched log events");
                Ok(page)
            }
            // The stream is named on the build record before its first write.
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception()) =>
            {
                debug!(
                    group = %descriptor.group,
                    stream = %descriptor.stream,
                    "Log stream not created yet"
                );
                Ok(LogPage {
                    events: Vec::new(),
                    next_token: token.map(String::from),
                })
            }
            Err(e) => Err(Error::remote(
                "GetLogEvents",
                DisplayErrorContext(&e).to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_keeps_order_and_skips_empty_events() {
        let events = vec![
            OutputLogEvent::builder().message("[Container] Entering phase BUILD\n").build(),
            OutputLogEvent::builder().timestamp(1).build(),
            OutputLogEvent::builder().message("make test\n").build(),
        ];

        let page = to_page(&events, Some("f/0001"));

        assert_eq!(
            page.events,
            vec![
                LogEvent::new("[Container] Entering phase BUILD\n"),
                LogEvent::new("make test\n"),
            ]
        );
        assert_eq!(page.next_token.as_deref(), Some("f/0001"));
    }

    #[test]
    fn test_page_without_token() {
        let page = to_page(&[], None);
        assert!(page.events.is_empty());
        assert!(page.next_token.is_none());
    }
}
