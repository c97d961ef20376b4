use crate::error::NotifyError;
use crate::event::SourceReference;
use crate::pipeline::PipelineState;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sns::config::Builder as SnsConfigBuilder;
use aws_sdk_sns::error::DisplayErrorContext;
use aws_sdk_sns::Client as SnsClient;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// SNS rejects subjects longer than this.
const MAX_SUBJECT_LEN: usize = 100;

/// Destination for human-readable failure messages
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, subject: &str, message: &str) -> Result<(), NotifyError>;
}

/// Publishes to an SNS topic
pub struct SnsNotifier {
    client: SnsClient,
    topic_arn: String,
}

impl SnsNotifier {
    pub fn new(aws_config: &SdkConfig, region: &str, topic_arn: impl Into<String>) -> Self {
        let sns_config = SnsConfigBuilder::from(aws_config)
            .region(aws_sdk_sns::config::Region::new(region.to_string()))
            .build();
        let topic_arn = topic_arn.into();

        info!(topic_arn = %topic_arn, region, "SNS notifier initialized");

        Self {
            client: SnsClient::from_conf(sns_config),
            topic_arn,
        }
    }
}

#[async_trait]
impl Notifier for SnsNotifier {
    #[instrument(skip(self, message), fields(topic_arn = %self.topic_arn))]
    async fn publish(&self, subject: &str, message: &str) -> Result<(), NotifyError> {
        let output = self
            .client
            .publish()
            .topic_arn(&self.topic_arn)
            .subject(subject)
            .message(message)
            .send()
            .await
            .map_err(|e| NotifyError::Publish(DisplayErrorContext(&e).to_string()))?;

        debug!(message_id = output.message_id().unwrap_or_default(), "Notification published");
        Ok(())
    }
}

/// Description of one failed invocation
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub invocation_id: Uuid,
    /// Absent only when the triggering event could not be decoded
    pub source: Option<SourceReference>,
    pub failed_in: PipelineState,
    pub error_kind: &'static str,
    pub summary: String,
    pub trace: String,
    pub occurred_at: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(
        invocation_id: Uuid,
        source: Option<SourceReference>,
        failed_in: PipelineState,
        error_kind: &'static str,
        error: &anyhow::Error,
    ) -> Self {
        Self {
            invocation_id,
            source,
            failed_in,
            error_kind,
            summary: format!("{:#}", error),
            trace: format!("{:?}", error),
            occurred_at: Utc::now(),
        }
    }

    /// One-line subject, within SNS limits
    pub fn subject(&self, prefix: &str) -> String {
        let target = self
            .source
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown source".to_string());
        let subject = format!("{}: {}", prefix, target).replace(['\r', '\n'], " ");

        if subject.chars().count() <= MAX_SUBJECT_LEN {
            subject
        } else {
            let mut truncated: String = subject.chars().take(MAX_SUBJECT_LEN - 3).collect();
            truncated.push_str("...");
            truncated
        }
    }

    /// Multi-line message body
    pub fn message(&self) -> String {
        let (bucket, key) = match &self.source {
            Some(source) => (source.bucket.as_str(), source.key.as_str()),
            None => ("<unknown>", "<unknown>"),
        };

        format!(
            "Invocation: {}\nTime: {}\nBucket: {}\nKey: {}\nFailed in: {}\nError: {}\nSummary: {}\n\nTrace:\n{}\n",
            self.invocation_id,
            self.occurred_at.to_rfc3339(),
            bucket,
            key,
            self.failed_in,
            self.error_kind,
            self.summary,
            self.trace
        )
    }
}

/// Best-effort delivery of error reports.
///
/// Failures are logged and swallowed so they never mask the pipeline error.
#[derive(Clone)]
pub struct NotificationSink {
    notifier: Option<Arc<dyn Notifier>>,
    subject_prefix: String,
}

impl NotificationSink {
    pub fn new(notifier: Arc<dyn Notifier>, subject_prefix: impl Into<String>) -> Self {
        Self {
            notifier: Some(notifier),
            subject_prefix: subject_prefix.into(),
        }
    }

    /// Sink with no channel; publishing is a no-op
    pub fn disabled() -> Self {
        Self {
            notifier: None,
            subject_prefix: String::new(),
        }
    }

    #[instrument(skip(self, report), fields(invocation_id = %report.invocation_id))]
    pub async fn publish(&self, report: ErrorReport) {
        let Some(notifier) = &self.notifier else {
            debug!("No notification channel configured, skipping error report");
            return;
        };

        let subject = report.subject(&self.subject_prefix);
        match notifier.publish(&subject, &report.message()).await {
            Ok(()) => info!(subject = %subject, "Error report published"),
            Err(e) => {
                error!(error = %e, "Failed to publish error report");
                metrics::counter!("chunker.notifications.failed").increment(1);
            }
        }
    }
}
