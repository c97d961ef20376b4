use crate::cleaner::CleaningPolicy;
use serde::Deserialize;

/// Main configuration for the chunker service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Kafka configuration for bucket notifications
    #[serde(default)]
    pub kafka: KafkaConfig,
    /// S3 client configuration
    #[serde(default)]
    pub s3: S3Config,
    /// Where and how chunks are written
    #[serde(default)]
    pub output: OutputConfig,
    /// How source objects are decoded
    #[serde(default)]
    pub input: InputConfig,
    /// Cleaning policy
    #[serde(default)]
    pub cleaning: CleaningConfig,
    /// Failure notification channel
    #[serde(default)]
    pub notification: NotificationConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Kafka consumer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: String,
    /// Consumer group ID
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    /// Topic carrying bucket notifications
    #[serde(default = "default_event_topic")]
    pub event_topic: String,
    /// Enable SSL
    #[serde(default)]
    pub ssl_enabled: bool,
    /// SSL CA certificate path
    pub ssl_ca_location: Option<String>,
    /// SASL username
    pub sasl_username: Option<String>,
    /// SASL password
    pub sasl_password: Option<String>,
    /// Auto offset reset policy
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,
    /// Session timeout in milliseconds
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u32,
    /// Max poll interval in milliseconds
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u32,
}

/// S3 client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

/// Chunk output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Bucket for chunk output; the source bucket when unset
    pub bucket: Option<String>,
    /// Key prefix for chunk output
    #[serde(default = "default_output_prefix")]
    pub prefix: String,
    /// Maximum data rows per chunk (header excluded)
    #[serde(default = "default_max_rows_per_chunk")]
    pub max_rows_per_chunk: usize,
}

/// Source decoding configuration
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    /// Field delimiter for CSV sources
    #[serde(default = "default_csv_delimiter")]
    pub csv_delimiter: char,
    /// Worksheet to read from spreadsheets; the first sheet when unset
    pub sheet_name: Option<String>,
    /// Entry to read from zip sources; `{stem}.csv` when unset
    pub archive_entry: Option<String>,
}

/// Cleaning configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CleaningConfig {
    #[serde(default)]
    pub policy: CleaningPolicy,
}

/// Notification channel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// SNS topic ARN; notifications are disabled when unset
    pub topic_arn: Option<String>,
    /// SNS region; the S3 region when unset
    pub region: Option<String>,
    /// Prefix for notification subjects
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

// Default value functions
fn default_service_name() -> String {
    "chunker-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_bootstrap_servers() -> String {
    "localhost:9092".to_string()
}

fn default_consumer_group() -> String {
    "chunker-service".to_string()
}

fn default_event_topic() -> String {
    "chunker.bucket.events".to_string()
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_session_timeout_ms() -> u32 {
    30000
}

fn default_max_poll_interval_ms() -> u32 {
    300000
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_output_prefix() -> String {
    "output".to_string()
}

fn default_max_rows_per_chunk() -> usize {
    10_000
}

fn default_csv_delimiter() -> char {
    ','
}

fn default_subject_prefix() -> String {
    "Chunking failed".to_string()
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "chunker-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/chunker").required(false))
            .add_source(config::File::with_name("/etc/chunker/chunker").required(false))
            // Override with environment variables
            // CHUNKER__OUTPUT__MAX_ROWS_PER_CHUNK -> output.max_rows_per_chunk
            .add_source(
                config::Environment::with_prefix("CHUNKER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot start with.
    ///
    /// A zero chunk size is not rejected here; it fails each invocation with
    /// a reported `InvalidConfiguration` error instead.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.input.csv_delimiter.is_ascii() {
            anyhow::bail!(
                "input.csv_delimiter must be a single ASCII character, got '{}'",
                self.input.csv_delimiter
            );
        }

        // Chunks at the root of the source bucket cannot be told apart from uploads
        if self.output.bucket.is_none() && self.output.prefix.trim_matches('/').is_empty() {
            anyhow::bail!("output.prefix must not be empty when output.bucket is unset");
        }

        if self.kafka.event_topic.is_empty() {
            anyhow::bail!("kafka.event_topic must not be empty");
        }

        Ok(())
    }

    /// Region for the notification client
    pub fn notification_region(&self) -> &str {
        self.notification
            .region
            .as_deref()
            .unwrap_or(&self.s3.region)
    }
}

impl InputConfig {
    /// Delimiter as the byte the CSV reader expects
    pub fn delimiter_byte(&self) -> u8 {
        if self.csv_delimiter.is_ascii() {
            self.csv_delimiter as u8
        } else {
            b','
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_bootstrap_servers(),
            consumer_group: default_consumer_group(),
            event_topic: default_event_topic(),
            ssl_enabled: false,
            ssl_ca_location: None,
            sasl_username: None,
            sasl_password: None,
            auto_offset_reset: default_auto_offset_reset(),
            session_timeout_ms: default_session_timeout_ms(),
            max_poll_interval_ms: default_max_poll_interval_ms(),
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            prefix: default_output_prefix(),
            max_rows_per_chunk: default_max_rows_per_chunk(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            csv_delimiter: default_csv_delimiter(),
            sheet_name: None,
            archive_entry: None,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            topic_arn: None,
            region: None,
            subject_prefix: default_subject_prefix(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.output.max_rows_per_chunk, 10_000);
        assert_eq!(config.output.prefix, "output");
        assert!(config.output.bucket.is_none());
        assert!(config.notification.topic_arn.is_none());
        assert_eq!(config.cleaning.policy, CleaningPolicy::Passthrough);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial_sources() {
        let config: Config = config::Config::builder()
            .set_override("output.max_rows_per_chunk", 25)
            .unwrap()
            .set_override("input.csv_delimiter", ";")
            .unwrap()
            .set_override("cleaning.policy", "trim")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.output.max_rows_per_chunk, 25);
        assert_eq!(config.input.delimiter_byte(), b';');
        assert_eq!(config.cleaning.policy, CleaningPolicy::Trim);
        assert_eq!(config.kafka.event_topic, "chunker.bucket.events");
    }

    #[test]
    fn test_validate_rejects_non_ascii_delimiter() {
        let mut config = Config::default();
        config.input.csv_delimiter = '§';
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_root_output_in_source_bucket() {
        let mut config = Config::default();
        config.output.prefix = "/".to_string();
        assert!(config.validate().is_err());

        config.output.bucket = Some("chunks".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_notification_region_falls_back_to_s3() {
        let mut config = Config::default();
        assert_eq!(config.notification_region(), "us-east-1");
        config.notification.region = Some("eu-west-1".to_string());
        assert_eq!(config.notification_region(), "eu-west-1");
    }
}
