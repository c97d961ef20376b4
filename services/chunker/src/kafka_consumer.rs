use crate::config::KafkaConfig;
use crate::pipeline::Pipeline;
use anyhow::{Context, Result};
use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Consumes bucket notifications from Kafka and drives one pipeline
/// invocation per message.
///
/// Messages are handled one at a time. The offset is committed once the
/// invocation reaches a terminal state, whether it succeeded or failed.
pub struct EventConsumer {
    consumer: StreamConsumer,
    pipeline: Arc<Pipeline>,
}

impl EventConsumer {
    /// Create a consumer subscribed to the bucket event topic
    pub fn new(config: &KafkaConfig, pipeline: Arc<Pipeline>) -> Result<Self> {
        let consumer: StreamConsumer = client_config(config)
            .create()
            .context("Failed to create Kafka consumer")?;

        consumer
            .subscribe(&[&config.event_topic])
            .context("Failed to subscribe to bucket event topic")?;

        info!(
            topic = %config.event_topic,
            group = %config.consumer_group,
            "Subscribed to Kafka topic"
        );

        Ok(Self { consumer, pipeline })
    }

    /// Consume until the token is cancelled or the stream ends
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!("Starting bucket event consumer");

        let mut message_stream = self.consumer.stream();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Received shutdown signal");
                    break;
                }
                message_result = message_stream.next() => {
                    match message_result {
                        Some(Ok(message)) => self.process_message(&message).await,
                        Some(Err(e)) => {
                            error!(error = %e, "Kafka consumer error");
                            metrics::counter!("chunker.kafka.errors").increment(1);
                        }
                        None => {
                            debug!("Message stream ended");
                            break;
                        }
                    }
                }
            }
        }

        if let Err(e) = self.consumer.commit_consumer_state(CommitMode::Sync) {
            warn!(error = %e, "Failed to commit offsets on shutdown");
        }

        Ok(())
    }

    #[instrument(skip(self, message), fields(partition = message.partition(), offset = message.offset()))]
    async fn process_message(&self, message: &BorrowedMessage<'_>) {
        let payload = message.payload().unwrap_or_default();

        let outcome = self.pipeline.handle_event(payload).await;

        if outcome.succeeded() {
            metrics::counter!("chunker.messages.processed").increment(1);
        } else {
            metrics::counter!("chunker.messages.failed").increment(1);
        }

        // Failures were already reported; redelivery would repeat partial writes
        if let Err(e) = self.consumer.commit_message(message, CommitMode::Async) {
            warn!(error = %e, "Failed to commit offset");
        }
    }
}

/// librdkafka settings for the notification consumer
fn client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();

    client_config
        .set("bootstrap.servers", &config.bootstrap_servers)
        .set("group.id", &config.consumer_group)
        .set("auto.offset.reset", &config.auto_offset_reset)
        .set("enable.auto.commit", "false")
        .set("session.timeout.ms", config.session_timeout_ms.to_string())
        .set("max.poll.interval.ms", config.max_poll_interval_ms.to_string());

    // Configure SSL if enabled
    if config.ssl_enabled {
        client_config.set("security.protocol", "SASL_SSL");
        if let Some(ref ca_location) = config.ssl_ca_location {
            client_config.set("ssl.ca.location", ca_location);
        }
    }

    // Configure SASL if credentials provided
    if let (Some(ref username), Some(ref password)) = (&config.sasl_username, &config.sasl_password) {
        client_config
            .set("sasl.mechanisms", "PLAIN")
            .set("sasl.username", username)
            .set("sasl.password", password);
    }

    client_config
}
