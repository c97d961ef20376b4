use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use chunker_service::{
    Config, EventConsumer, NotificationSink, Pipeline, PipelineSettings, S3ObjectStore,
    SnsNotifier,
};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Chunker Service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;

    let store = Arc::new(S3ObjectStore::new(&aws_config, &config.s3));

    let sink = match &config.notification.topic_arn {
        Some(topic_arn) => NotificationSink::new(
            Arc::new(SnsNotifier::new(
                &aws_config,
                config.notification_region(),
                topic_arn.clone(),
            )),
            config.notification.subject_prefix.clone(),
        ),
        None => {
            warn!("No notification topic configured, failures will only be logged");
            NotificationSink::disabled()
        }
    };

    let pipeline = Arc::new(Pipeline::new(
        store,
        config.cleaning.policy.build(),
        sink,
        PipelineSettings::from_config(&config),
    ));

    // Create Kafka consumer
    let consumer = EventConsumer::new(&config.kafka, pipeline)
        .context("Failed to initialize Kafka consumer")?;

    // Spawn Kafka consumer task
    let shutdown = CancellationToken::new();
    let consumer_shutdown = shutdown.clone();
    let consumer_handle = tokio::spawn(async move {
        if let Err(e) = consumer.run(consumer_shutdown).await {
            error!(error = %e, "Kafka consumer error");
        }
    });

    info!(
        max_rows_per_chunk = config.output.max_rows_per_chunk,
        output_prefix = %config.output.prefix,
        cleaning_policy = ?config.cleaning.policy,
        "Chunker service started successfully"
    );

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down chunker service");

    // Let the in-flight invocation reach a terminal state
    shutdown.cancel();
    if let Err(e) = consumer_handle.await {
        error!(error = %e, "Kafka consumer task panicked");
    }

    info!("Chunker service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
