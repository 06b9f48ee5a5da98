use std::sync::Arc;

use anyhow::Context;
use envconfig::Envconfig;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use common_kafka::kafka_consumer::create_manual_commit_consumer;
use common_kafka::kafka_producer::create_kafka_producer;
use ingest_worker::config::Config;
use ingest_worker::consumer::BatchingConsumer;
use ingest_worker::dead_letter::KafkaDeadLetterPublisher;
use ingest_worker::handlers::{Stage, StageHandler};
use ingest_worker::serve_metrics::{health_router, serve, setup_metrics_routes};
use ingest_worker::{ConsumerWorker, DispatchRegistry, MessageHandler, TaskRouter};

fn setup_tracing() -> anyhow::Result<()> {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy()
            .add_directive("rdkafka=warn".parse()?),
    );
    tracing_subscriber::registry().with(log_layer).init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing()?;
    info!("Starting ingest worker...");

    let config = Config::init_from_env().context("failed to load configuration")?;
    info!(
        concurrency = config.concurrency,
        queue_capacity = config.queue_capacity,
        max_batch_size = config.max_batch_size,
        max_batch_time_ms = config.max_batch_time_ms,
        group_id = config.consumer.kafka_consumer_group,
        "Configuration loaded"
    );

    let bind = config.bind_address();
    let router = setup_metrics_routes(health_router()).context("failed to install metrics")?;
    tokio::spawn(async move {
        if let Err(e) = serve(router, &bind).await {
            error!(error = ?e, bind, "Health server stopped");
        }
    });

    let [preprocess, process, save] = config.stage_keys();
    let handler = |stage| -> Arc<dyn MessageHandler> { Arc::new(StageHandler::new(stage)) };
    let registry = DispatchRegistry::build(
        &config.kafka_topics,
        [
            (preprocess, handler(Stage::Preprocess)),
            (process, handler(Stage::Process)),
            (save, handler(Stage::Save)),
        ],
    )?;
    let topics = registry.topics();
    info!(topics = ?topics, "Dispatch registry built");

    let consumer = create_manual_commit_consumer(&config.kafka, &config.consumer, &topics)
        .context("failed to create kafka consumer")?;

    let producer = create_kafka_producer(&config.kafka)
        .await
        .context("failed to create dead-letter producer")?;
    let publisher = KafkaDeadLetterPublisher::new(producer, config.dead_letter_timeout());

    let task_router = TaskRouter::new(Arc::new(registry), Arc::new(publisher));
    let worker = ConsumerWorker::new(Arc::new(task_router), config.pool_config())?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!(error = ?e, "Failed to listen for shutdown signal"),
        }
        let _ = shutdown_tx.send(true);
    });

    BatchingConsumer::new(
        consumer,
        worker,
        config.max_batch_size,
        config.max_batch_time(),
    )
    .run(shutdown_rx)
    .await?;

    info!("Ingest worker stopped");
    Ok(())
}
