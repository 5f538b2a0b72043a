//! Label users from their aggregated transactions, republishing every label on each update.
use envconfig::Envconfig;
use eyre::Result;
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use classifier_common::metrics::{app, serve, setup_metrics_recorder};
use classifier_common::schema_registry::HttpSchemaRegistry;
use user_classifier::config::Config;
use user_classifier::service::build_pipeline;

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    tracing::info!("Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::init_from_env().expect("Invalid configuration:");
    tracing::info!(
        bind = %config.bind(),
        input_topic = config.input_topic.as_str(),
        consumer_group = config.consumer_group.as_str(),
        n_clusters = config.n_clusters.get(),
        poll_interval = ?config.poll_interval.0,
        kmeans_seed = config.kmeans.kmeans_seed,
        kmeans_max_iterations = config.kmeans.kmeans_max_iterations,
        kmeans_tolerance = config.kmeans.kmeans_tolerance,
        schema_registry = %config.redacted_registry_url(),
        schema_registry_auth = config.schema_registry_basic_auth.is_some(),
        kafka_hosts = %config.kafka.kafka_hosts,
        "starting user-classifier"
    );

    let recorder_handle = if config.export_prometheus {
        Some(setup_metrics_recorder()?)
    } else {
        None
    };
    let bind = config.bind();
    tokio::task::spawn(async move {
        let router = app("user-classifier", recorder_handle);
        if let Err(e) = serve(router, &bind).await {
            tracing::error!("failed to start user-classifier http server, {}", e);
        }
    });

    let registry = HttpSchemaRegistry::new(
        &config.schema_registry_url,
        config.schema_registry_basic_auth.as_deref(),
        config.schema_registry_timeout.0,
    )?;
    let mut pipeline = build_pipeline(&config, &registry).await?;

    pipeline.run(shutdown()).await;

    tracing::info!(
        "stopped after tracking {} users",
        pipeline.store().len()
    );
    Ok(())
}
