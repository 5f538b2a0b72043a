use classifier_common::avro::AvroCodec;
use classifier_common::schema_registry::SchemaRegistry;
use tracing::info;

use crate::clustering::KMeansClassifier;
use crate::config::{Config, OUTPUT_TOPIC};
use crate::emission::{KafkaPublisher, LogReporter};
use crate::error::StartupError;
use crate::ingestion::KafkaObservationSource;
use crate::kafka::{create_kafka_consumer, create_kafka_producer};
use crate::pipeline::Pipeline;
use crate::store::StateStore;

pub type KafkaPipeline =
    Pipeline<KafkaObservationSource, KMeansClassifier, KafkaPublisher, LogReporter>;

/// Resolve both topic schemas and connect the consumer and producer.
pub async fn build_pipeline<R>(config: &Config, registry: &R) -> Result<KafkaPipeline, StartupError>
where
    R: SchemaRegistry + ?Sized,
{
    let input_topic = config.input_topic.as_str();

    let input_schema = registry.get_latest_schema(input_topic).await?;
    info!(
        "resolved schema {} (version {}) for {}: {}",
        input_schema.id, input_schema.version, input_topic, input_schema.schema
    );
    let output_schema = registry.get_latest_schema(OUTPUT_TOPIC).await?;
    info!(
        "resolved schema {} (version {}) for {}",
        output_schema.id, output_schema.version, OUTPUT_TOPIC
    );

    let input_codec = AvroCodec::from_registered(&input_schema)?;
    let output_codec = AvroCodec::from_registered(&output_schema)?;

    let consumer = create_kafka_consumer(
        &config.kafka,
        config.consumer_group.as_str(),
        input_topic,
    )?;
    let producer = create_kafka_producer(&config.kafka)?;

    let source = KafkaObservationSource::new(consumer, input_codec);
    let publisher = KafkaPublisher::new(producer, output_codec);
    let classifier = KMeansClassifier::new(config.n_clusters, &config.kmeans);

    info!(
        "consuming {} as {}, publishing {} groups to {}",
        input_topic,
        config.consumer_group.as_str(),
        classifier.n_clusters(),
        OUTPUT_TOPIC
    );

    Ok(Pipeline::new(
        source,
        classifier,
        publisher,
        LogReporter,
        StateStore::new(),
        config.poll_interval.0,
    ))
}
