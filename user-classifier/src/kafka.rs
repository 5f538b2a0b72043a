use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::producer::FutureProducer;
use rdkafka::ClientConfig;
use tracing::debug;

use crate::config::KafkaConfig;

pub struct KafkaContext;

impl rdkafka::ClientContext for KafkaContext {
    fn stats(&self, stats: rdkafka::Statistics) {
        metrics::gauge!("user_classifier_kafka_callback_queue_depth").set(stats.replyq as f64);
        metrics::gauge!("user_classifier_kafka_producer_queue_depth").set(stats.msg_cnt as f64);
        metrics::gauge!("user_classifier_kafka_producer_queue_depth_limit")
            .set(stats.msg_max as f64);

        for (_, stats) in stats.brokers {
            let id_string = format!("{}", stats.nodeid);
            metrics::gauge!(
                "user_classifier_kafka_broker_requests_pending",
                "broker" => id_string.clone()
            )
            .set(stats.outbuf_cnt as f64);
            metrics::counter!(
                "user_classifier_kafka_broker_tx_errors_total",
                "broker" => id_string
            )
            .absolute(stats.txerrs);
        }
    }
}

fn base_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_hosts)
        .set("statistics.interval.ms", "10000");

    if config.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    };

    client_config
}

pub fn create_kafka_producer(
    config: &KafkaConfig,
) -> Result<FutureProducer<KafkaContext>, KafkaError> {
    let mut client_config = base_client_config(config);
    client_config
        .set("linger.ms", config.kafka_producer_linger_ms.to_string())
        .set(
            "message.timeout.ms",
            config.kafka_message_timeout_ms.to_string(),
        )
        .set(
            "compression.codec",
            config.kafka_compression_codec.to_owned(),
        )
        .set(
            "queue.buffering.max.kbytes",
            (config.kafka_producer_queue_mib * 1024).to_string(),
        );

    debug!("rdkafka producer configuration: {:?}", client_config);
    let producer: FutureProducer<KafkaContext> =
        client_config.create_with_context(KafkaContext)?;

    Ok(producer)
}

/// Create a consumer in `group` already subscribed to `topic`.
pub fn create_kafka_consumer(
    config: &KafkaConfig,
    group: &str,
    topic: &str,
) -> Result<StreamConsumer, KafkaError> {
    let mut client_config = base_client_config(config);
    client_config
        .set("group.id", group)
        .set("auto.offset.reset", &config.kafka_consumer_offset_reset)
        .set("enable.auto.commit", "true");

    debug!("rdkafka consumer configuration: {:?}", client_config);
    let consumer: StreamConsumer = client_config.create()?;
    consumer.subscribe(&[topic])?;

    Ok(consumer)
}
