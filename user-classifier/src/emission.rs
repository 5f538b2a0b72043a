use async_trait::async_trait;
use classifier_common::avro::AvroCodec;
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::{debug, error, info_span, Instrument};

use crate::config::OUTPUT_TOPIC;
use crate::error::DeliveryError;
use crate::kafka::KafkaContext;
use crate::record::{ClusterAssignment, UserLabeling};

/// What happened to one published classification record.
#[derive(Debug)]
pub enum DeliveryOutcome {
    Delivered {
        entity_id: String,
        topic: String,
        partition: i32,
        offset: i64,
    },
    Failed {
        entity_id: String,
        error: DeliveryError,
    },
}

impl DeliveryOutcome {
    pub fn entity_id(&self) -> &str {
        match self {
            DeliveryOutcome::Delivered { entity_id, .. } => entity_id,
            DeliveryOutcome::Failed { entity_id, .. } => entity_id,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Publishes a full set of assignments and waits until every record is either
/// acknowledged or has failed. Outcomes are returned in assignment order.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, assignments: &[ClusterAssignment]) -> Vec<DeliveryOutcome>;
}

/// Receives every delivery outcome once the publish it belongs to has completed.
pub trait DeliveryReporter: Send + Sync {
    fn report(&self, outcome: &DeliveryOutcome);
}

impl<F> DeliveryReporter for F
where
    F: Fn(&DeliveryOutcome) + Send + Sync,
{
    fn report(&self, outcome: &DeliveryOutcome) {
        self(outcome)
    }
}

/// Logs each outcome and counts it. Failures are not retried: the next cycle
/// republishes every entity anyway.
pub struct LogReporter;

impl DeliveryReporter for LogReporter {
    fn report(&self, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered {
                entity_id,
                topic,
                partition,
                offset,
            } => {
                metrics::counter!("user_classifier_deliveries_total", "outcome" => "delivered")
                    .increment(1);
                debug!(
                    "user record {} successfully produced to {} [{}] at offset {}",
                    entity_id, topic, partition, offset
                );
            }
            DeliveryOutcome::Failed { entity_id, error } => {
                metrics::counter!("user_classifier_deliveries_total", "outcome" => "failed")
                    .increment(1);
                error!("delivery failed for user record {}: {}", entity_id, error);
            }
        }
    }
}

/// Publishes assignments as Avro `UserLabeling` records keyed by entity id.
pub struct KafkaPublisher {
    producer: FutureProducer<KafkaContext>,
    codec: AvroCodec,
}

impl KafkaPublisher {
    pub fn new(producer: FutureProducer<KafkaContext>, codec: AvroCodec) -> Self {
        Self { producer, codec }
    }

    fn enqueue(
        &self,
        assignment: &ClusterAssignment,
    ) -> Result<rdkafka::producer::DeliveryFuture, DeliveryError> {
        let payload = self.codec.encode(&UserLabeling::from(assignment))?;
        let record = FutureRecord::to(OUTPUT_TOPIC)
            .key(assignment.entity_id.as_str())
            .payload(&payload);

        self.producer
            .send_result(record)
            .map_err(|(e, _)| DeliveryError::Kafka(e))
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, assignments: &[ClusterAssignment]) -> Vec<DeliveryOutcome> {
        // Everything goes into the producer queue first so acks are awaited concurrently.
        let pending: Vec<_> = assignments
            .iter()
            .map(|assignment| (assignment.entity_id.clone(), self.enqueue(assignment)))
            .collect();

        async move {
            let mut outcomes = Vec::with_capacity(pending.len());
            for (entity_id, enqueued) in pending {
                let outcome = match enqueued {
                    Err(error) => DeliveryOutcome::Failed { entity_id, error },
                    Ok(delivery) => match delivery.await {
                        Ok(Ok((partition, offset))) => DeliveryOutcome::Delivered {
                            entity_id,
                            topic: OUTPUT_TOPIC.to_string(),
                            partition,
                            offset,
                        },
                        Ok(Err((e, _))) => DeliveryOutcome::Failed {
                            entity_id,
                            error: DeliveryError::Kafka(e),
                        },
                        Err(_) => DeliveryOutcome::Failed {
                            entity_id,
                            error: DeliveryError::Cancelled,
                        },
                    },
                };
                outcomes.push(outcome);
            }
            outcomes
        }
        .instrument(info_span!("ack_wait_many"))
        .await
    }
}

#[cfg(test)]
mod tests {
    use rdkafka::mocking::MockCluster;
    use rdkafka::producer::DefaultProducerContext;
    use rdkafka::types::{RDKafkaApiKey, RDKafkaRespErr};

    use super::*;
    use crate::config::KafkaConfig;
    use crate::kafka::create_kafka_producer;

    const SCHEMA: &str = r#"
    {
        "type": "record",
        "name": "UserLabeling",
        "fields": [
            {"name": "user_id", "type": "string"},
            {"name": "total_amount", "type": "double"},
            {"name": "num_transactions", "type": "int"},
            {"name": "label", "type": "int"}
        ]
    }"#;

    fn assignment(entity_id: &str, label: usize) -> ClusterAssignment {
        ClusterAssignment {
            entity_id: entity_id.to_string(),
            total: 10.0,
            count: 2,
            label,
        }
    }

    fn mocked_kafka_config(cluster: &MockCluster<'static, DefaultProducerContext>) -> KafkaConfig {
        KafkaConfig {
            kafka_hosts: cluster.bootstrap_servers(),
            kafka_tls: false,
            kafka_producer_linger_ms: 0,
            kafka_producer_queue_mib: 50,
            kafka_message_timeout_ms: 2000,
            kafka_compression_codec: "none".to_string(),
            kafka_consumer_offset_reset: "earliest".to_string(),
        }
    }

    fn start_on_mocked_publisher(
        schema: &str,
    ) -> (MockCluster<'static, DefaultProducerContext>, KafkaPublisher) {
        let cluster = MockCluster::new(1).expect("failed to create mock brokers");
        let producer = create_kafka_producer(&mocked_kafka_config(&cluster))
            .expect("failed to create producer");
        let codec = AvroCodec::new(1, schema).expect("failed to parse schema");
        (cluster, KafkaPublisher::new(producer, codec))
    }

    #[tokio::test]
    async fn kafka_publisher_reports_every_record() {
        let (cluster, publisher) = start_on_mocked_publisher(SCHEMA);
        let assignments = vec![assignment("a", 0), assignment("b", 1), assignment("c", 0)];

        // Wait for the producer to be healthy before asserting on outcomes
        for _ in 0..20 {
            let outcomes = publisher.publish(&assignments[..1]).await;
            if outcomes.iter().all(DeliveryOutcome::is_delivered) {
                break;
            }
        }

        let outcomes = publisher.publish(&assignments).await;
        assert_eq!(outcomes.len(), 3);
        let ids: Vec<&str> = outcomes.iter().map(DeliveryOutcome::entity_id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        for outcome in &outcomes {
            match outcome {
                DeliveryOutcome::Delivered { topic, .. } => assert_eq!(topic, OUTPUT_TOPIC),
                DeliveryOutcome::Failed { error, .. } => panic!("unexpected failure: {}", error),
            }
        }

        // Unretriable broker errors are reported per record, not raised
        cluster.clear_request_errors(RDKafkaApiKey::Produce);
        let err = [RDKafkaRespErr::RD_KAFKA_RESP_ERR_MSG_SIZE_TOO_LARGE; 1];
        cluster.request_errors(RDKafkaApiKey::Produce, &err);
        let outcomes = publisher.publish(&assignments[..1]).await;
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0],
            DeliveryOutcome::Failed {
                error: DeliveryError::Kafka(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn serialization_failures_do_not_stop_other_records() {
        // A schema the record cannot satisfy.
        let (_cluster, publisher) = start_on_mocked_publisher(
            r#"{"type": "record", "name": "Other", "fields": [{"name": "missing", "type": "string"}]}"#,
        );

        let outcomes = publisher
            .publish(&[assignment("a", 0), assignment("b", 1)])
            .await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| matches!(
            o,
            DeliveryOutcome::Failed {
                error: DeliveryError::Serialization(_),
                ..
            }
        )));
    }
}
