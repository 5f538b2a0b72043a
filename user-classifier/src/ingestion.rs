use std::time::Duration;

use async_trait::async_trait;
use classifier_common::avro::AvroCodec;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;
use tracing::debug;

use crate::error::RecvError;
use crate::record::{Observation, TransactionsAggregate};

/// A stream of observations, consumed one event at a time.
#[async_trait]
pub trait ObservationSource: Send {
    /// Wait at most `timeout` for the next event. `Ok(None)` means nothing arrived in time.
    async fn next_observation(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Observation>, RecvError>;

    /// Stop consuming. No further calls to `next_observation` are made afterwards.
    fn close(&mut self) {}
}

/// Observations read from an Avro-encoded Kafka topic.
pub struct KafkaObservationSource {
    consumer: StreamConsumer,
    codec: AvroCodec,
}

impl KafkaObservationSource {
    pub fn new(consumer: StreamConsumer, codec: AvroCodec) -> Self {
        Self { consumer, codec }
    }
}

/// Turn a raw record value into an observation, rejecting anything unusable.
fn decode_observation(
    codec: &AvroCodec,
    payload: Option<&[u8]>,
) -> Result<Observation, RecvError> {
    let payload = payload.ok_or(RecvError::EmptyPayload)?;
    let record: TransactionsAggregate = codec.decode(payload)?;

    Ok(Observation::try_from(record)?)
}

#[async_trait]
impl ObservationSource for KafkaObservationSource {
    async fn next_observation(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Observation>, RecvError> {
        let message = match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => return Ok(None),
            Ok(received) => received?,
        };

        debug!(
            "received record key={:?} from {} [{}] at offset {}",
            message.key().map(String::from_utf8_lossy),
            message.topic(),
            message.partition(),
            message.offset()
        );

        decode_observation(&self.codec, message.payload()).map(Some)
    }

    fn close(&mut self) {
        debug!("unsubscribing consumer");
        self.consumer.unsubscribe();
    }
}
