use classifier_common::avro::CodecError;
use classifier_common::schema_registry::RegistryError;
use rdkafka::error::KafkaError;
use thiserror::Error;

use crate::record::RecordError;

/// Errors while waiting for the next observation. None of them stop the pipeline.
#[derive(Error, Debug)]
pub enum RecvError {
    #[error("kafka error while receiving: {0}")]
    Kafka(#[from] KafkaError),
    #[error("received empty payload")]
    EmptyPayload,
    #[error("failed to decode record: {0}")]
    Decode(#[from] CodecError),
    #[error("record is malformed: {0}")]
    Malformed(#[from] RecordError),
}

impl RecvError {
    /// Whether the event itself was unusable, as opposed to the transport failing.
    pub fn is_malformed_event(&self) -> bool {
        !matches!(self, RecvError::Kafka(_))
    }
}

/// Why a single classification record was not delivered.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("failed to serialize record: {0}")]
    Serialization(#[from] CodecError),
    #[error("failed to produce record: {0}")]
    Kafka(#[from] KafkaError),
    #[error("delivery was cancelled before an acknowledgement arrived")]
    Cancelled,
}

/// Errors that prevent the service from starting. The pipeline itself never
/// returns these once it is running.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("failed to create kafka client: {0}")]
    Kafka(#[from] KafkaError),
    #[error("failed to resolve schema: {0}")]
    Registry(#[from] RegistryError),
    #[error("failed to load schema: {0}")]
    Schema(#[from] CodecError),
}
