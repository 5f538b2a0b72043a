pub mod avro;
pub mod metrics;
pub mod schema_registry;
