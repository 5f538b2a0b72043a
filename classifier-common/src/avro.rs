//! Avro payloads framed the way Confluent serializers frame them: a zero magic byte,
//! the big-endian id of the writer schema in the registry, then the binary datum.

use apache_avro::types::Value;
use apache_avro::{from_avro_datum, from_value, to_avro_datum, to_value, Schema};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::schema_registry::RegisteredSchema;

const MAGIC_BYTE: u8 = 0;
const HEADER_LEN: usize = 5;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("payload of {0} bytes is too short for a framed avro message")]
    TruncatedFrame(usize),
    #[error("unknown magic byte {0}")]
    UnknownMagicByte(u8),
    #[error("invalid avro schema: {0}")]
    InvalidSchema(apache_avro::Error),
    #[error("value {value} of field {field} does not fit the schema's int type")]
    IntOutOfRange { field: String, value: i64 },
    #[error("avro error: {0}")]
    Avro(#[from] apache_avro::Error),
}

pub struct AvroCodec {
    schema_id: u32,
    schema: Schema,
}

impl AvroCodec {
    pub fn new(schema_id: u32, schema: &str) -> Result<Self, CodecError> {
        let schema = Schema::parse_str(schema).map_err(CodecError::InvalidSchema)?;
        Ok(Self { schema_id, schema })
    }

    pub fn from_registered(registered: &RegisteredSchema) -> Result<Self, CodecError> {
        Self::new(registered.id, &registered.schema)
    }

    pub fn schema_id(&self) -> u32 {
        self.schema_id
    }

    /// Decode a framed payload into `T`, reading the datum with this codec's schema.
    pub fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, CodecError> {
        if payload.len() < HEADER_LEN {
            return Err(CodecError::TruncatedFrame(payload.len()));
        }
        if payload[0] != MAGIC_BYTE {
            return Err(CodecError::UnknownMagicByte(payload[0]));
        }

        let writer_id = u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]);
        if writer_id != self.schema_id {
            debug!(
                "payload written with schema {}, decoding with {}",
                writer_id, self.schema_id
            );
        }

        let mut datum = &payload[HEADER_LEN..];
        let value = from_avro_datum(&self.schema, &mut datum, None)?;
        Ok(from_value::<T>(&value)?)
    }

    /// Encode `record` as a framed payload. The serialized value is resolved against the
    /// schema first so numeric widths follow the schema rather than the Rust type.
    /// A 64-bit value that does not fit an `int` field is rejected instead of narrowed.
    pub fn encode<T: Serialize>(&self, record: &T) -> Result<Vec<u8>, CodecError> {
        let value = to_value(record)?;
        check_int_widths(&value, &self.schema, "")?;
        let value = value.resolve(&self.schema)?;
        let datum = to_avro_datum(&self.schema, value)?;

        let mut payload = Vec::with_capacity(HEADER_LEN + datum.len());
        payload.push(MAGIC_BYTE);
        payload.extend_from_slice(&self.schema_id.to_be_bytes());
        payload.extend_from_slice(&datum);
        Ok(payload)
    }
}

/// Walk `value` alongside `schema` and fail on any long that an int field would truncate.
fn check_int_widths(value: &Value, schema: &Schema, field: &str) -> Result<(), CodecError> {
    match (value, schema) {
        (Value::Union(_, inner), _) => check_int_widths(inner, schema, field),
        (Value::Long(n), Schema::Int) => match i32::try_from(*n) {
            Ok(_) => Ok(()),
            Err(_) => Err(CodecError::IntOutOfRange {
                field: field.to_owned(),
                value: *n,
            }),
        },
        (Value::Long(_), Schema::Union(union)) => {
            let variants = union.variants();
            if variants.iter().any(|v| matches!(v, Schema::Long)) {
                return Ok(());
            }
            match variants.iter().find(|v| matches!(v, Schema::Int)) {
                Some(int) => check_int_widths(value, int, field),
                None => Ok(()),
            }
        }
        (Value::Record(values), Schema::Record(record)) => {
            for (name, value) in values {
                if let Some(field) = record.fields.iter().find(|f| &f.name == name) {
                    check_int_widths(value, &field.schema, name)?;
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
