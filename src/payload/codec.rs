//! Wire formats for sensor readings.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::error::{FallbackError, StructuredError};
use super::reading::{Field, Measurements, SensorReading};
use super::timestamp;

/// Trait for encoding and decoding sensor readings in one wire format.
///
/// Implement this trait to teach the parser another payload encoding.
pub trait PayloadCodec: Default + Clone + Send + Sync + 'static {
	/// Error type for decoding failures
	type DecodeError: std::error::Error + Debug + Clone + Send + Sync + 'static;

	/// Render a reading in this format
	fn encode(&self, reading: &SensorReading) -> Vec<u8>;

	/// Decode a payload. `received_at` stands in for any time the payload
	/// does not carry.
	fn decode(
		&self,
		bytes: &[u8],
		received_at: DateTime<Utc>,
	) -> Result<SensorReading, Self::DecodeError>;
}

/// Primary structured format: a JSON object with numeric `temperature`,
/// `ph`, `chlorine`, `orp` and optional `id` / `timestamp`.
#[derive(Debug, Clone, Default)]
pub struct JsonCodec;

impl JsonCodec {
	/// Creates a new codec.
	pub fn new() -> Self {
		Self
	}
}

impl PayloadCodec for JsonCodec {
	type DecodeError = StructuredError;

	fn encode(&self, reading: &SensorReading) -> Vec<u8> {
		// Only strings and finite numbers, so serializing cannot fail.
		serde_json::to_vec(reading).unwrap_or_default()
	}

	fn decode(
		&self,
		bytes: &[u8],
		received_at: DateTime<Utc>,
	) -> Result<SensorReading, StructuredError> {
		let value: Value = serde_json::from_slice(bytes)
			.map_err(|e| StructuredError::Malformed(e.to_string()))?;
		let Value::Object(object) = value else {
			return Err(StructuredError::NotAnObject);
		};

		let mut values = Measurements::default();
		for field in Field::ALL {
			values.set(field, Some(numeric_field(&object, field)?));
		}

		let id = object
			.get("id")
			.and_then(Value::as_str)
			.and_then(|id| Uuid::parse_str(id.trim()).ok())
			.unwrap_or_else(Uuid::new_v4);
		let timestamp = timestamp::resolve(object.get("timestamp"), received_at);

		values
			.into_reading(id, timestamp)
			.map_err(StructuredError::NonNumeric)
	}
}

fn numeric_field(
	object: &Map<String, Value>,
	field: Field,
) -> Result<f64, StructuredError> {
	match object.get(field.key()) {
		| None | Some(Value::Null) => Err(StructuredError::MissingField(field)),
		| Some(Value::Number(number)) => number
			.as_f64()
			.filter(|v| v.is_finite())
			.ok_or(StructuredError::NonNumeric(field)),
		| Some(_) => Err(StructuredError::NonNumeric(field)),
	}
}

/// Fallback flat format: `temp:24.5,ph:7.2,chlorine:1.8,orp:685`.
///
/// Keys are case-insensitive, whitespace around keys and values is ignored,
/// unknown keys are skipped. The last occurrence of a key wins, and a
/// non-numeric value clears it.
#[derive(Debug, Clone, Default)]
pub struct KeyValueCodec;

impl KeyValueCodec {
	/// Creates a new codec.
	pub fn new() -> Self {
		Self
	}
}

impl PayloadCodec for KeyValueCodec {
	type DecodeError = FallbackError;

	fn encode(&self, reading: &SensorReading) -> Vec<u8> {
		Field::ALL
			.iter()
			.map(|field| format!("{}:{}", field.key(), reading.value(*field)))
			.collect::<Vec<_>>()
			.join(",")
			.into_bytes()
	}

	fn decode(
		&self,
		bytes: &[u8],
		received_at: DateTime<Utc>,
	) -> Result<SensorReading, FallbackError> {
		let text =
			std::str::from_utf8(bytes).map_err(|_| FallbackError::NotUtf8)?;

		let mut values = Measurements::default();
		for pair in text.split(',') {
			let mut parts = pair.split(':');
			let (Some(key), Some(value), None) =
				(parts.next(), parts.next(), parts.next())
			else {
				continue;
			};
			let Some(field) = Field::from_alias(&key.trim().to_lowercase())
			else {
				continue;
			};
			values.set(field, value.trim().parse::<f64>().ok());
		}

		values
			.into_reading(Uuid::new_v4(), received_at)
			.map_err(FallbackError::MissingField)
	}
}
