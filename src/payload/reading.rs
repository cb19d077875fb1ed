//! Validated sensor reading record

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use super::error::ReadingError;

/// One of the four measured quantities carried by every reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
	/// Water temperature in °C
	Temperature,
	/// pH, dimensionless (0–14 nominal)
	Ph,
	/// Free chlorine concentration in mg/L
	Chlorine,
	/// Oxidation-reduction potential in mV
	Orp,
}

impl Field {
	/// All fields in wire order.
	pub const ALL: [Field; 4] =
		[Field::Temperature, Field::Ph, Field::Chlorine, Field::Orp];

	/// Key used by the structured (JSON) wire format.
	pub fn key(self) -> &'static str {
		match self {
			| Field::Temperature => "temperature",
			| Field::Ph => "ph",
			| Field::Chlorine => "chlorine",
			| Field::Orp => "orp",
		}
	}

	/// Resolves a lowercase key of the flat `key:value` format.
	pub fn from_alias(key: &str) -> Option<Self> {
		match key {
			| "temp" | "temperature" => Some(Field::Temperature),
			| "ph" => Some(Field::Ph),
			| "chlorine" | "cl" => Some(Field::Chlorine),
			| "orp" => Some(Field::Orp),
			| _ => None,
		}
	}

	fn index(self) -> usize {
		self as usize
	}
}

impl fmt::Display for Field {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.key())
	}
}

/// A complete, validated measurement set from a pool sensor.
///
/// All four numeric values are finite. Readings are immutable once built;
/// downstream consumers only ever see them read-only.
///
/// Serializes to the structured wire format, with an RFC 3339 UTC
/// timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
	id: Uuid,
	#[serde(serialize_with = "rfc3339")]
	timestamp: DateTime<Utc>,
	temperature: f64,
	ph: f64,
	chlorine: f64,
	orp: f64,
}

impl SensorReading {
	/// Builds a reading stamped now with a fresh identifier.
	pub fn new(
		temperature: f64,
		ph: f64,
		chlorine: f64,
		orp: f64,
	) -> Result<Self, ReadingError> {
		let mut values = Measurements::default();
		values.set(Field::Temperature, Some(temperature));
		values.set(Field::Ph, Some(ph));
		values.set(Field::Chlorine, Some(chlorine));
		values.set(Field::Orp, Some(orp));
		values
			.into_reading(Uuid::new_v4(), Utc::now())
			.map_err(ReadingError::NonFinite)
	}

	/// Replaces the identifier.
	pub fn with_id(mut self, id: Uuid) -> Self {
		self.id = id;
		self
	}

	/// Replaces the measurement time.
	pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
		self.timestamp = timestamp;
		self
	}

	/// Unique identifier of this reading
	pub fn id(&self) -> Uuid {
		self.id
	}

	/// Point in time the measurement was taken (or ingested, if the
	/// payload carried no usable time)
	pub fn timestamp(&self) -> DateTime<Utc> {
		self.timestamp
	}

	/// Water temperature in °C
	pub fn temperature(&self) -> f64 {
		self.temperature
	}

	/// pH value
	pub fn ph(&self) -> f64 {
		self.ph
	}

	/// Free chlorine in mg/L
	pub fn chlorine(&self) -> f64 {
		self.chlorine
	}

	/// Oxidation-reduction potential in mV
	pub fn orp(&self) -> f64 {
		self.orp
	}

	/// Value of a single field.
	pub fn value(&self, field: Field) -> f64 {
		match field {
			| Field::Temperature => self.temperature,
			| Field::Ph => self.ph,
			| Field::Chlorine => self.chlorine,
			| Field::Orp => self.orp,
		}
	}
}

fn rfc3339<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where S: Serializer {
	serializer
		.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Partially collected field values while a payload is being decoded.
#[derive(Debug, Default)]
pub(crate) struct Measurements {
	values: [Option<f64>; 4],
}

impl Measurements {
	/// Stores (or clears) a value; non-finite numbers count as absent.
	pub(crate) fn set(&mut self, field: Field, value: Option<f64>) {
		self.values[field.index()] = value.filter(|v| v.is_finite());
	}

	pub(crate) fn get(&self, field: Field) -> Option<f64> {
		self.values[field.index()]
	}

	/// Finishes the reading, or names the first field still missing.
	pub(crate) fn into_reading(
		self,
		id: Uuid,
		timestamp: DateTime<Utc>,
	) -> Result<SensorReading, Field> {
		let value = |field: Field| self.get(field).ok_or(field);
		Ok(SensorReading {
			id,
			timestamp,
			temperature: value(Field::Temperature)?,
			ph: value(Field::Ph)?,
			chlorine: value(Field::Chlorine)?,
			orp: value(Field::Orp)?,
		})
	}
}
