//! Two-tier payload parser

use chrono::{DateTime, Utc};
use tracing::trace;

use super::codec::{JsonCodec, KeyValueCodec, PayloadCodec};
use super::error::ParseError;
use super::reading::SensorReading;

/// Decodes raw message bodies into [`SensorReading`]s.
///
/// The structured JSON format is tried first. Only if it fails is the
/// payload read as a flat `key:value` list. If both fail the payload is
/// rejected with the reason from each path.
#[derive(Debug, Clone, Default)]
pub struct PayloadParser {
	structured: JsonCodec,
	fallback: KeyValueCodec,
}

impl PayloadParser {
	/// Creates a parser with the standard formats.
	pub fn new() -> Self {
		Self::default()
	}

	/// Parses a payload, using the current time as ingestion time.
	pub fn parse(
		&self,
		payload: impl AsRef<[u8]>,
	) -> Result<SensorReading, ParseError> {
		self.parse_at(payload, Utc::now())
	}

	/// Parses a payload received at `received_at`.
	pub fn parse_at(
		&self,
		payload: impl AsRef<[u8]>,
		received_at: DateTime<Utc>,
	) -> Result<SensorReading, ParseError> {
		let payload = payload.as_ref();
		if payload.iter().all(u8::is_ascii_whitespace) {
			return Err(ParseError::Empty);
		}

		let structured = match self.structured.decode(payload, received_at) {
			| Ok(reading) => return Ok(reading),
			| Err(err) => err,
		};
		trace!(error = %structured, "Structured decode failed, trying key-value format");

		self.fallback
			.decode(payload, received_at)
			.map_err(|fallback| ParseError::Rejected {
				structured,
				fallback,
			})
	}
}

/// Parses a payload with a default [`PayloadParser`].
pub fn parse_payload(
	payload: impl AsRef<[u8]>,
) -> Result<SensorReading, ParseError> {
	PayloadParser::new().parse(payload)
}
