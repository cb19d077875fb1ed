use thiserror::Error;

use super::reading::Field;

/// Why the structured (JSON) decoder rejected a payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuredError {
	/// Payload is not syntactically valid JSON
	#[error("malformed JSON: {0}")]
	Malformed(String),
	/// Payload is valid JSON but not an object
	#[error("payload is not a JSON object")]
	NotAnObject,
	/// A required measurement is absent or null
	#[error("missing field `{0}`")]
	MissingField(Field),
	/// A required measurement is present but not a number
	#[error("field `{0}` is not a number")]
	NonNumeric(Field),
}

/// Why the flat `key:value` decoder rejected a payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FallbackError {
	/// Payload bytes are not UTF-8 text
	#[error("payload is not valid UTF-8")]
	NotUtf8,
	/// A required measurement is absent or has no numeric value
	#[error("missing or non-numeric `{0}`")]
	MissingField(Field),
}

/// Payload could not be turned into a reading by any supported format
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
	/// Payload is empty or whitespace only
	#[error("empty payload")]
	Empty,
	/// Both the structured and the fallback decoder failed
	#[error(
		"unrecognized payload (structured: {structured}; key-value: \
		 {fallback})"
	)]
	Rejected {
		/// Failure of the primary JSON path
		structured: StructuredError,
		/// Failure of the fallback `key:value` path
		fallback: FallbackError,
	},
}

/// Invalid values passed to [`super::SensorReading::new`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadingError {
	/// NaN or infinite measurement
	#[error("`{0}` must be a finite number")]
	NonFinite(Field),
}
