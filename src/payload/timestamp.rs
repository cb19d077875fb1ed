//! Lenient timestamp resolution for structured payloads
//!
//! A reading with an unusable timestamp is still a valid reading: anything
//! that cannot be interpreted falls back to the ingestion time.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::warn;

/// Offset-less layouts, read as UTC. `%.f` also matches no fraction at all.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

pub(crate) fn resolve(
	value: Option<&Value>,
	received_at: DateTime<Utc>,
) -> DateTime<Utc> {
	match value {
		| None | Some(Value::Null) => received_at,
		| Some(Value::String(text)) => parse_text(text).unwrap_or_else(|| {
			warn!(timestamp = %text, "Unrecognized timestamp format, using ingestion time");
			received_at
		}),
		| Some(Value::Number(number)) => {
			let resolved = match number.as_i64() {
				| Some(secs) => DateTime::from_timestamp(secs, 0),
				| None => number.as_f64().and_then(from_epoch_seconds),
			};
			resolved.unwrap_or_else(|| {
				warn!(timestamp = %number, "Epoch timestamp out of range, using ingestion time");
				received_at
			})
		}
		| Some(other) => {
			warn!(timestamp = %other, "Unsupported timestamp type, using ingestion time");
			received_at
		}
	}
}

pub(crate) fn parse_text(text: &str) -> Option<DateTime<Utc>> {
	let text = text.trim();
	if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
		return Some(parsed.with_timezone(&Utc));
	}
	NAIVE_FORMATS
		.iter()
		.find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
		.map(|naive| naive.and_utc())
}

pub(crate) fn from_epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
	if !secs.is_finite() || secs.abs() >= i64::MAX as f64 {
		return None;
	}
	let whole = secs.floor();
	let nanos = ((secs - whole) * 1e9).round() as u32;
	let (whole, nanos) = if nanos >= 1_000_000_000 {
		(whole + 1.0, 0)
	} else {
		(whole, nanos)
	};
	DateTime::from_timestamp(whole as i64, nanos)
}
