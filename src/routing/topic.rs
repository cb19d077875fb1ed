//! Topic string validation

use thiserror::Error;

/// Maximum topic length accepted by the MQTT protocol
pub const MAX_TOPIC_LENGTH: usize = 65535;

/// A topic string the transport must not be asked to use
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid topic '{topic}': {reason}")]
pub struct TopicError {
	/// Offending topic
	pub topic: String,
	/// Human-readable explanation
	pub reason: &'static str,
}

impl TopicError {
	fn invalid(topic: &str, reason: &'static str) -> Self {
		Self {
			topic: topic.to_string(),
			reason,
		}
	}
}

/// Validates a subscription filter. Wildcards are allowed as whole levels,
/// `#` only as the last one.
pub fn validate_topic_filter(topic: &str) -> Result<(), TopicError> {
	validate_common(topic)?;
	let mut levels = topic.split('/').peekable();
	while let Some(level) = levels.next() {
		let has_wildcard = level.contains(['+', '#']);
		if has_wildcard && level.len() != 1 {
			return Err(TopicError::invalid(
				topic,
				"wildcards must occupy a whole topic level",
			));
		}
		if level == "#" && levels.peek().is_some() {
			return Err(TopicError::invalid(
				topic,
				"'#' is only allowed as the last topic level",
			));
		}
	}
	Ok(())
}

/// Validates a concrete topic for publishing.
pub fn validate_publish_topic(topic: &str) -> Result<(), TopicError> {
	validate_common(topic)?;
	if topic.contains(['+', '#']) {
		return Err(TopicError::invalid(
			topic,
			"publish topics cannot contain wildcards ('+' or '#')",
		));
	}
	Ok(())
}

fn validate_common(topic: &str) -> Result<(), TopicError> {
	if topic.is_empty() || topic.len() > MAX_TOPIC_LENGTH {
		return Err(TopicError::invalid(topic, "topic is empty or too long"));
	}
	if topic.contains('\0') {
		return Err(TopicError::invalid(topic, "topic contains a null byte"));
	}
	Ok(())
}
