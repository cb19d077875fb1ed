use super::topic::{validate_publish_topic, validate_topic_filter};

#[test]
fn test_valid_filters() {
	for topic in [
		"pool/1/data",
		"pool/+/data",
		"pool/#",
		"#",
		"+",
		"/leading/slash",
		"sensors/+/+/temperature",
	] {
		assert!(
			validate_topic_filter(topic).is_ok(),
			"filter '{topic}' rejected"
		);
	}
}

#[test]
fn test_invalid_filters() {
	for topic in ["", "pool/#/data", "pool/data#", "pool/+x/data", "a\0b"] {
		assert!(
			validate_topic_filter(topic).is_err(),
			"filter '{topic}' accepted"
		);
	}
	assert!(validate_topic_filter(&"a".repeat(65536)).is_err());
}

#[test]
fn test_publish_topics_reject_wildcards() {
	assert!(validate_publish_topic("pool/1/data").is_ok());
	for topic in ["pool/+/data", "pool/#", "", "x\0"] {
		let err = validate_publish_topic(topic).unwrap_err();
		assert_eq!(err.topic, topic);
	}
}
