//! Subscription bookkeeping and topic validation
//!
//! This module tracks which topics the caller wants versus which ones the
//! broker has confirmed for the current connection, and validates topic
//! strings before they reach the transport.

pub mod subscription_registry;
pub mod topic;

#[cfg(test)]
mod topic_tests;

pub use subscription_registry::SubscriptionRegistry;
pub use topic::{TopicError, validate_publish_topic, validate_topic_filter};
