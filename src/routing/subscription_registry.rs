//! Subscription intent versus broker-confirmed subscriptions

use std::collections::BTreeSet;

use arcstr::ArcStr;

/// Tracks the topics the caller wants (intent) separately from the topics
/// the broker has acknowledged on the current connection (active).
///
/// Intent survives disconnects; the active set does not. On every new
/// connection the full intent is replayed. Active topics are a subset of
/// intent, except for a topic that was unwanted while active: it stays
/// active until the broker acknowledges the unsubscribe.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
	intent: BTreeSet<ArcStr>,
	active: BTreeSet<ArcStr>,
	pending_unsubscribe: BTreeSet<ArcStr>,
}

impl SubscriptionRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a topic to the intent. Returns `true` if it was not wanted yet.
	pub fn want(&mut self, topic: impl Into<ArcStr>) -> bool {
		let topic = topic.into();
		self.pending_unsubscribe.remove(&topic);
		self.intent.insert(topic)
	}

	/// Removes a topic from the intent.
	///
	/// Returns `true` if the topic is active on the broker, in which case the
	/// caller has to send an unsubscribe request.
	pub fn unwant(&mut self, topic: &str) -> bool {
		if !self.intent.remove(topic) {
			return false;
		}
		match self.active.get(topic) {
			| Some(active) => {
				self.pending_unsubscribe.insert(active.clone());
				true
			}
			| None => false,
		}
	}

	/// Topics to (re)subscribe after a connection is established, sorted and
	/// without duplicates. Call exactly once per transition into connected.
	pub fn on_connected(&self) -> Vec<ArcStr> {
		self.intent.iter().cloned().collect()
	}

	/// Records a broker acknowledgment for a subscribe request.
	///
	/// Returns `false` when the topic was unwanted while the request was in
	/// flight; the caller should then unsubscribe it again.
	pub fn on_subscribe_ack(&mut self, topic: &str) -> bool {
		match self.intent.get(topic) {
			| Some(wanted) => {
				self.active.insert(wanted.clone());
				true
			}
			| None => false,
		}
	}

	/// Records a broker acknowledgment for an unsubscribe request.
	pub fn on_unsubscribe_ack(&mut self, topic: &str) {
		self.pending_unsubscribe.remove(topic);
		self.active.remove(topic);
	}

	/// Forgets everything the broker confirmed. Intent is kept.
	pub fn on_disconnected(&mut self) {
		self.active.clear();
		self.pending_unsubscribe.clear();
	}

	/// Whether the caller wants this topic
	pub fn is_wanted(&self, topic: &str) -> bool {
		self.intent.contains(topic)
	}

	/// Whether the broker confirmed this topic on the current connection
	pub fn is_active(&self, topic: &str) -> bool {
		self.active.contains(topic)
	}

	/// Whether an unsubscribe for this topic awaits acknowledgment
	pub fn is_pending_unsubscribe(&self, topic: &str) -> bool {
		self.pending_unsubscribe.contains(topic)
	}

	/// Wanted topics, sorted
	pub fn intent(&self) -> impl Iterator<Item = &ArcStr> {
		self.intent.iter()
	}

	/// Active topics, sorted
	pub fn active(&self) -> impl Iterator<Item = &ArcStr> {
		self.active.iter()
	}
}
