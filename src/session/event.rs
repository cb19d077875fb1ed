use arcstr::ArcStr;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::state::ConnectivityChange;

/// A message delivered by the broker on a subscribed topic
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
	/// Concrete topic the message was published on
	pub topic: ArcStr,
	/// Raw body
	pub payload: Bytes,
	/// When the session received it
	pub received_at: DateTime<Utc>,
}

/// Everything a session reports, in the order it happened
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
	/// Connection state changed
	StateChanged(ConnectivityChange),
	/// Inbound publish from the current connection
	Message(InboundMessage),
	/// Broker granted a subscription
	SubscribeAck {
		/// Subscribed filter
		topic: ArcStr,
	},
	/// Subscription could not be placed; the session stays up
	SubscribeFailed {
		/// Filter that failed
		topic: ArcStr,
		/// Why
		reason: String,
	},
	/// Broker confirmed an unsubscribe
	UnsubscribeAck {
		/// Filter that was removed
		topic: ArcStr,
	},
}
