//! Seam between the session and the MQTT client library

use std::time::Duration;

use arcstr::ArcStr;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use super::error::TransportError;
use crate::config::BrokerEndpoint;

/// Callbacks a transport link reports to its session
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
	/// Broker accepted the connection
	Connected,
	/// Broker refused the connection (credentials, client id, ...)
	Refused(String),
	/// Broker could not be reached (network, DNS, TLS)
	Unreachable(String),
	/// Established connection went away
	Lost(String),
	/// Answer to a subscribe request
	SubscribeAck {
		/// Filter the answer is for
		topic: ArcStr,
		/// Whether the broker granted it
		granted: bool,
	},
	/// Answer to an unsubscribe request
	UnsubscribeAck {
		/// Filter the answer is for
		topic: ArcStr,
	},
	/// Inbound publish
	Message {
		/// Concrete topic
		topic: ArcStr,
		/// Raw body
		payload: Bytes,
	},
}

impl LinkEvent {
	/// Whether the link is finished after this event
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			LinkEvent::Refused(_) | LinkEvent::Unreachable(_) | LinkEvent::Lost(_)
		)
	}
}

/// The session no longer listens to this link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("session stopped listening to link events")]
pub struct LinkClosed;

/// Sender a link reports its events through.
///
/// Every event is stamped with the generation of the connection attempt
/// that opened the link; the session drops events from older attempts.
#[derive(Debug, Clone)]
pub struct LinkEvents {
	generation: u64,
	tx: mpsc::Sender<(u64, LinkEvent)>,
}

impl LinkEvents {
	pub(crate) fn new(generation: u64, tx: mpsc::Sender<(u64, LinkEvent)>) -> Self {
		Self { generation, tx }
	}

	/// Generation of the attempt this sender belongs to
	pub fn generation(&self) -> u64 {
		self.generation
	}

	/// Reports an event, waiting for room in the session's queue.
	pub async fn send(&self, event: LinkEvent) -> Result<(), LinkClosed> {
		self.tx
			.send((self.generation, event))
			.await
			.map_err(|_| LinkClosed)
	}

	/// Whether the session has gone away
	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}
}

/// Per-attempt link parameters
#[derive(Debug, Clone)]
pub struct LinkOptions {
	/// Client identifier, unique per attempt
	pub client_id: String,
	/// Keep-alive interval
	pub keep_alive: Duration,
	/// Capacity of the outgoing request queue
	pub request_capacity: usize,
}

/// Opens transport links to a broker.
pub trait Connector: Send + Sync + 'static {
	/// Starts connecting to `endpoint`. The returned link reports progress
	/// through `events`; this call must not wait for the broker.
	fn open(
		&self,
		endpoint: &BrokerEndpoint,
		options: LinkOptions,
		events: LinkEvents,
	) -> Result<Box<dyn TransportLink>, TransportError>;
}

/// One open connection attempt.
///
/// Requests are queued without waiting; their outcome arrives as
/// [`LinkEvent`]s.
pub trait TransportLink: Send + Sync {
	/// Queues a QoS 1 subscribe request.
	fn subscribe(&self, topic: &str) -> Result<(), TransportError>;

	/// Queues subscribe requests for all `topics` at once, as done when the
	/// intent is replayed after connecting. Each topic still gets its own
	/// [`LinkEvent::SubscribeAck`].
	///
	/// Links with a bounded request queue should override this to send a
	/// single request.
	fn subscribe_many(&self, topics: &[ArcStr]) -> Result<(), TransportError> {
		topics.iter().try_for_each(|topic| self.subscribe(topic))
	}

	/// Queues an unsubscribe request.
	fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;

	/// Queues a QoS 1, non-retained publish.
	fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError>;

	/// Tears the link down. Calling it again does nothing.
	fn close(&mut self);
}
