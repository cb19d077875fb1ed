use thiserror::Error;

use crate::config::EndpointError;
use crate::routing::TopicError;

/// Failures of a transport link operation
#[derive(Debug, Error)]
pub enum TransportError {
	/// Request could not be handed to the MQTT client
	#[error("transport request failed: {0}")]
	Client(#[from] rumqttc::ClientError),

	/// Link was already closed
	#[error("transport link is closed")]
	Closed,

	/// Link could not be created
	#[error("transport setup failed: {0}")]
	Setup(String),
}

/// Errors returned by session operations
#[derive(Debug, Error)]
pub enum SessionError {
	/// Endpoint cannot be connected to as configured
	#[error("invalid endpoint: {0}")]
	Endpoint(#[from] EndpointError),

	/// Topic rejected before reaching the transport
	#[error(transparent)]
	InvalidTopic(#[from] TopicError),

	/// Operation requires a live connection
	#[error("not connected to a broker")]
	NotConnected,

	/// Transport refused the request
	#[error("transport error: {0}")]
	Transport(#[from] TransportError),

	/// Session task is gone
	#[error("session command channel closed")]
	ChannelClosed,

	/// Session task dropped the reply
	#[error("session response lost")]
	ResponseLost,

	/// Connection attempt ended without reaching the broker
	#[error("connection failed: {0}")]
	ConnectFailed(String),
}
