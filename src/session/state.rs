use std::fmt;

/// Connection state of a session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
	/// No link; the initial state
	#[default]
	Disconnected,
	/// Link opened, waiting for the broker to accept it
	Connecting,
	/// Broker accepted the connection
	Connected,
	/// Last attempt was refused, unreachable or timed out
	Failed(String),
}

impl ConnectionState {
	/// Whether operations that need a live broker connection are possible
	pub fn is_connected(&self) -> bool {
		matches!(self, ConnectionState::Connected)
	}

	/// Whether a connection attempt is in progress
	pub fn is_connecting(&self) -> bool {
		matches!(self, ConnectionState::Connecting)
	}
}

impl fmt::Display for ConnectionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			| ConnectionState::Disconnected => f.write_str("disconnected"),
			| ConnectionState::Connecting => f.write_str("connecting"),
			| ConnectionState::Connected => f.write_str("connected"),
			| ConnectionState::Failed(reason) => write!(f, "failed: {reason}"),
		}
	}
}

/// A state transition, with the reason when one is known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityChange {
	/// State entered
	pub state: ConnectionState,
	/// Why the link was lost or failed
	pub reason: Option<String>,
}
