//! Broker connection lifecycle
//!
//! A [`ConnectionSession`] owns one broker connection at a time. It runs as a
//! single task: caller commands and transport callbacks are serialized through
//! it, so connection state and subscription bookkeeping are never shared.
//!
//! The transport itself sits behind the [`Connector`] / [`TransportLink`]
//! seam. [`RumqttConnector`] is the production implementation.

mod actor;
pub mod error;
mod event;
mod probe;
mod rumqtt;
mod state;
pub mod transport;

#[cfg(test)]
mod actor_tests;
#[cfg(test)]
pub(crate) mod mock_transport;

pub use actor::{ConnectionSession, SessionController, SessionHandle};
pub use error::{SessionError, TransportError};
pub use event::{InboundMessage, SessionEvent};
pub use probe::probe_endpoint;
pub use rumqtt::RumqttConnector;
pub use state::{ConnectionState, ConnectivityChange};
pub use transport::{
	Connector, LinkClosed, LinkEvent, LinkEvents, LinkOptions, TransportLink,
};
