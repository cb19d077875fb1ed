//! # Pool Telemetry
//!
//! MQTT session lifecycle and sensor-reading ingestion for pool monitoring
//! devices that report temperature, pH, free chlorine and ORP.
//!
//! ## Features
//!
//! - **Connection Session**: One broker connection at a time, driven by a
//!   single task with a connect timeout and stale-callback protection
//! - **Subscription Bookkeeping**: Wanted topics survive disconnects and are
//!   replayed once the broker accepts a new connection
//! - **Lenient Payload Parsing**: JSON objects first, flat `key:value` lists
//!   as fallback
//! - **Observer Fan-out**: Every reading, parse failure and connectivity
//!   change is broadcast once to any number of observers
//! - **Pluggable Transport**: `rumqttc` in production, anything implementing
//!   [`Connector`] in tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pool_telemetry::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (client, connection) = IngestionPipeline::spawn(
//!         RumqttConnector::new(),
//!         SessionSettings::default(),
//!         PipelineSettings::default(),
//!     );
//!     let mut events = client.observe();
//!
//!     // Subscriptions may be requested before connecting.
//!     client.subscribe("pool/+/data").await?;
//!     client
//!         .connect(BrokerEndpoint::from_url("mqtt://broker.local:1883")?)
//!         .await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let PipelineEvent::Reading { topic, reading } = event {
//!             println!("{topic}: {:.1} °C, pH {:.2}", reading.temperature(), reading.ph());
//!             break;
//!         }
//!     }
//!
//!     connection.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Payload formats
//!
//! ```rust
//! use pool_telemetry::parse_payload;
//!
//! let json = parse_payload(r#"{"temperature":24.5,"ph":7.2,"chlorine":1.8,"orp":685}"#)?;
//! let flat = parse_payload("temp:24.5,ph:7.2,chlorine:1.8,orp:685")?;
//! assert_eq!(json.temperature(), flat.temperature());
//! # Ok::<(), pool_telemetry::ParseError>(())
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod payload;
pub mod pipeline;
pub mod routing;
pub mod session;

// === Core Public API ===
pub use config::{
	BrokerEndpoint, PipelineSettings, PoolDevice, SessionSettings,
	TelemetryConfig,
};
pub use payload::{
	JsonCodec, KeyValueCodec, ParseError, PayloadCodec, PayloadParser,
	SensorReading, parse_payload,
};
pub use pipeline::{
	IngestionPipeline, PipelineEvent, TelemetryClient, TelemetryConnection,
};
pub use routing::SubscriptionRegistry;
pub use session::{
	ConnectionSession, ConnectionState, ConnectivityChange, Connector,
	RumqttConnector, SessionError, SessionEvent, SessionHandle, probe_endpoint,
};

/// Error types
pub mod errors {
	pub use crate::config::{ConfigError, EndpointError};
	pub use crate::payload::{
		FallbackError, ParseError, ReadingError, StructuredError,
	};
	pub use crate::routing::TopicError;
	pub use crate::session::{SessionError, TransportError};
}

/// Result of session and client operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Common imports for applications
pub mod prelude {
	pub use crate::config::{
		BrokerEndpoint, PipelineSettings, SessionSettings, TelemetryConfig,
	};
	pub use crate::payload::SensorReading;
	pub use crate::pipeline::{
		IngestionPipeline, PipelineEvent, TelemetryClient, TelemetryConnection,
	};
	pub use crate::session::{ConnectionState, RumqttConnector, SessionError};
}
