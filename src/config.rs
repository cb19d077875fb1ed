//! Configuration for broker endpoints, sessions and the ingestion pipeline

pub mod endpoint;
pub mod env;
pub mod error;
pub mod settings;


pub use endpoint::{BrokerEndpoint, Credentials, DEFAULT_PORT, DEFAULT_TLS_PORT};
pub use env::{PoolDevice, TelemetryConfig};
pub use error::{ConfigError, EndpointError};
pub use settings::{PipelineSettings, SessionSettings};
