//! Session- and pipeline-level behavior settings

use std::time::Duration;

use uuid::Uuid;

const FALLBACK_CLIENT_ID_PREFIX: &str = "pool-telemetry";

/// Connection session settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
	/// Prefix of the per-attempt client identifier (`{prefix}-{uuid}`)
	pub client_id_prefix: String,
	/// MQTT keep-alive interval (at least one second)
	pub keep_alive: Duration,
	/// How long a connection attempt may stay in `Connecting`
	pub connect_timeout: Duration,
	/// Capacity of the transport request channel
	pub event_loop_capacity: usize,
	/// Capacity of the command channel into the session
	pub command_channel_capacity: usize,
	/// Capacity of the session's outgoing event channel
	pub event_channel_capacity: usize,
}

impl Default for SessionSettings {
	fn default() -> Self {
		Self {
			client_id_prefix: "PoolSensors".to_string(),
			keep_alive: Duration::from_secs(60),
			connect_timeout: Duration::from_secs(10),
			event_loop_capacity: 10,
			command_channel_capacity: 32,
			event_channel_capacity: 256,
		}
	}
}

impl SessionSettings {
	/// Fresh client identifier for one connection attempt.
	pub fn client_id(&self) -> String {
		let prefix = self.client_id_prefix.trim();
		let prefix = if prefix.is_empty() {
			FALLBACK_CLIENT_ID_PREFIX
		} else {
			prefix
		};
		format!("{prefix}-{}", Uuid::new_v4())
	}
}

/// Ingestion pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineSettings {
	/// Buffered events per observer before it starts lagging
	pub observer_capacity: usize,
	/// Number of recent readings kept for look-back
	pub history_len: usize,
}

impl Default for PipelineSettings {
	fn default() -> Self {
		Self {
			observer_capacity: 256,
			history_len: 100,
		}
	}
}
