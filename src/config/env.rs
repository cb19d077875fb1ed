//! Environment-driven application configuration

use std::time::Duration;

use arcstr::ArcStr;

use super::endpoint::BrokerEndpoint;
use super::error::ConfigError;
use super::settings::{PipelineSettings, SessionSettings};
use crate::routing::validate_topic_filter;

const URL_VAR: &str = "POOL_MQTT_URL";
const USERNAME_VAR: &str = "POOL_MQTT_USERNAME";
const PASSWORD_VAR: &str = "POOL_MQTT_PASSWORD";
const DEVICES_VAR: &str = "POOL_DEVICES";
const CONNECT_TIMEOUT_VAR: &str = "POOL_CONNECT_TIMEOUT_MS";
const HISTORY_LEN_VAR: &str = "POOL_HISTORY_LEN";

/// A sensor device and the topic it publishes readings on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolDevice {
	/// Display name
	pub name: String,
	/// Topic the device publishes on
	pub topic: ArcStr,
}

/// Everything needed to run a monitoring session
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
	/// Broker to connect to
	pub endpoint: BrokerEndpoint,
	/// Devices whose topics are subscribed
	pub devices: Vec<PoolDevice>,
	/// Session settings
	pub session: SessionSettings,
	/// Pipeline settings
	pub pipeline: PipelineSettings,
}

impl TelemetryConfig {
	/// Loads configuration from the process environment.
	///
	/// `.env` is read first if present. Variables:
	/// - `POOL_MQTT_URL` (required), e.g. `mqtts://broker.local:8883`
	/// - `POOL_MQTT_USERNAME` / `POOL_MQTT_PASSWORD`
	/// - `POOL_DEVICES`: `name=topic;name=topic` (a bare topic is its own name)
	/// - `POOL_CONNECT_TIMEOUT_MS`, `POOL_HISTORY_LEN`
	pub fn from_env() -> Result<Self, ConfigError> {
		dotenv::dotenv().ok();
		Self::from_vars(|name| std::env::var(name).ok())
	}

	/// Loads configuration through an arbitrary variable lookup.
	pub fn from_vars(
		lookup: impl Fn(&str) -> Option<String>,
	) -> Result<Self, ConfigError> {
		let url = lookup(URL_VAR)
			.filter(|url| !url.trim().is_empty())
			.ok_or(ConfigError::Missing(URL_VAR))?;
		let mut endpoint = BrokerEndpoint::from_url(&url)?;
		if let Some(username) = lookup(USERNAME_VAR).filter(|u| !u.is_empty()) {
			endpoint = endpoint.with_credentials(
				username,
				lookup(PASSWORD_VAR).unwrap_or_default(),
			);
		}

		let devices = parse_devices(&lookup(DEVICES_VAR).unwrap_or_default())?;

		let mut session = SessionSettings::default();
		if let Some(millis) = parse_number::<u64>(&lookup, CONNECT_TIMEOUT_VAR)? {
			if millis == 0 {
				return Err(ConfigError::Invalid {
					name: CONNECT_TIMEOUT_VAR,
					reason: "timeout must be greater than 0".to_string(),
				});
			}
			session.connect_timeout = Duration::from_millis(millis);
		}

		let mut pipeline = PipelineSettings::default();
		if let Some(len) = parse_number::<usize>(&lookup, HISTORY_LEN_VAR)? {
			pipeline.history_len = len;
		}

		Ok(Self {
			endpoint,
			devices,
			session,
			pipeline,
		})
	}
}

fn parse_number<T: std::str::FromStr>(
	lookup: &impl Fn(&str) -> Option<String>,
	name: &'static str,
) -> Result<Option<T>, ConfigError> {
	lookup(name)
		.map(|raw| {
			raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
				name,
				reason: format!("'{raw}' is not a valid number"),
			})
		})
		.transpose()
}

fn parse_devices(raw: &str) -> Result<Vec<PoolDevice>, ConfigError> {
	raw.split(';')
		.map(str::trim)
		.filter(|entry| !entry.is_empty())
		.map(|entry| {
			let (name, topic) = match entry.split_once('=') {
				| Some((name, topic)) => (name.trim(), topic.trim()),
				| None => (entry, entry),
			};
			validate_topic_filter(topic).map_err(|err| ConfigError::Invalid {
				name: DEVICES_VAR,
				reason: err.to_string(),
			})?;
			Ok(PoolDevice {
				name: name.to_string(),
				topic: ArcStr::from(topic),
			})
		})
		.collect()
}
