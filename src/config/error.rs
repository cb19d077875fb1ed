use thiserror::Error;

/// A broker endpoint that cannot be connected to as configured
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
	/// Host is empty or whitespace
	#[error("broker host is empty")]
	EmptyHost,
	/// Host contains characters no hostname can have
	#[error("invalid broker host '{0}'")]
	InvalidHost(String),
	/// Port 0
	#[error("broker port must be between 1 and 65535")]
	InvalidPort,
	/// URL scheme other than mqtt, mqtts, tcp or ssl
	#[error("unsupported URL scheme '{0}' (expected mqtt, mqtts, tcp or ssl)")]
	UnsupportedScheme(String),
	/// URL could not be parsed
	#[error("invalid broker URL: {0}")]
	Url(#[from] url::ParseError),
}

/// Errors loading [`super::TelemetryConfig`] from the environment
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Required variable not set
	#[error("environment variable {0} is missing")]
	Missing(&'static str),
	/// Variable set but unusable
	#[error("environment variable {name} is invalid: {reason}")]
	Invalid {
		/// Variable name
		name: &'static str,
		/// What is wrong with its value
		reason: String,
	},
	/// Broker URL rejected
	#[error("broker endpoint error: {0}")]
	Endpoint(#[from] EndpointError),
}
