use std::time::Duration;

use tracing::{debug, info, warn};

use super::actor::ConnectionSession;
use super::error::SessionError;
use super::state::ConnectionState;
use super::transport::Connector;
use crate::config::{BrokerEndpoint, SessionSettings};

/// Checks that `endpoint` accepts a connection.
///
/// Runs a throwaway session, waits until it is connected or has failed
/// (at most `timeout`), then disconnects. Nothing is subscribed.
pub async fn probe_endpoint<C>(
	connector: C,
	endpoint: BrokerEndpoint,
	timeout: Duration,
) -> Result<(), SessionError>
where C: Connector
{
	let settings = SessionSettings {
		connect_timeout: timeout,
		..SessionSettings::default()
	};
	let (controller, handle, events) = ConnectionSession::spawn(connector, settings);
	drop(events);

	let target = endpoint.to_string();
	let outcome = async {
		let mut state = handle.watch_state();
		handle.connect(endpoint).await?;
		let settled = state
			.wait_for(|state| !state.is_connecting())
			.await
			.map_err(|_| SessionError::ChannelClosed)?
			.clone();
		match settled {
			| ConnectionState::Connected => Ok(()),
			| ConnectionState::Failed(reason) => {
				Err(SessionError::ConnectFailed(reason))
			}
			| ConnectionState::Disconnected | ConnectionState::Connecting => {
				Err(SessionError::ConnectFailed(
					"connection closed during handshake".to_string(),
				))
			}
		}
	}
	.await;

	if let Err(err) = handle.disconnect().await {
		debug!(error = %err, "Probe session already gone");
	}
	let _ = controller.shutdown().await.inspect_err(|e| {
		warn!(error = ?e, "Probe session task failed");
	});
	info!(endpoint = %target, ok = outcome.is_ok(), "Endpoint probe finished");
	outcome
}
