//! [`Connector`] over `rumqttc`

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arcstr::ArcStr;
use bytes::Bytes;
use rumqttc::{
	AsyncClient, ConnAck, ConnectReturnCode, ConnectionError, EventLoop,
	MqttOptions, Packet, QoS, SubscribeFilter, SubscribeReasonCode, Transport,
};
use rumqttc::{Event::Incoming, Event::Outgoing};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::TransportError;
use super::transport::{
	Connector, LinkEvent, LinkEvents, LinkOptions, TransportLink,
};
use crate::config::BrokerEndpoint;

/// Time a closing link gets to flush its Disconnect packet
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Task that finishes once a closed link has let go of its connection
type Retiring = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Opens links with `rumqttc`: MQTT 3.1.1, clean session, QoS 1, optional
/// TLS with the default root store.
///
/// A link opened right after another one was closed does not start
/// connecting until the old connection is gone, so each connector holds at
/// most one broker connection.
#[derive(Debug, Clone, Default)]
pub struct RumqttConnector {
	retiring: Retiring,
}

impl RumqttConnector {
	/// Creates a connector.
	pub fn new() -> Self {
		Self::default()
	}
}

impl Connector for RumqttConnector {
	fn open(
		&self,
		endpoint: &BrokerEndpoint,
		options: LinkOptions,
		events: LinkEvents,
	) -> Result<Box<dyn TransportLink>, TransportError> {
		if options.client_id.is_empty() || options.client_id.starts_with(' ') {
			return Err(TransportError::Setup(format!(
				"unusable client id '{}'",
				options.client_id
			)));
		}
		let mut mqtt_options =
			MqttOptions::new(options.client_id, endpoint.host(), endpoint.port());
		mqtt_options
			.set_keep_alive(options.keep_alive.max(Duration::from_secs(1)))
			.set_clean_session(true);
		if let Some(credentials) = endpoint.credentials() {
			mqtt_options
				.set_credentials(credentials.username(), credentials.secret());
		}
		if endpoint.uses_tls() {
			mqtt_options.set_transport(Transport::tls_with_default_config());
		}

		let (client, event_loop) =
			AsyncClient::new(mqtt_options, options.request_capacity.max(1));
		let pending = Arc::new(Mutex::new(PendingRequests::default()));
		let runtime = Handle::try_current()
			.map_err(|err| TransportError::Setup(err.to_string()))?;
		let previous = lock(&self.retiring).take();
		let driver =
			runtime.spawn(drive(event_loop, events, Arc::clone(&pending), previous));

		debug!(endpoint = %endpoint, "Opened MQTT link");
		Ok(Box::new(RumqttLink {
			client,
			pending,
			driver: Some(driver),
			retiring: Arc::clone(&self.retiring),
		}))
	}
}

/// Topics of requests handed to the client, matched to packet ids once the
/// event loop sends them. A subscribe request may carry several filters;
/// their SubAck return codes come back in the same order.
#[derive(Debug, Default)]
struct PendingRequests {
	queued_subscribes: VecDeque<Vec<ArcStr>>,
	queued_unsubscribes: VecDeque<ArcStr>,
	subscribes: HashMap<u16, Vec<ArcStr>>,
	unsubscribes: HashMap<u16, ArcStr>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct RumqttLink {
	client: AsyncClient,
	pending: Arc<Mutex<PendingRequests>>,
	driver: Option<JoinHandle<()>>,
	retiring: Retiring,
}

impl RumqttLink {
	fn ensure_open(&self) -> Result<(), TransportError> {
		match &self.driver {
			| Some(driver) if !driver.is_finished() => Ok(()),
			| _ => Err(TransportError::Closed),
		}
	}

	fn retire(&self, task: JoinHandle<()>) {
		*lock(&self.retiring) = Some(task);
	}
}

impl TransportLink for RumqttLink {
	fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
		self.ensure_open()?;
		lock(&self.pending)
			.queued_subscribes
			.push_back(vec![ArcStr::from(topic)]);
		self.client
			.try_subscribe(topic, QoS::AtLeastOnce)
			.map_err(|err| {
				lock(&self.pending).queued_subscribes.pop_back();
				TransportError::from(err)
			})
	}

	fn subscribe_many(&self, topics: &[ArcStr]) -> Result<(), TransportError> {
		self.ensure_open()?;
		if topics.is_empty() {
			return Ok(());
		}
		lock(&self.pending).queued_subscribes.push_back(topics.to_vec());
		let filters = topics.iter().map(|topic| {
			SubscribeFilter::new(topic.to_string(), QoS::AtLeastOnce)
		});
		self.client.try_subscribe_many(filters).map_err(|err| {
			lock(&self.pending).queued_subscribes.pop_back();
			TransportError::from(err)
		})
	}

	fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
		self.ensure_open()?;
		lock(&self.pending)
			.queued_unsubscribes
			.push_back(ArcStr::from(topic));
		self.client.try_unsubscribe(topic).map_err(|err| {
			lock(&self.pending).queued_unsubscribes.pop_back();
			TransportError::from(err)
		})
	}

	fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
		self.ensure_open()?;
		self.client
			.try_publish(topic, QoS::AtLeastOnce, false, payload.to_vec())?;
		Ok(())
	}

	fn close(&mut self) {
		let Some(mut driver) = self.driver.take() else {
			return;
		};
		if driver.is_finished() {
			return;
		}
		if let Err(err) = self.client.try_disconnect() {
			debug!(error = %err, "Could not queue Disconnect, aborting link");
			driver.abort();
			self.retire(driver);
			return;
		}
		// The event loop stops after sending Disconnect; give it a moment,
		// then cut it off (it may still be stuck connecting).
		match Handle::try_current() {
			| Ok(runtime) => {
				let closing = runtime.spawn(async move {
					if tokio::time::timeout(CLOSE_GRACE, &mut driver).await.is_err()
					{
						debug!("MQTT link did not close in time, aborting");
						driver.abort();
						let _ = driver.await;
					}
				});
				self.retire(closing);
			}
			| Err(_) => driver.abort(),
		}
	}
}

impl Drop for RumqttLink {
	fn drop(&mut self) {
		self.close();
	}
}

/// Polls the event loop until the link ends, translating notifications
/// into [`LinkEvent`]s.
async fn drive(
	mut event_loop: EventLoop,
	events: LinkEvents,
	pending: Arc<Mutex<PendingRequests>>,
	previous: Option<JoinHandle<()>>,
) {
	let generation = events.generation();
	if let Some(previous) = previous {
		// The event loop only dials on its first poll.
		let _ = previous.await;
	}
	let mut acknowledged = false;
	'poll: loop {
		let batch: Vec<LinkEvent> = match event_loop.poll().await {
			| Ok(Incoming(Packet::ConnAck(ConnAck { code, .. }))) => {
				if code == ConnectReturnCode::Success {
					debug!(generation, "MQTT connection accepted");
					acknowledged = true;
					vec![LinkEvent::Connected]
				} else {
					vec![LinkEvent::Refused(describe_refusal(code))]
				}
			}
			| Ok(Incoming(Packet::Publish(publish))) => {
				debug!(topic = %publish.topic, payload_size = publish.payload.len(), "Received MQTT message");
				vec![LinkEvent::Message {
					topic: ArcStr::from(publish.topic),
					payload: publish.payload,
				}]
			}
			| Ok(Incoming(Packet::SubAck(ack))) => {
				let Some(topics) = lock(&pending).subscribes.remove(&ack.pkid)
				else {
					warn!(pkid = ack.pkid, "SubAck for unknown request");
					continue;
				};
				let mut codes = ack.return_codes.iter();
				topics
					.into_iter()
					.map(|topic| {
						let granted = matches!(
							codes.next(),
							Some(SubscribeReasonCode::Success(_))
						);
						LinkEvent::SubscribeAck { topic, granted }
					})
					.collect()
			}
			| Ok(Incoming(Packet::UnsubAck(ack))) => {
				let Some(topic) = lock(&pending).unsubscribes.remove(&ack.pkid)
				else {
					warn!(pkid = ack.pkid, "UnsubAck for unknown request");
					continue;
				};
				vec![LinkEvent::UnsubscribeAck { topic }]
			}
			| Ok(Incoming(Packet::Disconnect)) => {
				info!("Received MQTT Disconnect packet from server");
				vec![LinkEvent::Lost("broker closed the connection".to_string())]
			}
			| Ok(Outgoing(rumqttc::Outgoing::Subscribe(pkid))) => {
				let mut pending = lock(&pending);
				if let Some(topics) = pending.queued_subscribes.pop_front() {
					pending.subscribes.insert(pkid, topics);
				}
				continue;
			}
			| Ok(Outgoing(rumqttc::Outgoing::Unsubscribe(pkid))) => {
				let mut pending = lock(&pending);
				if let Some(topic) = pending.queued_unsubscribes.pop_front() {
					pending.unsubscribes.insert(pkid, topic);
				}
				continue;
			}
			| Ok(Outgoing(rumqttc::Outgoing::Disconnect)) => {
				debug!(generation, "Sent MQTT Disconnect packet");
				break;
			}
			| Ok(notification) => {
				debug!(notification = ?notification, "Received other MQTT notification");
				continue;
			}
			| Err(ConnectionError::ConnectionRefused(code)) => {
				vec![LinkEvent::Refused(describe_refusal(code))]
			}
			| Err(err) if acknowledged => vec![LinkEvent::Lost(err.to_string())],
			| Err(err) => vec![LinkEvent::Unreachable(err.to_string())],
		};

		for event in batch {
			let terminal = event.is_terminal();
			if events.send(event).await.is_err() {
				debug!(generation, "Session gone, stopping MQTT link");
				break 'poll;
			}
			if terminal {
				break 'poll;
			}
		}
	}
	debug!(generation, "MQTT link driver finished");
}

fn describe_refusal(code: ConnectReturnCode) -> String {
	match code {
		| ConnectReturnCode::Success => "accepted".to_string(),
		| ConnectReturnCode::RefusedProtocolVersion => {
			"broker refused the protocol version".to_string()
		}
		| ConnectReturnCode::BadClientId => {
			"broker rejected the client identifier".to_string()
		}
		| ConnectReturnCode::ServiceUnavailable => {
			"broker service unavailable".to_string()
		}
		| ConnectReturnCode::BadUserNamePassword => {
			"bad username or password".to_string()
		}
		| ConnectReturnCode::NotAuthorized => "not authorized".to_string(),
	}
}
