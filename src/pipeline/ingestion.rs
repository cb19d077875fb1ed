use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arcstr::ArcStr;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use super::event::PipelineEvent;
use super::history::ReadingHistory;
use crate::config::{BrokerEndpoint, PipelineSettings, SessionSettings};
use crate::payload::{JsonCodec, PayloadCodec, PayloadParser, SensorReading};
use crate::session::{
	ConnectionSession, ConnectionState, Connector, InboundMessage,
	SessionController, SessionError, SessionEvent, SessionHandle,
};

type SharedHistory = Arc<Mutex<ReadingHistory>>;

fn lock(history: &SharedHistory) -> MutexGuard<'_, ReadingHistory> {
	history.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Task that turns session events into [`PipelineEvent`]s.
///
/// Messages are parsed one at a time in the order the session delivered
/// them. Each outcome is broadcast once; observers share it rather than
/// re-parsing.
pub struct IngestionPipeline {
	parser: PayloadParser,
	session_events: mpsc::Receiver<SessionEvent>,
	observers: broadcast::Sender<PipelineEvent>,
	latest_tx: watch::Sender<Option<Arc<SensorReading>>>,
	history: SharedHistory,
}

impl IngestionPipeline {
	/// Starts a session on `connector` and the pipeline task behind it.
	///
	/// Keep the returned [`TelemetryConnection`] for as long as the client
	/// is used and call [`TelemetryConnection::shutdown`] when done.
	pub fn spawn<C>(
		connector: C,
		session: SessionSettings,
		settings: PipelineSettings,
	) -> (TelemetryClient, TelemetryConnection)
	where
		C: Connector,
	{
		let (controller, handle, session_events) =
			ConnectionSession::spawn(connector, session);
		let (observers, _) = broadcast::channel(settings.observer_capacity.max(1));
		let (latest_tx, latest_rx) = watch::channel(None);
		let history = Arc::new(Mutex::new(ReadingHistory::new(settings.history_len)));

		let pipeline = Self {
			parser: PayloadParser::new(),
			session_events,
			observers: observers.clone(),
			latest_tx,
			history: Arc::clone(&history),
		};
		let task = tokio::spawn(async move { pipeline.run().await });

		let client = TelemetryClient {
			session: handle,
			observers,
			latest_rx,
			history,
			codec: JsonCodec::new(),
		};
		let connection = TelemetryConnection {
			controller: Some(controller),
			task: Some(task),
		};
		(client, connection)
	}

	async fn run(mut self) {
		while let Some(event) = self.session_events.recv().await {
			self.handle_event(event);
		}
		info!("IngestionPipeline: Session event stream closed, exiting");
	}

	fn handle_event(&mut self, event: SessionEvent) {
		match event {
			| SessionEvent::Message(message) => self.ingest(message),
			| SessionEvent::StateChanged(change) => {
				self.broadcast(PipelineEvent::Connectivity(change));
			}
			| SessionEvent::SubscribeFailed { topic, reason } => {
				self.broadcast(PipelineEvent::SubscriptionFailed { topic, reason });
			}
			| SessionEvent::SubscribeAck { topic } => {
				debug!(topic = %topic, "Subscription confirmed");
			}
			| SessionEvent::UnsubscribeAck { topic } => {
				debug!(topic = %topic, "Unsubscription confirmed");
			}
		}
	}

	fn ingest(&mut self, message: InboundMessage) {
		let InboundMessage {
			topic,
			payload,
			received_at,
		} = message;
		match self.parser.parse_at(&payload, received_at) {
			| Ok(reading) => {
				let reading = Arc::new(reading);
				debug!(
					topic = %topic,
					reading_id = %reading.id(),
					"Reading ingested"
				);
				lock(&self.history).record(&topic, Arc::clone(&reading), received_at);
				self.latest_tx.send_replace(Some(Arc::clone(&reading)));
				self.broadcast(PipelineEvent::Reading { topic, reading });
			}
			| Err(error) => {
				warn!(
					topic = %topic,
					payload_size = payload.len(),
					error = %error,
					"Failed to parse sensor payload"
				);
				self.broadcast(PipelineEvent::ParseFailure {
					topic,
					error,
					received_at,
				});
			}
		}
	}

	fn broadcast(&self, event: PipelineEvent) {
		if self.observers.send(event).is_err() {
			trace!("No pipeline observers");
		}
	}
}

/// Cloneable entry point: session operations plus the observable surface
/// of the pipeline.
#[derive(Debug, Clone)]
pub struct TelemetryClient {
	session: SessionHandle,
	observers: broadcast::Sender<PipelineEvent>,
	latest_rx: watch::Receiver<Option<Arc<SensorReading>>>,
	history: SharedHistory,
	codec: JsonCodec,
}

impl TelemetryClient {
	/// Starts connecting to `endpoint`; see [`SessionHandle::connect`].
	pub async fn connect(
		&self,
		endpoint: BrokerEndpoint,
	) -> Result<(), SessionError> {
		self.session.connect(endpoint).await
	}

	/// Closes the connection. Does nothing if already disconnected.
	pub async fn disconnect(&self) -> Result<(), SessionError> {
		self.session.disconnect().await
	}

	/// Records interest in `topic`, subscribing whenever connected.
	pub async fn subscribe(
		&self,
		topic: impl Into<ArcStr>,
	) -> Result<(), SessionError> {
		self.session.subscribe(topic).await
	}

	/// Drops interest in `topic`.
	pub async fn unsubscribe(
		&self,
		topic: impl Into<ArcStr>,
	) -> Result<(), SessionError> {
		self.session.unsubscribe(topic).await
	}

	/// Publishes a raw payload. Requires a connection.
	pub async fn publish(
		&self,
		topic: impl Into<ArcStr>,
		payload: impl Into<Bytes>,
	) -> Result<(), SessionError> {
		self.session.publish(topic, payload).await
	}

	/// Publishes a reading in the structured wire format.
	pub async fn publish_reading(
		&self,
		topic: impl Into<ArcStr>,
		reading: &SensorReading,
	) -> Result<(), SessionError> {
		self.publish(topic, self.codec.encode(reading)).await
	}

	/// Current connection state
	pub fn state(&self) -> ConnectionState {
		self.session.state()
	}

	/// Receiver that observes every state change
	pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
		self.session.watch_state()
	}

	/// New receiver of every pipeline event from now on.
	///
	/// A receiver that falls more than the configured observer capacity
	/// behind skips ahead and gets `RecvError::Lagged`.
	pub fn observe(&self) -> broadcast::Receiver<PipelineEvent> {
		self.observers.subscribe()
	}

	/// Most recent reading, if any arrived yet
	pub fn latest_reading(&self) -> Option<Arc<SensorReading>> {
		self.latest_rx.borrow().clone()
	}

	/// Receiver that observes the most recent reading
	pub fn watch_latest(&self) -> watch::Receiver<Option<Arc<SensorReading>>> {
		self.latest_rx.clone()
	}

	/// Recent readings, oldest first
	pub fn recent_readings(&self) -> Vec<Arc<SensorReading>> {
		lock(&self.history).recent()
	}

	/// When a reading last arrived on `topic`
	pub fn last_seen(&self, topic: &str) -> Option<DateTime<Utc>> {
		lock(&self.history).last_seen(topic)
	}

	/// Topics the caller wants, connected or not
	pub async fn wanted_topics(&self) -> Result<Vec<ArcStr>, SessionError> {
		self.session.wanted_topics().await
	}

	/// Topics the broker has confirmed for the current connection
	pub async fn active_topics(&self) -> Result<Vec<ArcStr>, SessionError> {
		self.session.active_topics().await
	}
}

/// Lifecycle handle for a pipeline and its session.
///
/// Keep it alive for as long as the client is used and call
/// [`shutdown`](Self::shutdown) when done.
pub struct TelemetryConnection {
	controller: Option<SessionController>,
	task: Option<JoinHandle<()>>,
}

impl TelemetryConnection {
	/// Shuts down gracefully:
	/// 1. Stops the session, which closes the link and reports a final
	///    `Disconnected`
	/// 2. Waits for the pipeline task to drain the remaining events
	pub async fn shutdown(mut self) -> Result<(), JoinError> {
		let mut outcome = Ok(());
		if let Some(controller) = self.controller.take() {
			if let Err(e) = controller.shutdown().await {
				outcome = Err(e);
			}
		}
		if let Some(task) = self.task.take() {
			if let Err(e) = task.await {
				warn!(error = %e, "Pipeline task failed");
				if outcome.is_ok() {
					outcome = Err(e);
				}
			}
		}
		outcome
	}
}

impl Drop for TelemetryConnection {
	fn drop(&mut self) {
		if self.controller.is_some() || self.task.is_some() {
			error!(
				"TelemetryConnection dropped without calling shutdown(). \
				 Please call shutdown() explicitly to close the broker \
				 connection gracefully."
			);
		}
	}
}
