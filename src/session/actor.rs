use arcstr::ArcStr;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use super::error::SessionError;
use super::event::{InboundMessage, SessionEvent};
use super::state::{ConnectionState, ConnectivityChange};
use super::transport::{
	Connector, LinkEvent, LinkEvents, LinkOptions, TransportLink,
};
use crate::config::{BrokerEndpoint, SessionSettings};
use crate::routing::{
	SubscriptionRegistry, validate_publish_topic, validate_topic_filter,
};

const TIMEOUT_REASON: &str = "timeout";
const SHUTDOWN_REASON: &str = "session shut down";

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

#[derive(Debug)]
enum Command {
	Connect(BrokerEndpoint, Reply<()>),
	Disconnect(oneshot::Sender<()>),
	Subscribe(ArcStr, Reply<()>),
	Unsubscribe(ArcStr, Reply<()>),
	Publish(ArcStr, Bytes, Reply<()>),
	WantedTopics(oneshot::Sender<Vec<ArcStr>>),
	ActiveTopics(oneshot::Sender<Vec<ArcStr>>),
}

/// Single-task owner of one broker connection and its subscriptions.
///
/// Commands from [`SessionHandle`]s and callbacks from the current
/// [`TransportLink`] are processed one at a time. Each connection attempt
/// gets a new generation number; link callbacks stamped with an older one
/// are dropped.
pub struct ConnectionSession<C> {
	connector: C,
	settings: SessionSettings,
	registry: SubscriptionRegistry,
	link: Option<Box<dyn TransportLink>>,
	generation: u64,
	connect_deadline: Option<Instant>,
	state_tx: watch::Sender<ConnectionState>,
	event_tx: mpsc::Sender<SessionEvent>,
	link_tx: mpsc::Sender<(u64, LinkEvent)>,
	link_rx: mpsc::Receiver<(u64, LinkEvent)>,
	command_rx: mpsc::Receiver<Command>,
	shutdown_rx: oneshot::Receiver<()>,
}

impl<C> ConnectionSession<C>
where C: Connector
{
	/// Starts the session task.
	///
	/// Returns the controller that tears it down, a handle for operations
	/// and the stream of [`SessionEvent`]s.
	pub fn spawn(
		connector: C,
		settings: SessionSettings,
	) -> (SessionController, SessionHandle, mpsc::Receiver<SessionEvent>) {
		let (command_tx, command_rx) =
			mpsc::channel(settings.command_channel_capacity.max(1));
		let (event_tx, event_rx) =
			mpsc::channel(settings.event_channel_capacity.max(1));
		let (link_tx, link_rx) =
			mpsc::channel(settings.event_loop_capacity.max(1));
		let (shutdown_tx, shutdown_rx) = oneshot::channel();
		let (state_tx, state_rx) = watch::channel(ConnectionState::default());

		let session = Self {
			connector,
			settings,
			registry: SubscriptionRegistry::new(),
			link: None,
			generation: 0,
			connect_deadline: None,
			state_tx,
			event_tx,
			link_tx,
			link_rx,
			command_rx,
			shutdown_rx,
		};
		let join_handle = tokio::spawn(async move { session.run().await });

		let controller = SessionController {
			shutdown_tx,
			join_handle,
		};
		let handle = SessionHandle {
			command_tx,
			state_rx,
		};
		(controller, handle, event_rx)
	}

	async fn run(mut self) {
		loop {
			let deadline = self.connect_deadline;
			tokio::select! {
				_ = &mut self.shutdown_rx => {
					info!("ConnectionSession: Shutdown signal received");
					break;
				}
				Some((generation, event)) = self.link_rx.recv() => {
					self.handle_link_event(generation, event).await;
				}
				cmd = self.command_rx.recv() => {
					match cmd {
						| Some(cmd) => self.handle_command(cmd).await,
						| None => {
							info!("ConnectionSession: Command channel closed, exiting");
							break;
						}
					}
				}
				_ = wait_for_deadline(deadline) => {
					self.handle_connect_timeout().await;
				}
			}
		}
		self.drop_link();
		self.transition(ConnectionState::Disconnected, Some(SHUTDOWN_REASON))
			.await;
		info!("ConnectionSession: Exiting run loop");
	}

	async fn handle_command(&mut self, cmd: Command) {
		match cmd {
			| Command::Connect(endpoint, reply) => {
				let result = self.handle_connect(endpoint).await;
				respond(reply, result);
			}
			| Command::Disconnect(reply) => {
				self.handle_disconnect().await;
				let _ = reply.send(());
			}
			| Command::Subscribe(topic, reply) => {
				let result = self.handle_subscribe(topic);
				respond(reply, result);
			}
			| Command::Unsubscribe(topic, reply) => {
				let result = self.handle_unsubscribe(&topic);
				respond(reply, result);
			}
			| Command::Publish(topic, payload, reply) => {
				let result = self.handle_publish(&topic, payload);
				respond(reply, result);
			}
			| Command::WantedTopics(reply) => {
				let _ = reply.send(self.registry.intent().cloned().collect());
			}
			| Command::ActiveTopics(reply) => {
				let _ = reply.send(self.registry.active().cloned().collect());
			}
		}
	}

	async fn handle_connect(
		&mut self,
		endpoint: BrokerEndpoint,
	) -> Result<(), SessionError> {
		self.drop_link();
		self.transition(ConnectionState::Disconnected, None).await;

		if let Err(err) = endpoint.validate() {
			warn!(endpoint = %endpoint, error = %err, "Refusing to connect to invalid endpoint");
			let reason = err.to_string();
			self.transition(ConnectionState::Failed(reason.clone()), Some(&reason))
				.await;
			return Err(err.into());
		}

		let options = LinkOptions {
			client_id: self.settings.client_id(),
			keep_alive: self.settings.keep_alive,
			request_capacity: self.settings.event_loop_capacity,
		};
		info!(
			endpoint = %endpoint,
			client_id = %options.client_id,
			generation = self.generation,
			"Connecting to broker"
		);
		let events = LinkEvents::new(self.generation, self.link_tx.clone());
		match self.connector.open(&endpoint, options, events) {
			| Ok(link) => {
				self.link = Some(link);
				self.connect_deadline =
					Some(Instant::now() + self.settings.connect_timeout);
				self.transition(ConnectionState::Connecting, None).await;
				Ok(())
			}
			| Err(err) => {
				error!(endpoint = %endpoint, error = %err, "Failed to open transport link");
				let reason = err.to_string();
				self.transition(
					ConnectionState::Failed(reason.clone()),
					Some(&reason),
				)
				.await;
				Err(err.into())
			}
		}
	}

	async fn handle_disconnect(&mut self) {
		self.drop_link();
		self.transition(ConnectionState::Disconnected, None).await;
	}

	fn handle_subscribe(&mut self, topic: ArcStr) -> Result<(), SessionError> {
		if !self.registry.want(topic.clone()) {
			debug!(topic = %topic, "Topic already wanted");
			return Ok(());
		}
		if !self.state().is_connected() {
			debug!(topic = %topic, "Not connected, subscription deferred");
			return Ok(());
		}
		let link = self.link.as_ref().ok_or(SessionError::NotConnected)?;
		link.subscribe(&topic)?;
		debug!(topic = %topic, "Subscribe request issued");
		Ok(())
	}

	fn handle_unsubscribe(&mut self, topic: &str) -> Result<(), SessionError> {
		if !self.registry.unwant(topic) {
			debug!(topic = %topic, "Topic was not active, nothing to send");
			return Ok(());
		}
		let Some(link) = self.link.as_ref() else {
			return Ok(());
		};
		if let Err(err) = link.unsubscribe(topic) {
			// Nothing in flight, so the topic stays wanted.
			self.registry.want(ArcStr::from(topic));
			return Err(err.into());
		}
		debug!(topic = %topic, "Unsubscribe request issued");
		Ok(())
	}

	fn handle_publish(
		&mut self,
		topic: &str,
		payload: Bytes,
	) -> Result<(), SessionError> {
		if !self.state().is_connected() {
			return Err(SessionError::NotConnected);
		}
		let link = self.link.as_ref().ok_or(SessionError::NotConnected)?;
		link.publish(topic, payload)?;
		Ok(())
	}

	async fn handle_link_event(&mut self, generation: u64, event: LinkEvent) {
		if generation != self.generation || self.link.is_none() {
			debug!(
				generation,
				current = self.generation,
				event = ?event,
				"Ignoring event from superseded link"
			);
			return;
		}
		match event {
			| LinkEvent::Connected => self.handle_connected().await,
			| LinkEvent::Refused(reason) | LinkEvent::Unreachable(reason) => {
				warn!(reason = %reason, "Connection attempt failed");
				self.drop_link();
				self.transition(ConnectionState::Failed(reason.clone()), Some(&reason))
					.await;
			}
			| LinkEvent::Lost(reason) => {
				warn!(reason = %reason, "Connection lost");
				self.drop_link();
				self.transition(ConnectionState::Disconnected, Some(&reason))
					.await;
			}
			| LinkEvent::SubscribeAck {
				topic,
				granted: true,
			} => {
				if self.registry.on_subscribe_ack(&topic) {
					debug!(topic = %topic, "Subscription active");
					self.emit(SessionEvent::SubscribeAck { topic }).await;
				} else if let Some(link) = self.link.as_ref() {
					debug!(topic = %topic, "Acknowledged topic no longer wanted, unsubscribing");
					if let Err(err) = link.unsubscribe(&topic) {
						warn!(topic = %topic, error = %err, "Failed to unsubscribe unwanted topic");
					}
				}
			}
			| LinkEvent::SubscribeAck {
				topic,
				granted: false,
			} => {
				warn!(topic = %topic, "Broker refused subscription");
				self.emit(SessionEvent::SubscribeFailed {
					topic,
					reason: "subscription refused by broker".to_string(),
				})
				.await;
			}
			| LinkEvent::UnsubscribeAck { topic } => {
				self.registry.on_unsubscribe_ack(&topic);
				self.emit(SessionEvent::UnsubscribeAck { topic }).await;
			}
			| LinkEvent::Message { topic, payload } => {
				self.emit(SessionEvent::Message(InboundMessage {
					topic,
					payload,
					received_at: Utc::now(),
				}))
				.await;
			}
		}
	}

	async fn handle_connected(&mut self) {
		if !self.state().is_connecting() {
			debug!(state = %self.state(), "Unexpected connection acknowledgment");
			return;
		}
		self.connect_deadline = None;
		self.transition(ConnectionState::Connected, None).await;

		let topics = self.registry.on_connected();
		if topics.is_empty() {
			return;
		}
		let Some(link) = self.link.as_ref() else {
			return;
		};
		match link.subscribe_many(&topics) {
			| Ok(()) => debug!(count = topics.len(), "Subscribe requests issued"),
			| Err(err) => {
				warn!(count = topics.len(), error = %err, "Failed to issue subscribe requests");
				let reason = err.to_string();
				for topic in topics {
					self.emit(SessionEvent::SubscribeFailed {
						topic,
						reason: reason.clone(),
					})
					.await;
				}
			}
		}
	}

	async fn handle_connect_timeout(&mut self) {
		self.connect_deadline = None;
		if !self.state().is_connecting() {
			return;
		}
		warn!(
			timeout_ms = self.settings.connect_timeout.as_millis() as u64,
			"Connection attempt timed out"
		);
		self.drop_link();
		self.transition(
			ConnectionState::Failed(TIMEOUT_REASON.to_string()),
			Some(TIMEOUT_REASON),
		)
		.await;
	}

	/// Closes the current link (if any) and invalidates its callbacks.
	fn drop_link(&mut self) {
		self.generation += 1;
		self.connect_deadline = None;
		if let Some(mut link) = self.link.take() {
			link.close();
		}
		self.registry.on_disconnected();
	}

	fn state(&self) -> ConnectionState {
		self.state_tx.borrow().clone()
	}

	async fn transition(&mut self, state: ConnectionState, reason: Option<&str>) {
		if *self.state_tx.borrow() == state {
			return;
		}
		info!(state = %state, reason = ?reason, "Connection state changed");
		self.state_tx.send_replace(state.clone());
		self.emit(SessionEvent::StateChanged(ConnectivityChange {
			state,
			reason: reason.map(str::to_string),
		}))
		.await;
	}

	async fn emit(&self, event: SessionEvent) {
		if self.event_tx.send(event).await.is_err() {
			debug!("Session event receiver dropped");
		}
	}
}

async fn wait_for_deadline(deadline: Option<Instant>) {
	match deadline {
		| Some(deadline) => sleep_until(deadline).await,
		| None => std::future::pending().await,
	}
}

fn respond<T>(reply: Reply<T>, result: Result<T, SessionError>) {
	if let Err(Err(err)) = reply.send(result) {
		debug!(error = %err, "Caller went away before receiving the error");
	}
}

/// Tears a session down.
pub struct SessionController {
	shutdown_tx: oneshot::Sender<()>,
	join_handle: JoinHandle<()>,
}

impl SessionController {
	/// Closes the link and stops the session task.
	pub async fn shutdown(self) -> Result<(), JoinError> {
		let _ = self.shutdown_tx.send(()).inspect_err(|_| {
			warn!("SessionController: Shutdown signal already sent");
		});
		self.join_handle.await.inspect_err(|e| {
			warn!(error = ?e, "SessionController: Session task failed");
		})
	}
}

/// Cloneable entry point for session operations
#[derive(Debug, Clone)]
pub struct SessionHandle {
	command_tx: mpsc::Sender<Command>,
	state_rx: watch::Receiver<ConnectionState>,
}

impl SessionHandle {
	/// Starts connecting to `endpoint`, replacing any current connection.
	///
	/// Returns once the attempt is under way; the outcome arrives as a
	/// state change.
	pub async fn connect(
		&self,
		endpoint: BrokerEndpoint,
	) -> Result<(), SessionError> {
		self.request(|reply| Command::Connect(endpoint, reply)).await?
	}

	/// Closes the connection. Does nothing if already disconnected.
	pub async fn disconnect(&self) -> Result<(), SessionError> {
		self.request(Command::Disconnect).await
	}

	/// Records interest in `topic`; subscribes now if connected, otherwise on
	/// the next successful connection.
	pub async fn subscribe(
		&self,
		topic: impl Into<ArcStr>,
	) -> Result<(), SessionError> {
		let topic = topic.into();
		validate_topic_filter(&topic)?;
		self.request(|reply| Command::Subscribe(topic, reply)).await?
	}

	/// Drops interest in `topic`.
	pub async fn unsubscribe(
		&self,
		topic: impl Into<ArcStr>,
	) -> Result<(), SessionError> {
		let topic = topic.into();
		validate_topic_filter(&topic)?;
		self.request(|reply| Command::Unsubscribe(topic, reply))
			.await?
	}

	/// Publishes at QoS 1, not retained. Requires a connection.
	pub async fn publish(
		&self,
		topic: impl Into<ArcStr>,
		payload: impl Into<Bytes>,
	) -> Result<(), SessionError> {
		let topic = topic.into();
		validate_publish_topic(&topic)?;
		let payload = payload.into();
		self.request(|reply| Command::Publish(topic, payload, reply))
			.await?
	}

	/// Current connection state
	pub fn state(&self) -> ConnectionState {
		self.state_rx.borrow().clone()
	}

	/// Receiver that observes every state change
	pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
		self.state_rx.clone()
	}

	/// Topics the caller wants, connected or not
	pub async fn wanted_topics(&self) -> Result<Vec<ArcStr>, SessionError> {
		self.request(Command::WantedTopics).await
	}

	/// Topics the broker has confirmed for the current connection
	pub async fn active_topics(&self) -> Result<Vec<ArcStr>, SessionError> {
		self.request(Command::ActiveTopics).await
	}

	async fn request<R>(
		&self,
		command: impl FnOnce(oneshot::Sender<R>) -> Command,
	) -> Result<R, SessionError> {
		let (tx, rx) = oneshot::channel();
		self.command_tx
			.send(command(tx))
			.await
			.map_err(|_| SessionError::ChannelClosed)?;
		rx.await.map_err(|_| SessionError::ResponseLost)
	}
}
