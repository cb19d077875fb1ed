use std::time::Duration;

use arcstr::ArcStr;
use bytes::Bytes;
use tokio::sync::mpsc::Receiver;

use super::mock_transport::{LinkCall, OnOpen, ScriptedConnector};
use super::*;
use crate::config::{BrokerEndpoint, EndpointError, SessionSettings};

fn spawn_session(
	connector: &ScriptedConnector,
) -> (SessionController, SessionHandle, Receiver<SessionEvent>) {
	ConnectionSession::spawn(connector.clone(), SessionSettings::default())
}

async fn next_event(events: &mut Receiver<SessionEvent>) -> SessionEvent {
	tokio::time::timeout(Duration::from_secs(5), events.recv())
		.await
		.expect("timed out waiting for session event")
		.expect("session event stream ended")
}

async fn next_state(events: &mut Receiver<SessionEvent>) -> ConnectivityChange {
	match next_event(events).await {
		| SessionEvent::StateChanged(change) => change,
		| other => panic!("expected a state change, got {other:?}"),
	}
}

fn drain(events: &mut Receiver<SessionEvent>) -> Vec<SessionEvent> {
	std::iter::from_fn(|| events.try_recv().ok()).collect()
}

async fn settle(handle: &SessionHandle) {
	handle.wanted_topics().await.unwrap();
}

async fn connected_session(
	connector: &ScriptedConnector,
) -> (SessionController, SessionHandle, Receiver<SessionEvent>) {
	let (controller, handle, mut events) = spawn_session(connector);
	handle.connect(BrokerEndpoint::localhost()).await.unwrap();
	assert_eq!(next_state(&mut events).await.state, ConnectionState::Connecting);
	let index = connector.attempts().len() - 1;
	connector.attempt(index).send(LinkEvent::Connected).await;
	assert_eq!(next_state(&mut events).await.state, ConnectionState::Connected);
	(controller, handle, events)
}

fn topics(list: &[&str]) -> Vec<ArcStr> {
	list.iter().map(|t| ArcStr::from(*t)).collect()
}

#[tokio::test]
async fn test_connect_reaches_connected() {
	let connector = ScriptedConnector::new(OnOpen::Accept);
	let (controller, handle, mut events) = spawn_session(&connector);
	assert_eq!(handle.state(), ConnectionState::Disconnected);

	handle.connect(BrokerEndpoint::localhost()).await.unwrap();
	assert_eq!(next_state(&mut events).await.state, ConnectionState::Connecting);
	assert_eq!(next_state(&mut events).await.state, ConnectionState::Connected);
	assert_eq!(handle.state(), ConnectionState::Connected);

	let attempt = connector.attempt(0);
	assert_eq!(attempt.endpoint, BrokerEndpoint::localhost());
	assert!(attempt.client_id.starts_with("PoolSensors-"));
	controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_intent_is_replayed_once_after_connect() {
	let connector = ScriptedConnector::default();
	let (controller, handle, mut events) = spawn_session(&connector);

	handle.subscribe("pool/1/data").await.unwrap();
	assert!(connector.attempts().is_empty());
	assert_eq!(handle.wanted_topics().await.unwrap(), topics(&["pool/1/data"]));
	assert!(handle.active_topics().await.unwrap().is_empty());

	handle.connect(BrokerEndpoint::localhost()).await.unwrap();
	assert_eq!(next_state(&mut events).await.state, ConnectionState::Connecting);
	let attempt = connector.attempt(0);
	assert!(attempt.subscribes().is_empty());

	attempt.send(LinkEvent::Connected).await;
	assert_eq!(next_state(&mut events).await.state, ConnectionState::Connected);
	settle(&handle).await;
	assert_eq!(attempt.subscribes(), vec!["pool/1/data".to_string()]);

	attempt
		.send(LinkEvent::SubscribeAck {
			topic: ArcStr::from("pool/1/data"),
			granted: true,
		})
		.await;
	assert_eq!(
		next_event(&mut events).await,
		SessionEvent::SubscribeAck {
			topic: ArcStr::from("pool/1/data")
		}
	);
	assert_eq!(handle.active_topics().await.unwrap(), topics(&["pool/1/data"]));
	controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_superseded_attempt_is_ignored() {
	let connector = ScriptedConnector::default();
	let (controller, handle, mut events) = spawn_session(&connector);

	handle
		.connect(BrokerEndpoint::new("broker-a", 1883))
		.await
		.unwrap();
	handle
		.connect(BrokerEndpoint::new("broker-b", 1883))
		.await
		.unwrap();

	let first = connector.attempt(0);
	let second = connector.attempt(1);
	assert_eq!(first.endpoint.host(), "broker-a");
	assert_eq!(second.endpoint.host(), "broker-b");
	assert!(first.is_closed());
	assert!(!second.is_closed());

	first.send(LinkEvent::Connected).await;
	second
		.send(LinkEvent::Refused("bad username or password".to_string()))
		.await;

	let states: Vec<ConnectionState> = [
		next_state(&mut events).await,
		next_state(&mut events).await,
		next_state(&mut events).await,
		next_state(&mut events).await,
	]
	.into_iter()
	.map(|change| change.state)
	.collect();
	assert_eq!(
		states,
		vec![
			ConnectionState::Connecting,
			ConnectionState::Disconnected,
			ConnectionState::Connecting,
			ConnectionState::Failed("bad username or password".to_string()),
		]
	);
	settle(&handle).await;
	assert!(drain(&mut events).is_empty());
	controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
	let connector = ScriptedConnector::default();
	let (controller, handle, mut events) = connected_session(&connector).await;

	handle.subscribe("pool/1/data").await.unwrap();
	connector
		.attempt(0)
		.send(LinkEvent::SubscribeAck {
			topic: ArcStr::from("pool/1/data"),
			granted: true,
		})
		.await;
	assert!(matches!(
		next_event(&mut events).await,
		SessionEvent::SubscribeAck { .. }
	));

	handle.disconnect().await.unwrap();
	let change = next_state(&mut events).await;
	assert_eq!(change.state, ConnectionState::Disconnected);
	assert_eq!(change.reason, None);
	assert!(connector.attempt(0).is_closed());
	assert!(handle.active_topics().await.unwrap().is_empty());
	assert_eq!(handle.wanted_topics().await.unwrap(), topics(&["pool/1/data"]));

	handle.disconnect().await.unwrap();
	assert!(drain(&mut events).is_empty());
	assert_eq!(handle.state(), ConnectionState::Disconnected);
	controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reconnect_rebuilds_active_from_intent() {
	let connector = ScriptedConnector::default();
	let (controller, handle, mut events) = connected_session(&connector).await;

	for topic in ["pool/1/data", "pool/2/data"] {
		handle.subscribe(topic).await.unwrap();
		connector
			.attempt(0)
			.send(LinkEvent::SubscribeAck {
				topic: ArcStr::from(topic),
				granted: true,
			})
			.await;
		assert!(matches!(
			next_event(&mut events).await,
			SessionEvent::SubscribeAck { .. }
		));
	}

	connector
		.attempt(0)
		.send(LinkEvent::Lost("network down".to_string()))
		.await;
	let change = next_state(&mut events).await;
	assert_eq!(change.state, ConnectionState::Disconnected);
	assert_eq!(change.reason.as_deref(), Some("network down"));
	assert!(handle.active_topics().await.unwrap().is_empty());

	handle.connect(BrokerEndpoint::localhost()).await.unwrap();
	assert_eq!(next_state(&mut events).await.state, ConnectionState::Connecting);
	let second = connector.attempt(1);
	second.send(LinkEvent::Connected).await;
	assert_eq!(next_state(&mut events).await.state, ConnectionState::Connected);
	settle(&handle).await;

	let mut resubscribed = second.subscribes();
	resubscribed.sort();
	assert_eq!(resubscribed, vec!["pool/1/data", "pool/2/data"]);
	assert_ne!(connector.attempt(0).client_id, second.client_id);
	controller.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_fails_attempt() {
	let connector = ScriptedConnector::default();
	let settings = SessionSettings {
		connect_timeout: Duration::from_secs(2),
		..SessionSettings::default()
	};
	let (controller, handle, mut events) =
		ConnectionSession::spawn(connector.clone(), settings);

	handle.connect(BrokerEndpoint::localhost()).await.unwrap();
	assert_eq!(next_state(&mut events).await.state, ConnectionState::Connecting);

	let change = next_state(&mut events).await;
	assert_eq!(change.state, ConnectionState::Failed("timeout".to_string()));
	assert_eq!(change.reason.as_deref(), Some("timeout"));
	assert!(connector.attempt(0).is_closed());

	// A late acceptance from the timed-out attempt changes nothing.
	connector.attempt(0).send(LinkEvent::Connected).await;
	handle.connect(BrokerEndpoint::localhost()).await.unwrap();
	connector
		.attempt(1)
		.send(LinkEvent::Unreachable("no route to host".to_string()))
		.await;
	assert_eq!(next_state(&mut events).await.state, ConnectionState::Disconnected);
	assert_eq!(next_state(&mut events).await.state, ConnectionState::Connecting);
	assert_eq!(
		next_state(&mut events).await.state,
		ConnectionState::Failed("no route to host".to_string())
	);
	controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_refused_session_stays_usable() {
	let connector =
		ScriptedConnector::new(OnOpen::Refuse("not authorized".to_string()));
	let (controller, handle, mut events) = spawn_session(&connector);

	handle.connect(BrokerEndpoint::localhost()).await.unwrap();
	assert_eq!(next_state(&mut events).await.state, ConnectionState::Connecting);
	let change = next_state(&mut events).await;
	assert_eq!(
		change.state,
		ConnectionState::Failed("not authorized".to_string())
	);
	assert!(connector.attempt(0).is_closed());

	connector.set_on_open(OnOpen::Accept);
	handle.connect(BrokerEndpoint::localhost()).await.unwrap();
	assert_eq!(next_state(&mut events).await.state, ConnectionState::Disconnected);
	assert_eq!(next_state(&mut events).await.state, ConnectionState::Connecting);
	assert_eq!(next_state(&mut events).await.state, ConnectionState::Connected);
	controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_endpoint_fails_without_opening_link() {
	let connector = ScriptedConnector::new(OnOpen::Accept);
	let (controller, handle, mut events) = spawn_session(&connector);

	let err = handle
		.connect(BrokerEndpoint::new("", 1883))
		.await
		.unwrap_err();
	assert!(matches!(err, SessionError::Endpoint(EndpointError::EmptyHost)));
	assert!(matches!(
		next_state(&mut events).await.state,
		ConnectionState::Failed(_)
	));
	assert!(connector.attempts().is_empty());
	controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_open_failure_is_reported() {
	let connector = ScriptedConnector::new(OnOpen::FailOpen);
	let (controller, handle, mut events) = spawn_session(&connector);

	let err = handle
		.connect(BrokerEndpoint::localhost())
		.await
		.unwrap_err();
	assert!(matches!(
		err,
		SessionError::Transport(TransportError::Setup(_))
	));
	assert!(matches!(
		next_state(&mut events).await.state,
		ConnectionState::Failed(_)
	));
	controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_refused_subscription_leaves_others_active() {
	let connector = ScriptedConnector::default();
	let (controller, handle, mut events) = connected_session(&connector).await;
	let attempt = connector.attempt(0);

	handle.subscribe("pool/1/data").await.unwrap();
	handle.subscribe("pool/secret/data").await.unwrap();
	attempt
		.send(LinkEvent::SubscribeAck {
			topic: ArcStr::from("pool/1/data"),
			granted: true,
		})
		.await;
	attempt
		.send(LinkEvent::SubscribeAck {
			topic: ArcStr::from("pool/secret/data"),
			granted: false,
		})
		.await;

	assert!(matches!(
		next_event(&mut events).await,
		SessionEvent::SubscribeAck { .. }
	));
	match next_event(&mut events).await {
		| SessionEvent::SubscribeFailed { topic, .. } => {
			assert_eq!(topic, "pool/secret/data");
		}
		| other => panic!("unexpected event {other:?}"),
	}
	assert_eq!(handle.state(), ConnectionState::Connected);
	assert_eq!(handle.active_topics().await.unwrap(), topics(&["pool/1/data"]));
	assert_eq!(handle.wanted_topics().await.unwrap().len(), 2);
	controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_publish_requires_connection() {
	let connector = ScriptedConnector::default();
	let (controller, handle, _events) = spawn_session(&connector);

	let err = handle
		.publish("pool/1/data", Bytes::from_static(b"{}"))
		.await
		.unwrap_err();
	assert!(matches!(err, SessionError::NotConnected));
	controller.shutdown().await.unwrap();

	let (controller, handle, _events) = connected_session(&connector).await;
	handle
		.publish("pool/1/data", Bytes::from_static(b"{}"))
		.await
		.unwrap();
	assert!(connector.attempt(0).calls().contains(&LinkCall::Publish(
		"pool/1/data".to_string(),
		Bytes::from_static(b"{}")
	)));

	let err = handle.publish("pool/+/data", Bytes::new()).await.unwrap_err();
	assert!(matches!(err, SessionError::InvalidTopic(_)));
	controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_filter_is_rejected_before_recording() {
	let connector = ScriptedConnector::default();
	let (controller, handle, _events) = spawn_session(&connector);

	let err = handle.subscribe("pool/#/data").await.unwrap_err();
	assert!(matches!(err, SessionError::InvalidTopic(_)));
	assert!(handle.wanted_topics().await.unwrap().is_empty());
	controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unsubscribe_round_trip() {
	let connector = ScriptedConnector::default();
	let (controller, handle, mut events) = connected_session(&connector).await;
	let attempt = connector.attempt(0);

	handle.subscribe("pool/1/data").await.unwrap();
	attempt
		.send(LinkEvent::SubscribeAck {
			topic: ArcStr::from("pool/1/data"),
			granted: true,
		})
		.await;
	next_event(&mut events).await;

	handle.unsubscribe("pool/1/data").await.unwrap();
	assert!(
		attempt
			.calls()
			.contains(&LinkCall::Unsubscribe("pool/1/data".to_string()))
	);
	assert!(handle.wanted_topics().await.unwrap().is_empty());

	attempt
		.send(LinkEvent::UnsubscribeAck {
			topic: ArcStr::from("pool/1/data"),
		})
		.await;
	assert_eq!(
		next_event(&mut events).await,
		SessionEvent::UnsubscribeAck {
			topic: ArcStr::from("pool/1/data")
		}
	);
	assert!(handle.active_topics().await.unwrap().is_empty());
	controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_ack_for_dropped_topic_unsubscribes() {
	let connector = ScriptedConnector::default();
	let (controller, handle, mut events) = connected_session(&connector).await;
	let attempt = connector.attempt(0);

	handle.subscribe("pool/1/data").await.unwrap();
	handle.unsubscribe("pool/1/data").await.unwrap();
	assert!(
		!attempt
			.calls()
			.contains(&LinkCall::Unsubscribe("pool/1/data".to_string()))
	);

	attempt
		.send(LinkEvent::SubscribeAck {
			topic: ArcStr::from("pool/1/data"),
			granted: true,
		})
		.await;
	attempt
		.send(LinkEvent::Message {
			topic: ArcStr::from("pool/1/data"),
			payload: Bytes::from_static(b"late"),
		})
		.await;
	assert!(matches!(
		next_event(&mut events).await,
		SessionEvent::Message(_)
	));
	assert!(
		attempt
			.calls()
			.contains(&LinkCall::Unsubscribe("pool/1/data".to_string()))
	);
	assert!(handle.active_topics().await.unwrap().is_empty());
	controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_messages_arrive_in_order() {
	let connector = ScriptedConnector::default();
	let (controller, _handle, mut events) = connected_session(&connector).await;
	let attempt = connector.attempt(0);

	for body in ["first", "second", "third"] {
		attempt
			.send(LinkEvent::Message {
				topic: ArcStr::from("pool/1/data"),
				payload: Bytes::from(body),
			})
			.await;
	}
	for body in ["first", "second", "third"] {
		match next_event(&mut events).await {
			| SessionEvent::Message(message) => {
				assert_eq!(message.topic, "pool/1/data");
				assert_eq!(message.payload, Bytes::from(body));
			}
			| other => panic!("unexpected event {other:?}"),
		}
	}
	controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_reports_disconnect() {
	let connector = ScriptedConnector::default();
	let (controller, _handle, mut events) = connected_session(&connector).await;

	controller.shutdown().await.unwrap();
	let change = next_state(&mut events).await;
	assert_eq!(change.state, ConnectionState::Disconnected);
	assert_eq!(change.reason.as_deref(), Some("session shut down"));
	assert!(connector.attempt(0).is_closed());
	assert!(events.recv().await.is_none());
}

#[tokio::test]
async fn test_probe_reports_outcome() {
	let accepted = ScriptedConnector::new(OnOpen::Accept);
	probe_endpoint(
		accepted.clone(),
		BrokerEndpoint::localhost(),
		Duration::from_secs(1),
	)
	.await
	.unwrap();
	assert!(accepted.attempt(0).is_closed());

	let refused =
		ScriptedConnector::new(OnOpen::Refuse("not authorized".to_string()));
	let err = probe_endpoint(
		refused,
		BrokerEndpoint::localhost(),
		Duration::from_secs(1),
	)
	.await
	.unwrap_err();
	assert!(
		matches!(err, SessionError::ConnectFailed(reason) if reason == "not authorized")
	);
}

#[tokio::test]
async fn test_failed_unsubscribe_keeps_topic_wanted() {
	let connector = ScriptedConnector::default();
	let (controller, handle, mut events) = connected_session(&connector).await;
	let attempt = connector.attempt(0);

	handle.subscribe("pool/1/data").await.unwrap();
	attempt
		.send(LinkEvent::SubscribeAck {
			topic: ArcStr::from("pool/1/data"),
			granted: true,
		})
		.await;
	next_event(&mut events).await;

	connector.set_rejecting(true);
	let err = handle.unsubscribe("pool/1/data").await.unwrap_err();
	assert!(matches!(
		err,
		SessionError::Transport(TransportError::Closed)
	));
	assert_eq!(handle.wanted_topics().await.unwrap(), topics(&["pool/1/data"]));
	assert_eq!(handle.active_topics().await.unwrap(), topics(&["pool/1/data"]));

	connector.set_rejecting(false);
	handle.unsubscribe("pool/1/data").await.unwrap();
	assert!(
		attempt
			.calls()
			.contains(&LinkCall::Unsubscribe("pool/1/data".to_string()))
	);
	assert!(handle.wanted_topics().await.unwrap().is_empty());
	controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_replay_failure_reports_every_topic() {
	let connector = ScriptedConnector::default();
	let (controller, handle, mut events) = spawn_session(&connector);
	handle.subscribe("pool/1/data").await.unwrap();
	handle.subscribe("pool/2/data").await.unwrap();

	handle.connect(BrokerEndpoint::localhost()).await.unwrap();
	assert_eq!(next_state(&mut events).await.state, ConnectionState::Connecting);
	connector.set_rejecting(true);
	connector.attempt(0).send(LinkEvent::Connected).await;
	assert_eq!(next_state(&mut events).await.state, ConnectionState::Connected);

	let mut failed = Vec::new();
	for _ in 0 .. 2 {
		match next_event(&mut events).await {
			| SessionEvent::SubscribeFailed { topic, .. } => failed.push(topic),
			| other => panic!("unexpected event {other:?}"),
		}
	}
	assert_eq!(failed, topics(&["pool/1/data", "pool/2/data"]));
	assert_eq!(handle.state(), ConnectionState::Connected);
	assert_eq!(handle.wanted_topics().await.unwrap().len(), 2);
	controller.shutdown().await.unwrap();
}
