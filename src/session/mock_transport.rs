//! In-memory transport for exercising sessions without a broker

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use super::error::TransportError;
use super::transport::{
	Connector, LinkEvent, LinkEvents, LinkOptions, TransportLink,
};
use crate::config::BrokerEndpoint;

/// What a link does right after it is opened
#[derive(Debug, Clone, Default)]
pub(crate) enum OnOpen {
	/// Nothing; the test drives the link
	#[default]
	Wait,
	/// Report `Connected`
	Accept,
	/// Report `Refused`
	Refuse(String),
	/// Fail `open` itself
	FailOpen,
}

/// Request recorded by a scripted link
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LinkCall {
	Subscribe(String),
	Unsubscribe(String),
	Publish(String, Bytes),
	Close,
}

/// One `open` call
#[derive(Debug, Clone)]
pub(crate) struct Attempt {
	pub endpoint: BrokerEndpoint,
	pub client_id: String,
	pub events: LinkEvents,
	calls: Arc<Mutex<Vec<LinkCall>>>,
}

impl Attempt {
	pub fn calls(&self) -> Vec<LinkCall> {
		self.calls.lock().unwrap().clone()
	}

	pub fn subscribes(&self) -> Vec<String> {
		self.calls()
			.into_iter()
			.filter_map(|call| match call {
				| LinkCall::Subscribe(topic) => Some(topic),
				| _ => None,
			})
			.collect()
	}

	pub fn is_closed(&self) -> bool {
		self.calls().contains(&LinkCall::Close)
	}

	pub async fn send(&self, event: LinkEvent) {
		self.events.send(event).await.unwrap();
	}
}

#[derive(Debug, Default)]
struct Script {
	on_open: OnOpen,
	attempts: Vec<Attempt>,
}

/// Connector whose links record requests and report scripted events
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedConnector {
	script: Arc<Mutex<Script>>,
	rejecting: Arc<AtomicBool>,
}

impl ScriptedConnector {
	pub fn new(on_open: OnOpen) -> Self {
		let connector = Self::default();
		connector.set_on_open(on_open);
		connector
	}

	pub fn set_on_open(&self, on_open: OnOpen) {
		self.script.lock().unwrap().on_open = on_open;
	}

	/// While set, every link refuses new requests.
	pub fn set_rejecting(&self, rejecting: bool) {
		self.rejecting.store(rejecting, Ordering::SeqCst);
	}

	pub fn attempts(&self) -> Vec<Attempt> {
		self.script.lock().unwrap().attempts.clone()
	}

	pub fn attempt(&self, index: usize) -> Attempt {
		self.attempts()
			.get(index)
			.cloned()
			.unwrap_or_else(|| panic!("no connection attempt #{index}"))
	}
}

impl Connector for ScriptedConnector {
	fn open(
		&self,
		endpoint: &BrokerEndpoint,
		options: LinkOptions,
		events: LinkEvents,
	) -> Result<Box<dyn TransportLink>, TransportError> {
		let mut script = self.script.lock().unwrap();
		let reply = match &script.on_open {
			| OnOpen::Wait => None,
			| OnOpen::Accept => Some(LinkEvent::Connected),
			| OnOpen::Refuse(reason) => Some(LinkEvent::Refused(reason.clone())),
			| OnOpen::FailOpen => {
				return Err(TransportError::Setup("scripted failure".to_string()));
			}
		};
		let calls = Arc::new(Mutex::new(Vec::new()));
		script.attempts.push(Attempt {
			endpoint: endpoint.clone(),
			client_id: options.client_id,
			events: events.clone(),
			calls: Arc::clone(&calls),
		});
		if let Some(reply) = reply {
			tokio::spawn(async move {
				let _ = events.send(reply).await;
			});
		}
		Ok(Box::new(ScriptedLink {
			calls,
			rejecting: Arc::clone(&self.rejecting),
			closed: false,
		}))
	}
}

struct ScriptedLink {
	calls: Arc<Mutex<Vec<LinkCall>>>,
	rejecting: Arc<AtomicBool>,
	closed: bool,
}

impl ScriptedLink {
	fn record(&self, call: LinkCall) -> Result<(), TransportError> {
		if self.closed || self.rejecting.load(Ordering::SeqCst) {
			return Err(TransportError::Closed);
		}
		self.calls.lock().unwrap().push(call);
		Ok(())
	}
}

impl TransportLink for ScriptedLink {
	fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
		self.record(LinkCall::Subscribe(topic.to_string()))
	}

	fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
		self.record(LinkCall::Unsubscribe(topic.to_string()))
	}

	fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
		self.record(LinkCall::Publish(topic.to_string(), payload))
	}

	fn close(&mut self) {
		if !self.closed {
			self.calls.lock().unwrap().push(LinkCall::Close);
			self.closed = true;
		}
	}
}
