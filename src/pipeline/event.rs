use std::sync::Arc;

use arcstr::ArcStr;
use chrono::{DateTime, Utc};

use crate::payload::{ParseError, SensorReading};
use crate::session::ConnectivityChange;

/// What observers of a pipeline receive
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
	/// A message was parsed into a reading
	Reading {
		/// Topic the message arrived on
		topic: ArcStr,
		/// The reading, shared between all observers
		reading: Arc<SensorReading>,
	},
	/// A message could not be parsed
	ParseFailure {
		/// Topic the message arrived on
		topic: ArcStr,
		/// Why both formats rejected it
		error: ParseError,
		/// When it was received
		received_at: DateTime<Utc>,
	},
	/// Connection state changed
	Connectivity(ConnectivityChange),
	/// A subscription could not be placed
	SubscriptionFailed {
		/// Filter that failed
		topic: ArcStr,
		/// Why
		reason: String,
	},
}
