use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use arcstr::ArcStr;
use chrono::{DateTime, Utc};

use crate::payload::SensorReading;

/// Bounded look-back over recent readings plus per-topic last-seen times
#[derive(Debug)]
pub(crate) struct ReadingHistory {
	capacity: usize,
	readings: VecDeque<Arc<SensorReading>>,
	last_seen: HashMap<ArcStr, DateTime<Utc>>,
}

impl ReadingHistory {
	pub(crate) fn new(capacity: usize) -> Self {
		Self {
			capacity,
			readings: VecDeque::with_capacity(capacity),
			last_seen: HashMap::new(),
		}
	}

	pub(crate) fn record(
		&mut self,
		topic: &ArcStr,
		reading: Arc<SensorReading>,
		received_at: DateTime<Utc>,
	) {
		self.last_seen.insert(topic.clone(), received_at);
		if self.capacity == 0 {
			return;
		}
		while self.readings.len() >= self.capacity {
			self.readings.pop_front();
		}
		self.readings.push_back(reading);
	}

	/// Oldest first
	pub(crate) fn recent(&self) -> Vec<Arc<SensorReading>> {
		self.readings.iter().cloned().collect()
	}

	pub(crate) fn last_seen(&self, topic: &str) -> Option<DateTime<Utc>> {
		self.last_seen.get(topic).copied()
	}
}
