//! `pool-monitor`: subscribes to the configured pool devices and prints
//! their readings until interrupted or the connection ends.
//!
//! Configuration comes from the environment (or `.env`), see
//! [`TelemetryConfig::from_env`].

use std::collections::HashMap;

use arcstr::ArcStr;
use pool_telemetry::prelude::*;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a subscriber when `RUST_LOG` is set, unless `RUST_LOG_DISABLE`
/// is. Silent otherwise.
fn setup_tracing() {
	if std::env::var("RUST_LOG_DISABLE").is_ok() {
		return;
	}
	if std::env::var("RUST_LOG").is_err() {
		return;
	}
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| "info".into());
	tracing_subscriber::registry()
		.with(filter)
		.with(
			tracing_subscriber::fmt::layer()
				.with_target(true)
				.with_thread_ids(false)
				.with_file(false)
				.with_line_number(false)
				.compact(),
		)
		.init();
}

/// Handles one event; returns `false` once the monitor should stop.
fn report(devices: &HashMap<ArcStr, String>, event: PipelineEvent) -> bool {
	match event {
		| PipelineEvent::Reading { topic, reading } => {
			let device = devices.get(&topic).map_or(topic.as_str(), String::as_str);
			println!(
				"[{}] {device}: {:.1} °C  pH {:.2}  Cl {:.2} mg/L  ORP {:.0} mV",
				reading.timestamp().format("%Y-%m-%d %H:%M:%S"),
				reading.temperature(),
				reading.ph(),
				reading.chlorine(),
				reading.orp(),
			);
			true
		}
		| PipelineEvent::ParseFailure { topic, error, .. } => {
			warn!(topic = %topic, error = %error, "Unreadable sensor payload");
			true
		}
		| PipelineEvent::SubscriptionFailed { topic, reason } => {
			error!(topic = %topic, reason = %reason, "Subscription failed");
			true
		}
		| PipelineEvent::Connectivity(change) => {
			info!(state = %change.state, reason = ?change.reason, "Connectivity changed");
			match change.state {
				| ConnectionState::Connected => {
					println!("connected, waiting for readings");
					true
				}
				| ConnectionState::Failed(reason) => {
					eprintln!("connection failed: {reason}");
					false
				}
				| ConnectionState::Disconnected if change.reason.is_some() => {
					eprintln!(
						"connection lost: {}",
						change.reason.unwrap_or_default()
					);
					false
				}
				| _ => true,
			}
		}
	}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	// Load .env first so RUST_LOG can come from it too
	dotenv::dotenv().ok();
	setup_tracing();

	let config = TelemetryConfig::from_env()?;
	if config.devices.is_empty() {
		warn!("POOL_DEVICES is empty, no topics will be subscribed");
	}

	let (client, connection) = IngestionPipeline::spawn(
		RumqttConnector::new(),
		config.session.clone(),
		config.pipeline.clone(),
	);
	let mut events = client.observe();

	let mut devices = HashMap::new();
	for device in &config.devices {
		client.subscribe(device.topic.clone()).await?;
		devices.insert(device.topic.clone(), device.name.clone());
	}
	println!("connecting to {}", config.endpoint);
	client.connect(config.endpoint.clone()).await?;

	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => {
				info!("Interrupted, shutting down");
				break;
			}
			event = events.recv() => {
				match event {
					| Ok(event) => {
						if !report(&devices, event) {
							break;
						}
					}
					| Err(RecvError::Lagged(skipped)) => {
						warn!(skipped, "Monitor fell behind, events skipped");
					}
					| Err(RecvError::Closed) => break,
				}
			}
		}
	}

	client.disconnect().await?;
	connection.shutdown().await?;
	Ok(())
}
