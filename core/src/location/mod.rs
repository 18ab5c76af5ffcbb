//! Position producers.
//!
//! Positions reach the monitor through two independent producers:
//! - [`ForegroundWatch`]: a high frequency watch that lives as long as the UI does and
//!   feeds the in-memory [`ProximityMonitor`](crate::ProximityMonitor);
//! - [`BackgroundWatch`]: an OS scheduled, lower frequency task that survives the UI and
//!   feeds a [`BackgroundEvaluator`], which sees nothing but the persisted state.

use crate::error::PermissionKind;

use std::{
	sync::{Arc, Weak},
	time::Duration,
};

use arrival_actors::Stopper;
use arrival_geo::Coordinate;
use async_channel as chan;
use async_trait::async_trait;
use futures_concurrency::future::Race;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

mod background;
mod foreground;

pub use background::{BackgroundEvaluator, BackgroundWatch};
pub use foreground::ForegroundWatch;

/// Name the background location task is registered under.
pub const BACKGROUND_TASK_NAME: &str = "background-location-task";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocationError {
	#[error("position could not be acquired: {0}")]
	Unavailable(String),
	#[error("location permission was revoked")]
	PermissionRevoked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
	Granted,
	Denied,
	Undetermined,
}

impl PermissionStatus {
	#[must_use]
	pub const fn is_granted(self) -> bool {
		matches!(self, Self::Granted)
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
	Low,
	Balanced,
	#[default]
	High,
	BestForNavigation,
}

/// Delivery thresholds for a watch: a new fix is delivered when either the interval has
/// elapsed or the device has moved further than the distance interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WatchOptions {
	pub interval_ms: u64,
	pub distance_interval_meters: f64,
	#[serde(default)]
	pub accuracy: Accuracy,
}

impl WatchOptions {
	#[must_use]
	pub const fn foreground() -> Self {
		Self {
			interval_ms: 5_000,
			distance_interval_meters: 10.0,
			accuracy: Accuracy::High,
		}
	}

	#[must_use]
	pub const fn background() -> Self {
		Self {
			interval_ms: 10_000,
			distance_interval_meters: 50.0,
			accuracy: Accuracy::High,
		}
	}

	#[must_use]
	pub const fn interval(&self) -> Duration {
		Duration::from_millis(self.interval_ms)
	}
}

/// Fixes (or failures to get one) as the platform produces them. The subscription ends
/// when the receiver is dropped.
pub type PositionStream = chan::Receiver<Result<Coordinate, LocationError>>;

/// The platform's location services.
#[async_trait]
pub trait LocationBackend: Send + Sync + 'static {
	async fn permission(&self, kind: PermissionKind) -> PermissionStatus;

	async fn request_permission(&self, kind: PermissionKind) -> PermissionStatus;

	/// One-shot position query.
	async fn current_position(&self) -> Result<Coordinate, LocationError>;

	async fn watch_position(&self, options: WatchOptions) -> Result<PositionStream, LocationError>;

	async fn register_background_task(
		&self,
		name: &str,
		options: WatchOptions,
	) -> Result<PositionStream, LocationError>;

	async fn unregister_background_task(&self, name: &str);

	async fn has_background_task(&self, name: &str) -> bool;
}

/// Consumer side of a producer.
#[async_trait]
pub trait PositionSink: Send + Sync + 'static {
	async fn on_position(&self, coordinate: Coordinate);

	async fn on_location_unavailable(&self, error: LocationError);
}

/// How a producer reaches its consumer. The foreground watch only holds a weak
/// reference so a dropped monitor ends its own subscription.
#[derive(Clone)]
pub(crate) enum SinkRef {
	Weak(Weak<dyn PositionSink>),
	Owned(Arc<dyn PositionSink>),
}

impl SinkRef {
	fn get(&self) -> Option<Arc<dyn PositionSink>> {
		match self {
			Self::Weak(sink) => sink.upgrade(),
			Self::Owned(sink) => Some(Arc::clone(sink)),
		}
	}
}

enum StreamMessage {
	Fix(Result<Coordinate, LocationError>),
	Closed,
	Stop,
}

/// Feeds `stream` into `sink` until stopped, until the platform closes the stream or
/// until the sink is gone.
async fn forward(stream: &PositionStream, stop: &Stopper, sink: &SinkRef) {
	loop {
		let message = (
			async {
				stream
					.recv()
					.await
					.map_or(StreamMessage::Closed, StreamMessage::Fix)
			},
			async {
				stop.await;
				StreamMessage::Stop
			},
		)
			.race()
			.await;

		let fix = match message {
			StreamMessage::Fix(fix) => fix,
			StreamMessage::Closed => {
				debug!("Position stream closed by the platform");
				return;
			}
			StreamMessage::Stop => return,
		};

		let Some(sink) = sink.get() else {
			debug!("Position consumer is gone");
			return;
		};

		match fix {
			Ok(coordinate) => {
				trace!(?coordinate, "Position fix");
				sink.on_position(coordinate).await;
			}
			Err(e) => sink.on_location_unavailable(e).await,
		}
	}
}
