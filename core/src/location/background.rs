use crate::{
	alert::{AlertDispatcher, HapticBackend, NotificationBackend},
	monitor::MonitorActor,
	persist::{KeyValueStore, PersistedMonitorState},
};

use super::{forward, LocationBackend, LocationError, PositionSink, SinkRef, WatchOptions};

use std::sync::Arc;

use arrival_actors::{Actor, Stopper};
use arrival_geo::{distance_meters, Coordinate};
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

/// Arrival check for the background context.
///
/// Holds no monitor state of its own: every fix re-reads the persisted state and the alert
/// latch is the persisted alert-shown flag, so it behaves the same whether or not a
/// foreground monitor is alive in the same process.
pub struct BackgroundEvaluator {
	persisted: PersistedMonitorState,
	dispatcher: AlertDispatcher,
}

impl BackgroundEvaluator {
	pub fn new(
		store: Arc<dyn KeyValueStore>,
		notifications: Arc<dyn NotificationBackend>,
		haptics: Arc<dyn HapticBackend>,
	) -> Self {
		Self {
			persisted: PersistedMonitorState::new(store),
			dispatcher: AlertDispatcher::new(notifications, haptics),
		}
	}

	/// Returns whether this fix dispatched an alert.
	pub async fn evaluate(&self, coordinate: Coordinate) -> bool {
		let snapshot = self.persisted.load().await;

		let Some((destination, radius)) = snapshot.active_target() else {
			debug!("Background fix ignored, monitoring is not active");
			return false;
		};

		let distance = distance_meters(&coordinate, &destination.coordinate());
		debug!(distance, radius = radius.meters(), "Background distance to destination");

		if !radius.contains(distance) || snapshot.alert_shown {
			return false;
		}

		// Read the latest flag right before claiming the alert, the foreground may have
		// claimed it since the snapshot was taken
		if self.persisted.alert_shown().await {
			return false;
		}

		if let Err(e) = self.persisted.mark_alert_shown().await {
			warn!(?e, "Failed to persist alert-shown flag, a duplicate alert may follow");
		}

		info!(destination = %destination.name, distance, "Arrived, alerting from background");
		self.dispatcher.trigger(destination, distance).await;

		true
	}
}

#[async_trait]
impl PositionSink for BackgroundEvaluator {
	async fn on_position(&self, coordinate: Coordinate) {
		self.evaluate(coordinate).await;
	}

	async fn on_location_unavailable(&self, error: LocationError) {
		warn!(?error, "Background position unavailable, waiting for the next update");
	}
}

/// Registration of the named background location task.
pub struct BackgroundWatch {
	backend: Arc<dyn LocationBackend>,
	task_name: String,
	options: WatchOptions,
	sink: SinkRef,
}

impl BackgroundWatch {
	pub fn new(
		backend: Arc<dyn LocationBackend>,
		task_name: impl Into<String>,
		options: WatchOptions,
		evaluator: Arc<BackgroundEvaluator>,
	) -> Self {
		Self {
			backend,
			task_name: task_name.into(),
			options,
			sink: SinkRef::Owned(evaluator),
		}
	}
}

impl Actor<MonitorActor> for BackgroundWatch {
	const IDENTIFIER: MonitorActor = MonitorActor::BackgroundTask;

	async fn run(&mut self, stop: Stopper) {
		// A registration left behind by a previous process would double the deliveries
		if self.backend.has_background_task(&self.task_name).await {
			warn!(task = %self.task_name, "Replacing stale background task registration");
			self.backend.unregister_background_task(&self.task_name).await;
		}

		let stream = match self
			.backend
			.register_background_task(&self.task_name, self.options)
			.await
		{
			Ok(stream) => stream,
			Err(e) => {
				error!(?e, task = %self.task_name, "Failed to register background task");
				return;
			}
		};

		debug!(task = %self.task_name, options = ?self.options, "Background task registered");

		forward(&stream, &stop, &self.sink).await;

		stream.close();
		self.backend.unregister_background_task(&self.task_name).await;
		debug!(task = %self.task_name, "Background task unregistered");
	}
}
