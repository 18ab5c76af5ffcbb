//! The proximity monitor: destination, radius, latest position and the alert latch.
//!
//! All transitions of one monitor go through a single mutex, so they are sequential no
//! matter which producer delivered the position. Another execution context (the background
//! task) never sees this state; it only meets the monitor through
//! [`PersistedMonitorState`], which is why the latch is double checked against the
//! persisted alert-shown flag right before an alert is dispatched.

use crate::{
	alert::{AlertDispatcher, HapticBackend, NotificationBackend, ResponseListener},
	config::{MonitorConfig, RestartPolicy},
	error::{Error, PermissionKind, Result},
	journal::{EventLog, LogLevel},
	location::{
		BackgroundEvaluator, BackgroundWatch, ForegroundWatch, LocationBackend, LocationError,
		PermissionStatus, PositionSink,
	},
	persist::{KeyValueStore, PersistedMonitorState, StatePatch},
	place::{AlertRadius, Place},
	places::SavedPlaces,
};

use std::sync::{Arc, Weak};

use arrival_actors::ActorsCollection;
use arrival_geo::Coordinate;
use async_trait::async_trait;
use serde_json::json;
use strum::Display;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, instrument, warn};

mod state;

pub use state::{MonitorEvent, MonitorState};

const EVENTS_CAPACITY: usize = 64;

/// Producers and listeners owned by a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum MonitorActor {
	ForegroundWatch,
	BackgroundTask,
	ResponseListener,
}

/// The platform a monitor runs against.
#[derive(Clone)]
pub struct Backends {
	pub store: Arc<dyn KeyValueStore>,
	pub location: Arc<dyn LocationBackend>,
	pub notifications: Arc<dyn NotificationBackend>,
	pub haptics: Arc<dyn HapticBackend>,
}

struct Inner {
	config: MonitorConfig,
	state: Mutex<MonitorState>,
	// Serializes start, stop and shutdown so producers are never started and stopped
	// concurrently
	lifecycle: Mutex<()>,
	persisted: PersistedMonitorState,
	dispatcher: AlertDispatcher,
	location: Arc<dyn LocationBackend>,
	notifications: Arc<dyn NotificationBackend>,
	actors: ActorsCollection<MonitorActor>,
	places: Mutex<SavedPlaces>,
	journal: Arc<EventLog>,
	events: broadcast::Sender<MonitorEvent>,
}

/// Handle to a proximity monitor. Clones share the same monitor.
#[derive(Clone)]
pub struct ProximityMonitor {
	inner: Arc<Inner>,
}

/// Non owning handle, for whoever must not keep the monitor alive.
#[derive(Clone)]
pub struct WeakProximityMonitor {
	inner: Weak<Inner>,
}

impl WeakProximityMonitor {
	#[must_use]
	pub fn upgrade(&self) -> Option<ProximityMonitor> {
		self.inner.upgrade().map(|inner| ProximityMonitor { inner })
	}
}

impl ProximityMonitor {
	/// Builds an idle monitor and starts listening for notification responses.
	///
	/// The destination and radius of the last persisted session are restored so they can be
	/// shown, but monitoring only resumes on an explicit [`start`](Self::start).
	pub async fn new(config: MonitorConfig, backends: Backends) -> Self {
		let Backends {
			store,
			location,
			notifications,
			haptics,
		} = backends;

		let persisted = PersistedMonitorState::new(Arc::clone(&store));
		let snapshot = persisted.load().await;
		if snapshot.monitoring {
			info!("Previous session left monitoring on, waiting for an explicit start");
		}

		let radius = snapshot.radius.unwrap_or(config.default_radius);
		let journal = EventLog::init(Arc::clone(&store), config.log_capacity).await;
		let places = SavedPlaces::load(Arc::clone(&store)).await;

		let inner = Arc::new(Inner {
			state: Mutex::new(MonitorState::idle(snapshot.destination, radius)),
			lifecycle: Mutex::new(()),
			persisted,
			dispatcher: AlertDispatcher::new(Arc::clone(&notifications), Arc::clone(&haptics)),
			location: Arc::clone(&location),
			notifications: Arc::clone(&notifications),
			actors: ActorsCollection::default(),
			places: Mutex::new(places),
			journal,
			events: broadcast::channel(EVENTS_CAPACITY).0,
			config,
		});

		let sink: Weak<Inner> = Arc::downgrade(&inner);
		let sink: Weak<dyn PositionSink> = sink;
		inner
			.actors
			.declare(ForegroundWatch::new(
				Arc::clone(&location),
				inner.config.foreground,
				sink,
			))
			.await;

		let evaluator = Arc::new(BackgroundEvaluator::new(
			store,
			Arc::clone(&notifications),
			haptics,
		));
		inner
			.actors
			.declare(BackgroundWatch::new(
				location,
				inner.config.background_task_name.clone(),
				inner.config.background,
				evaluator,
			))
			.await;

		let monitor = Self { inner };

		monitor
			.inner
			.actors
			.declare(ResponseListener::new(
				notifications.responses(),
				monitor.downgrade(),
			))
			.await;
		monitor
			.inner
			.actors
			.start(MonitorActor::ResponseListener)
			.await;

		monitor
	}

	#[must_use]
	pub fn downgrade(&self) -> WeakProximityMonitor {
		WeakProximityMonitor {
			inner: Arc::downgrade(&self.inner),
		}
	}

	pub async fn state(&self) -> MonitorState {
		self.inner.state.lock().await.clone()
	}

	#[must_use]
	pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
		self.inner.events.subscribe()
	}

	#[must_use]
	pub fn journal(&self) -> &Arc<EventLog> {
		&self.inner.journal
	}

	#[must_use]
	pub fn config(&self) -> &MonitorConfig {
		&self.inner.config
	}

	pub async fn is_running(&self, actor: MonitorActor) -> bool {
		self.inner.actors.is_running(actor).await
	}

	/// Replaces the destination and clears the alert latch, here and in the persisted state.
	/// The distance is recomputed right away from the last known position, without
	/// evaluating an arrival.
	pub async fn set_destination(&self, destination: Place) {
		// A concurrent start must not persist the previous destination after this one
		let _lifecycle = self.inner.lifecycle.lock().await;

		let (monitoring, distance) = {
			let mut state = self.inner.state.lock().await;
			state.destination = Some(destination.clone());
			state.has_alerted = false;
			(state.is_monitoring, state.recompute_distance())
		};

		let mut patch = StatePatch::default().alert_shown(false);
		if monitoring {
			patch = patch.destination(destination.clone());
		}
		if let Err(e) = self.inner.persisted.save(patch).await {
			error!(?e, "Failed to persist destination change");
		}

		self.inner
			.journal
			.log(
				LogLevel::Info,
				format!("Destination set to {}", destination.name),
				Some(json!({"destination": destination})),
			)
			.await;

		self.inner
			.emit(MonitorEvent::DestinationChanged { destination });
		if let Some(distance) = distance {
			self.inner.emit(MonitorEvent::DistanceUpdated { distance });
		}
	}

	/// Picks the saved place at `index` as destination.
	pub async fn select_saved_place(&self, index: usize) -> Result<Place> {
		let place = self
			.inner
			.places
			.lock()
			.await
			.get(index)
			.cloned()
			.ok_or(Error::PlaceNotFound(index))?;

		self.set_destination(place.clone()).await;

		Ok(place)
	}

	/// Changes the alert radius. While monitoring the latch is cleared, so the next position
	/// is evaluated against the new radius; nothing is evaluated before that. Only an
	/// invalid radius is an error, a failed write is logged.
	pub async fn set_radius(&self, meters: f64) -> Result<()> {
		let radius = AlertRadius::new(meters)?;

		let _lifecycle = self.inner.lifecycle.lock().await;

		let monitoring = {
			let mut state = self.inner.state.lock().await;
			state.radius = radius;
			if state.is_monitoring {
				state.has_alerted = false;
			}
			state.is_monitoring
		};

		if monitoring {
			if let Err(e) = self
				.inner
				.persisted
				.save(StatePatch::default().radius(radius).alert_shown(false))
				.await
			{
				error!(?e, "Failed to persist radius change");
			}
		}

		debug!(%radius, monitoring, "Alert radius changed");
		self.inner.emit(MonitorEvent::RadiusChanged { radius });

		Ok(())
	}

	/// Arms the monitor and starts both producers.
	///
	/// Only the foreground location permission is required; without background location
	/// the background task isn't registered and without notifications the alert degrades
	/// to vibration. Calling it while already monitoring follows the configured
	/// [`RestartPolicy`]. A session that couldn't be persisted still runs in the
	/// foreground, the failure goes to the event log.
	#[instrument(skip(self))]
	pub async fn start(&self) -> Result<()> {
		let _lifecycle = self.inner.lifecycle.lock().await;

		let (destination, radius, restarting) = {
			let state = self.inner.state.lock().await;
			let Some(destination) = state.destination.clone() else {
				return Err(Error::NoDestination);
			};

			let restarting = match (state.is_monitoring, self.inner.config.restart_policy) {
				(false, _) => false,
				(true, RestartPolicy::Ignore) => {
					debug!("Already monitoring, ignoring start");
					return Ok(());
				}
				(true, RestartPolicy::Restart) => true,
			};

			(destination, state.radius, restarting)
		};

		let with_background = self.inner.check_permissions().await?;

		if restarting {
			info!("Restarting monitoring session");
			self.inner.stop_producers().await;
			self.inner.dispatcher.cancel().await;
		}

		if let Err(e) = self
			.inner
			.persisted
			.save(
				StatePatch::default()
					.destination(destination.clone())
					.radius(radius)
					.alert_shown(false)
					.monitoring(true),
			)
			.await
		{
			error!(?e, "Failed to persist monitoring session");
			self.inner
				.journal
				.error("Failed to save the monitoring session, background alerts may not fire")
				.await;
		}

		{
			let mut state = self.inner.state.lock().await;
			state.is_monitoring = true;
			state.has_alerted = false;
		}

		self.inner
			.actors
			.start(MonitorActor::ForegroundWatch)
			.await;
		if with_background {
			self.inner.actors.start(MonitorActor::BackgroundTask).await;
		}

		self.inner
			.journal
			.log(
				LogLevel::Success,
				format!("Monitoring started for {} within {radius}", destination.name),
				Some(json!({"background": with_background})),
			)
			.await;
		self.inner.emit(MonitorEvent::Started {
			destination,
			radius,
		});

		Ok(())
	}

	/// Disarms the monitor, ends both producers and cancels any active alert.
	#[instrument(skip(self))]
	pub async fn stop(&self) {
		let _lifecycle = self.inner.lifecycle.lock().await;

		let was_monitoring = {
			let mut state = self.inner.state.lock().await;
			let was_monitoring = state.is_monitoring;
			state.is_monitoring = false;
			state.has_alerted = false;
			was_monitoring
		};

		if let Err(e) = self
			.inner
			.persisted
			.save(StatePatch::default().monitoring(false).alert_shown(false))
			.await
		{
			error!(?e, "Failed to persist monitoring stop");
		}

		// Producers first: a position already being evaluated must not alert after the
		// cancellation below
		self.inner.stop_producers().await;

		// A background evaluation that was in flight may have claimed the alert meanwhile
		if let Err(e) = self.inner.persisted.clear_alert_shown().await {
			error!(?e, "Failed to clear persisted alert-shown flag");
		}
		self.inner.dispatcher.cancel().await;

		if was_monitoring {
			self.inner.journal.info("Monitoring stopped").await;
			self.inner.emit(MonitorEvent::Stopped);
		}
	}

	/// Dismisses the alert but keeps monitoring, so leaving and entering the radius again
	/// alerts again.
	pub async fn reset(&self) {
		self.inner.state.lock().await.has_alerted = false;

		if let Err(e) = self.inner.persisted.clear_alert_shown().await {
			error!(?e, "Failed to clear persisted alert-shown flag");
		}
		self.inner.dispatcher.cancel().await;

		self.inner.journal.info("Arrival alert dismissed").await;
		self.inner.emit(MonitorEvent::Reset);
	}

	pub async fn on_position(&self, coordinate: Coordinate) {
		self.inner.evaluate_position(coordinate).await;
	}

	pub async fn on_location_unavailable(&self, error: LocationError) {
		self.inner.skip_unavailable(error).await;
	}

	/// One-shot position query fed into [`on_position`](Self::on_position). Returns the
	/// fix, or `None` when none could be acquired.
	pub async fn refresh_position(&self) -> Option<Coordinate> {
		match self.inner.location.current_position().await {
			Ok(coordinate) => {
				self.inner.evaluate_position(coordinate).await;
				Some(coordinate)
			}
			Err(e) => {
				self.inner.skip_unavailable(e).await;
				None
			}
		}
	}

	pub async fn saved_places(&self) -> Vec<Place> {
		self.inner.places.lock().await.list().to_vec()
	}

	pub async fn add_place(
		&self,
		name: impl AsRef<str> + Send,
		at: Coordinate,
		marker: Option<&str>,
	) -> Result<Place> {
		let place = self
			.inner
			.places
			.lock()
			.await
			.add(name, at, marker)
			.await?
			.clone();

		self.inner
			.journal
			.success(format!("Saved place {}", place.name))
			.await;

		Ok(place)
	}

	pub async fn remove_place(&self, index: usize) -> Result<Place> {
		let place = self.inner.places.lock().await.remove(index).await?;

		self.inner
			.journal
			.info(format!("Removed saved place {}", place.name))
			.await;

		Ok(place)
	}

	/// Distance from the last known position to every saved place, `None` without a fix.
	pub async fn saved_place_distances(&self) -> Option<Vec<f64>> {
		let position = self.inner.state.lock().await.last_known_position?;

		Some(self.inner.places.lock().await.distances_from(&position))
	}

	/// Stops every producer and the response listener and flushes the event log. Monitoring
	/// state, persisted or not, is left as is.
	pub async fn shutdown(&self) {
		let _lifecycle = self.inner.lifecycle.lock().await;

		self.inner.actors.stop_all().await;
		self.inner.journal.flush().await;

		debug!("Monitor shut down");
	}
}

impl Inner {
	fn emit(&self, event: MonitorEvent) {
		if self.events.receiver_count() > 0 {
			self.events.send(event).ok();
		}
	}

	async fn permission(&self, kind: PermissionKind) -> PermissionStatus {
		match self.location.permission(kind).await {
			PermissionStatus::Undetermined => self.location.request_permission(kind).await,
			status => status,
		}
	}

	/// Returns whether the background task may be registered.
	async fn check_permissions(&self) -> Result<bool> {
		if !self
			.permission(PermissionKind::ForegroundLocation)
			.await
			.is_granted()
		{
			let e = Error::PermissionDenied(PermissionKind::ForegroundLocation);
			self.journal.error(e.to_string()).await;
			return Err(e);
		}

		let with_background = self
			.permission(PermissionKind::BackgroundLocation)
			.await
			.is_granted();
		if !with_background {
			self.journal
				.warning("Background location not granted, alerts only while the app is open")
				.await;
		}

		if !self.notifications.request_permission().await.is_granted() {
			self.journal
				.warning("Notifications not granted, arrivals will only vibrate")
				.await;
		}

		Ok(with_background)
	}

	async fn stop_producers(&self) {
		self.actors.stop(MonitorActor::ForegroundWatch).await;
		self.actors.stop(MonitorActor::BackgroundTask).await;
	}

	async fn evaluate_position(&self, coordinate: Coordinate) {
		let mut state = self.state.lock().await;
		state.last_known_position = Some(coordinate);

		let (Some(destination), Some(distance)) =
			(state.destination.clone(), state.recompute_distance())
		else {
			return;
		};

		self.emit(MonitorEvent::DistanceUpdated { distance });

		if !state.is_monitoring || state.has_alerted || !state.radius.contains(distance) {
			return;
		}

		state.has_alerted = true;
		let radius = state.radius;

		// Read the latest flag, the background task may have alerted for this arrival already
		let dispatched = if self.persisted.alert_shown().await {
			info!("Arrival already alerted by another execution context");
			false
		} else {
			if let Err(e) = self.persisted.mark_alert_shown().await {
				warn!(?e, "Failed to persist alert-shown flag, a duplicate alert may follow");
			}
			self.dispatcher.trigger(&destination, distance).await;
			true
		};

		drop(state);

		self.journal
			.log(
				LogLevel::Success,
				format!("Arrived within {radius} of {}", destination.name),
				Some(json!({
					"distance": distance,
					"latitude": coordinate.latitude,
					"longitude": coordinate.longitude,
					"dispatched": dispatched,
				})),
			)
			.await;
		self.emit(MonitorEvent::Entered {
			distance,
			dispatched,
		});
	}

	async fn skip_unavailable(&self, error: LocationError) {
		let e = Error::LocationUnavailable(error);
		self.journal
			.warning(format!("{e}, keeping the last known position"))
			.await;
		self.emit(MonitorEvent::LocationUnavailable {
			reason: e.to_string(),
		});
	}
}

#[async_trait]
impl PositionSink for Inner {
	async fn on_position(&self, coordinate: Coordinate) {
		self.evaluate_position(coordinate).await;
	}

	async fn on_location_unavailable(&self, error: LocationError) {
		self.skip_unavailable(error).await;
	}
}
