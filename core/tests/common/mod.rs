#![allow(dead_code)]

use arrival_core::{
	sim::{RecordingHaptics, RecordingNotifications, SimulatedLocation},
	Backends, Coordinate, KeyValueStore, MemoryStore, MonitorConfig, Place, ProximityMonitor,
};

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::{sleep, timeout};

/// About 1572 m from [`station`].
pub const FAR: Coordinate = Coordinate::new(0.01, 0.01);

/// About 157 m from [`station`].
pub const NEAR: Coordinate = Coordinate::new(0.001, 0.001);

pub fn station() -> Place {
	Place::named("Central Station", Coordinate::new(0.0, 0.0), Some("🚉")).expect("valid name")
}

pub struct Harness {
	pub monitor: ProximityMonitor,
	pub store: Arc<dyn KeyValueStore>,
	pub location: Arc<SimulatedLocation>,
	pub notifications: Arc<RecordingNotifications>,
	pub haptics: Arc<RecordingHaptics>,
}

impl Harness {
	pub async fn new() -> Self {
		Self::with_config(MonitorConfig::default()).await
	}

	pub async fn with_config(config: MonitorConfig) -> Self {
		Self::with_store(config, Arc::new(MemoryStore::new())).await
	}

	pub async fn with_store(config: MonitorConfig, store: Arc<dyn KeyValueStore>) -> Self {
		let location = Arc::new(SimulatedLocation::default());
		let notifications = Arc::new(RecordingNotifications::default());
		let haptics = Arc::new(RecordingHaptics::default());

		let monitor = ProximityMonitor::new(
			config,
			Backends {
				store: Arc::clone(&store),
				location: location.clone(),
				notifications: notifications.clone(),
				haptics: haptics.clone(),
			},
		)
		.await;

		Self {
			monitor,
			store,
			location,
			notifications,
			haptics,
		}
	}

	/// Monitoring [`station`] within 300 m.
	pub async fn armed() -> Self {
		let harness = Self::new().await;
		harness.monitor.set_destination(station()).await;
		harness.monitor.set_radius(300.0).await.expect("valid radius");
		harness.monitor.start().await.expect("monitoring starts");
		harness
	}

	/// How many alerts were dispatched, fallback ones included.
	pub async fn alerts(&self) -> usize {
		self.haptics.vibrations().await
	}

	/// Waits until both producers are subscribed to the simulated platform.
	pub async fn wait_producers(&self) {
		eventually(|| async move {
			self.location.active_watches().await == 1
				&& self.location.background_tasks().await.len() == 1
		})
		.await;
	}
}

/// Polls `check` until it holds, failing the test after a few seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
	F: FnMut() -> Fut,
	Fut: Future<Output = bool>,
{
	timeout(Duration::from_secs(5), async {
		while !check().await {
			sleep(Duration::from_millis(10)).await;
		}
	})
	.await
	.expect("condition wasn't met in time");
}
