use arrival_core::{
	persist::{PersistedMonitorState, DESTINATION_KEY},
	sim::FlakyStore,
	AlertRadius, Coordinate, FileStore, KeyValueStore, MemoryStore, MonitorActor, MonitorConfig,
	Place, RestartPolicy, StatePatch,
};

use std::{sync::Arc, time::Duration};

use futures_concurrency::future::Join;
use tempfile::tempdir;
use tokio::time::sleep;
use tracing_test::traced_test;

mod common;

use common::{eventually, station, Harness, FAR, NEAR};

async fn flaky(config: MonitorConfig) -> (Harness, Arc<FlakyStore>) {
	let store = Arc::new(FlakyStore::default());
	let h = Harness::with_store(config, store.clone()).await;
	h.monitor.set_destination(station()).await;
	(h, store)
}

#[tokio::test]
#[traced_test]
async fn destination_and_radius_round_trip_through_a_file() {
	let dir = tempdir().expect("temp dir");
	let path = dir.path().join("state.json");
	let radius = AlertRadius::new(500.0).expect("valid radius");

	PersistedMonitorState::new(Arc::new(FileStore::new(&path)))
		.save(StatePatch::default().destination(station()).radius(radius))
		.await
		.expect("writable");

	let snapshot = PersistedMonitorState::new(Arc::new(FileStore::new(&path)))
		.load()
		.await;
	assert_eq!(snapshot.destination, Some(station()));
	assert_eq!(snapshot.radius, Some(radius));
	assert!(snapshot.active_target().is_none());
}

#[tokio::test]
#[traced_test]
async fn new_monitor_restores_the_last_session_without_resuming() {
	let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

	{
		let previous = Harness::with_store(MonitorConfig::default(), Arc::clone(&store)).await;
		previous.monitor.set_destination(station()).await;
		previous.monitor.set_radius(1000.0).await.expect("valid radius");
		previous.monitor.start().await.expect("monitoring starts");
		previous.monitor.on_position(NEAR).await;
		previous.monitor.shutdown().await;
	}

	let h = Harness::with_store(MonitorConfig::default(), store).await;
	let state = h.monitor.state().await;
	assert_eq!(state.destination, Some(station()));
	assert_eq!(state.radius.meters(), 1000.0);
	assert!(!state.is_monitoring);
	assert!(!state.has_alerted);
	assert!(logs_contain("Previous session left monitoring on"));

	// The event log came back too
	assert!(h
		.monitor
		.journal()
		.entries()
		.await
		.iter()
		.any(|entry| entry.message == "Arrived within 1.00 km of Central Station"));
}

#[tokio::test]
#[traced_test]
async fn corrupt_destination_reads_as_no_destination() {
	let store = MemoryStore::new();
	store
		.set(DESTINATION_KEY, "{\"name\": \"Nowhere\"".to_string())
		.await
		.expect("infallible");

	let h = Harness::with_store(MonitorConfig::default(), Arc::new(store)).await;

	assert_eq!(h.monitor.state().await.destination, None);
	assert!(logs_contain("Ignoring corrupt persisted entry"));
}

#[tokio::test]
#[traced_test]
async fn configured_default_radius_applies_to_fresh_installs() {
	let mut config = MonitorConfig::default();
	config.default_radius = AlertRadius::new(200.0).expect("valid radius");
	let h = Harness::with_config(config).await;

	assert_eq!(h.monitor.state().await.radius.meters(), 200.0);
}

#[tokio::test]
#[traced_test]
async fn destination_changed_while_starting_is_persisted() {
	let (h, store) = flaky(MonitorConfig::default()).await;
	store.delay_writes(Duration::from_millis(50));

	let platform =
		Place::named("Platform 9", Coordinate::new(0.002, 0.0), None).expect("valid name");
	let monitor = &h.monitor;
	let (started, ()) = (monitor.start(), async {
		sleep(Duration::from_millis(10)).await;
		monitor.set_destination(platform.clone()).await;
	})
		.join()
		.await;
	started.expect("monitoring starts");

	assert_eq!(h.monitor.state().await.destination, Some(platform.clone()));

	// The background task must evaluate against the same destination
	let snapshot = PersistedMonitorState::new(store).load().await;
	assert!(snapshot.monitoring);
	assert_eq!(snapshot.destination, Some(platform));
}

#[tokio::test]
#[traced_test]
async fn restart_goes_through_when_the_store_fails() {
	let mut config = MonitorConfig::default();
	config.restart_policy = RestartPolicy::Restart;
	let (h, store) = flaky(config).await;
	h.monitor.start().await.expect("monitoring starts");
	h.wait_producers().await;
	h.monitor.on_position(NEAR).await;
	assert!(h.monitor.state().await.has_alerted);

	store.fail_writes(true);
	h.monitor.start().await.expect("restart isn't blocked by the store");
	h.wait_producers().await;

	let state = h.monitor.state().await;
	assert!(state.is_monitoring);
	assert!(!state.has_alerted);
	assert!(h.monitor.is_running(MonitorActor::ForegroundWatch).await);
	assert!(h.monitor.is_running(MonitorActor::BackgroundTask).await);
	assert!(logs_contain("Failed to persist monitoring session"));

	// Positions keep flowing into the monitor
	h.location.push(FAR).await;
	let monitor = &h.monitor;
	eventually(|| async move { monitor.state().await.last_known_position == Some(FAR) }).await;
}

#[tokio::test]
#[traced_test]
async fn radius_change_applies_when_the_store_fails() {
	let (h, store) = flaky(MonitorConfig::default()).await;
	h.monitor.start().await.expect("monitoring starts");

	store.fail_writes(true);
	h.monitor
		.set_radius(500.0)
		.await
		.expect("only invalid radii are rejected");

	assert_eq!(h.monitor.state().await.radius.meters(), 500.0);
	assert!(logs_contain("Failed to persist radius change"));
}

#[tokio::test]
#[traced_test]
async fn stop_and_reset_hold_up_when_the_store_fails() {
	let (h, store) = flaky(MonitorConfig::default()).await;
	h.monitor.start().await.expect("monitoring starts");
	h.wait_producers().await;
	h.monitor.on_position(NEAR).await;

	store.fail_writes(true);

	h.monitor.reset().await;
	let state = h.monitor.state().await;
	assert!(state.is_monitoring);
	assert!(!state.has_alerted);
	assert!(h.notifications.displayed().await.is_empty());

	h.monitor.stop().await;
	assert!(!h.monitor.state().await.is_monitoring);
	assert!(!h.monitor.is_running(MonitorActor::ForegroundWatch).await);
	assert_eq!(h.location.active_watches().await, 0);
	assert!(logs_contain("Failed to persist monitoring stop"));
}
