use crate::{
	error::{Error, Result},
	place::{AlertRadius, Place},
};

use super::{
	KeyValueStore, StoreError, ALERT_RADIUS_KEY, ALERT_SHOWN_KEY, DESTINATION_KEY,
	MONITORING_KEY,
};

use std::sync::Arc;

use tracing::{debug, error, warn};

const TRUE: &str = "true";
const FALSE: &str = "false";

/// Partial write of the persisted monitor fields; `None` leaves the entry untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
	pub destination: Option<Place>,
	pub radius: Option<AlertRadius>,
	pub alert_shown: Option<bool>,
	pub monitoring: Option<bool>,
}

impl StatePatch {
	#[must_use]
	pub fn destination(mut self, place: Place) -> Self {
		self.destination = Some(place);
		self
	}

	#[must_use]
	pub fn radius(mut self, radius: AlertRadius) -> Self {
		self.radius = Some(radius);
		self
	}

	#[must_use]
	pub fn alert_shown(mut self, shown: bool) -> Self {
		self.alert_shown = Some(shown);
		self
	}

	#[must_use]
	pub fn monitoring(mut self, monitoring: bool) -> Self {
		self.monitoring = Some(monitoring);
		self
	}
}

/// What one execution context last left in the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedSnapshot {
	pub destination: Option<Place>,
	pub radius: Option<AlertRadius>,
	pub alert_shown: bool,
	pub monitoring: bool,
}

impl PersistedSnapshot {
	/// Destination and radius to evaluate against, only if monitoring was left on and the
	/// set of entries is complete. A torn or partial write reads as "not monitoring".
	#[must_use]
	pub fn active_target(&self) -> Option<(&Place, AlertRadius)> {
		if !self.monitoring {
			return None;
		}

		match (&self.destination, self.radius) {
			(Some(destination), Some(radius)) => Some((destination, radius)),
			_ => None,
		}
	}
}

/// Durable projection of the monitor state over a [`KeyValueStore`].
///
/// Reads never fail: missing, unreadable or corrupt entries are logged and read as absent.
#[derive(Clone)]
pub struct PersistedMonitorState {
	store: Arc<dyn KeyValueStore>,
}

impl PersistedMonitorState {
	pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
		Self { store }
	}

	#[must_use]
	pub fn store(&self) -> &Arc<dyn KeyValueStore> {
		&self.store
	}

	pub async fn save(&self, patch: StatePatch) -> Result<()> {
		let StatePatch {
			destination,
			radius,
			alert_shown,
			monitoring,
		} = patch;

		// Turning monitoring off goes first and turning it on goes last, so a reader
		// racing with this write never sees "monitoring" next to half updated fields
		if monitoring == Some(false) {
			self.store.set(MONITORING_KEY, FALSE.to_string()).await?;
		}

		if let Some(destination) = destination {
			let json = serde_json::to_string(&destination).map_err(StoreError::from)?;
			self.store.set(DESTINATION_KEY, json).await?;
		}

		if let Some(radius) = radius {
			self.store
				.set(ALERT_RADIUS_KEY, radius.meters().to_string())
				.await?;
		}

		match alert_shown {
			Some(true) => self.store.set(ALERT_SHOWN_KEY, TRUE.to_string()).await?,
			Some(false) => self.store.remove(ALERT_SHOWN_KEY).await?,
			None => {}
		}

		if monitoring == Some(true) {
			self.store.set(MONITORING_KEY, TRUE.to_string()).await?;
		}

		Ok(())
	}

	pub async fn load(&self) -> PersistedSnapshot {
		PersistedSnapshot {
			destination: self.load_destination().await,
			radius: self.load_radius().await,
			alert_shown: self.alert_shown().await,
			monitoring: self.read(MONITORING_KEY).await.as_deref() == Some(TRUE),
		}
	}

	pub async fn alert_shown(&self) -> bool {
		self.read(ALERT_SHOWN_KEY).await.as_deref() == Some(TRUE)
	}

	pub async fn mark_alert_shown(&self) -> Result<()> {
		self.save(StatePatch::default().alert_shown(true)).await
	}

	pub async fn clear_alert_shown(&self) -> Result<()> {
		self.save(StatePatch::default().alert_shown(false)).await
	}

	async fn read(&self, key: &'static str) -> Option<String> {
		self.store
			.get(key)
			.await
			.map_err(|e| error!(%key, ?e, "Failed to read persisted entry, treating as absent"))
			.ok()
			.flatten()
	}

	async fn load_destination(&self) -> Option<Place> {
		let raw = self.read(DESTINATION_KEY).await?;

		match serde_json::from_str::<Place>(&raw) {
			Ok(place) if place.is_valid() => Some(place),
			Ok(place) => {
				report_corrupt(
					DESTINATION_KEY,
					format!("coordinates out of range: {place:?}"),
				);
				None
			}
			Err(e) => {
				report_corrupt(DESTINATION_KEY, e.to_string());
				None
			}
		}
	}

	async fn load_radius(&self) -> Option<AlertRadius> {
		let raw = self.read(ALERT_RADIUS_KEY).await?;

		match raw.trim().parse::<f64>() {
			Ok(meters) => AlertRadius::new(meters)
				.map_err(|e| report_corrupt(ALERT_RADIUS_KEY, e.to_string()))
				.ok(),
			Err(e) => {
				report_corrupt(ALERT_RADIUS_KEY, format!("{raw:?}: {e}"));
				None
			}
		}
	}
}

fn report_corrupt(key: &'static str, reason: String) {
	let e = Error::PersistenceCorrupt { key, reason };
	warn!(%e, "Ignoring corrupt persisted entry");
	debug!(%key, "Entry will be overwritten on the next save");
}

#[cfg(test)]
mod tests {
	use crate::persist::MemoryStore;

	use arrival_geo::Coordinate;
	use tracing_test::traced_test;

	use super::*;

	fn persisted() -> (PersistedMonitorState, MemoryStore) {
		let store = MemoryStore::new();
		(PersistedMonitorState::new(Arc::new(store.clone())), store)
	}

	fn destination() -> Place {
		Place::named("Station", Coordinate::new(0.0, 0.0), Some("🚉")).expect("valid name")
	}

	#[tokio::test]
	#[traced_test]
	async fn destination_and_radius_round_trip() {
		let (persisted, _) = persisted();
		let radius = AlertRadius::new(500.0).expect("valid radius");

		persisted
			.save(StatePatch::default().destination(destination()).radius(radius))
			.await
			.expect("writable");

		let snapshot = persisted.load().await;
		assert_eq!(snapshot.destination, Some(destination()));
		assert_eq!(snapshot.radius, Some(radius));
		assert!(!snapshot.monitoring);
		assert!(!snapshot.alert_shown);
	}

	#[tokio::test]
	#[traced_test]
	async fn empty_store_is_not_active() {
		let (persisted, _) = persisted();
		let snapshot = persisted.load().await;

		assert_eq!(snapshot, PersistedSnapshot::default());
		assert!(snapshot.active_target().is_none());
	}

	#[tokio::test]
	#[traced_test]
	async fn torn_write_is_not_active() {
		let (persisted, store) = persisted();
		store
			.set(MONITORING_KEY, TRUE.to_string())
			.await
			.expect("infallible");
		store
			.set(
				DESTINATION_KEY,
				serde_json::to_string(&destination()).expect("serializable"),
			)
			.await
			.expect("infallible");

		// Radius never made it to the store
		let snapshot = persisted.load().await;
		assert!(snapshot.monitoring);
		assert!(snapshot.active_target().is_none());
	}

	#[tokio::test]
	#[traced_test]
	async fn corrupt_entries_read_as_absent() {
		let (persisted, store) = persisted();
		store
			.set(DESTINATION_KEY, "{\"name\": 42".to_string())
			.await
			.expect("infallible");
		store
			.set(ALERT_RADIUS_KEY, "-20".to_string())
			.await
			.expect("infallible");
		store
			.set(MONITORING_KEY, TRUE.to_string())
			.await
			.expect("infallible");

		let snapshot = persisted.load().await;
		assert_eq!(snapshot.destination, None);
		assert_eq!(snapshot.radius, None);
		assert!(snapshot.active_target().is_none());
		assert!(logs_contain("Ignoring corrupt persisted entry"));
	}

	#[tokio::test]
	#[traced_test]
	async fn alert_shown_flag_is_removed_not_falsified() {
		let (persisted, store) = persisted();

		persisted.mark_alert_shown().await.expect("writable");
		assert!(persisted.alert_shown().await);
		assert_eq!(
			store.get(ALERT_SHOWN_KEY).await.expect("infallible"),
			Some(TRUE.to_string())
		);

		persisted.clear_alert_shown().await.expect("writable");
		assert!(!persisted.alert_shown().await);
		assert_eq!(store.get(ALERT_SHOWN_KEY).await.expect("infallible"), None);
	}

	#[tokio::test]
	#[traced_test]
	async fn full_start_patch_is_active() {
		let (persisted, store) = persisted();
		let radius = AlertRadius::default();

		persisted
			.save(
				StatePatch::default()
					.destination(destination())
					.radius(radius)
					.alert_shown(false)
					.monitoring(true),
			)
			.await
			.expect("writable");

		let snapshot = persisted.load().await;
		let (target, target_radius) = snapshot.active_target().expect("active");
		assert_eq!(target, &destination());
		assert_eq!(target_radius, radius);
		assert_eq!(
			store.get(ALERT_RADIUS_KEY).await.expect("infallible"),
			Some("300".to_string())
		);
	}
}
