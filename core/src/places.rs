use crate::{
	error::{Error, Result},
	persist::{KeyValueStore, StoreError, SAVED_PLACES_KEY},
	place::Place,
};

use std::sync::Arc;

use arrival_geo::{distance_meters, Coordinate};
use tracing::{debug, error, warn};

/// Bookmarked places the user can pick a destination from.
pub struct SavedPlaces {
	places: Vec<Place>,
	store: Arc<dyn KeyValueStore>,
}

impl SavedPlaces {
	/// Loads the bookmarks; an unreadable entry yields an empty list.
	pub async fn load(store: Arc<dyn KeyValueStore>) -> Self {
		let places = match store.get(SAVED_PLACES_KEY).await {
			Ok(Some(json)) => serde_json::from_str::<Vec<Place>>(&json)
				.map_err(|e| {
					let e = Error::PersistenceCorrupt {
						key: SAVED_PLACES_KEY,
						reason: e.to_string(),
					};
					warn!(%e, "Ignoring saved places");
				})
				.unwrap_or_default(),
			Ok(None) => Vec::new(),
			Err(e) => {
				error!(?e, "Failed to load saved places");
				Vec::new()
			}
		};

		debug!(count = places.len(), "Saved places loaded");

		Self { places, store }
	}

	#[must_use]
	pub fn list(&self) -> &[Place] {
		&self.places
	}

	#[must_use]
	pub fn get(&self, index: usize) -> Option<&Place> {
		self.places.get(index)
	}

	pub async fn add(
		&mut self,
		name: impl AsRef<str>,
		at: Coordinate,
		marker: Option<&str>,
	) -> Result<&Place> {
		let mut places = self.places.clone();
		places.push(Place::named(name, at, marker)?);
		self.persist(&places).await?;

		self.places = places;
		let index = self.places.len() - 1;
		Ok(&self.places[index])
	}

	pub async fn remove(&mut self, index: usize) -> Result<Place> {
		if index >= self.places.len() {
			return Err(Error::PlaceNotFound(index));
		}

		let mut places = self.places.clone();
		let removed = places.remove(index);
		self.persist(&places).await?;

		self.places = places;
		Ok(removed)
	}

	/// Distance from `from` to every saved place, in list order.
	#[must_use]
	pub fn distances_from(&self, from: &Coordinate) -> Vec<f64> {
		self.places
			.iter()
			.map(|place| distance_meters(from, &place.coordinate()))
			.collect()
	}

	/// Writes `places` to the store; the in-memory list is only replaced once this succeeded.
	async fn persist(&self, places: &[Place]) -> Result<()> {
		let json = serde_json::to_string(places).map_err(StoreError::from)?;
		self.store.set(SAVED_PLACES_KEY, json).await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use crate::{persist::MemoryStore, sim::FlakyStore};

	use tracing_test::traced_test;

	use super::*;

	#[tokio::test]
	#[traced_test]
	async fn places_are_persisted_in_order() {
		let store = MemoryStore::new();
		let mut places = SavedPlaces::load(Arc::new(store.clone())).await;

		places
			.add("Home", Coordinate::new(0.0, 0.0), None)
			.await
			.expect("valid place");
		places
			.add("Work", Coordinate::new(0.01, 0.01), Some("🏢"))
			.await
			.expect("valid place");

		let reloaded = SavedPlaces::load(Arc::new(store)).await;
		let names = reloaded
			.list()
			.iter()
			.map(|place| place.name.as_str())
			.collect::<Vec<_>>();
		assert_eq!(names, ["Home", "Work"]);
		assert_eq!(reloaded.get(1).map(|place| place.marker.as_str()), Some("🏢"));
	}

	#[tokio::test]
	#[traced_test]
	async fn empty_names_and_bad_indexes_are_rejected() {
		let mut places = SavedPlaces::load(Arc::new(MemoryStore::new())).await;

		assert!(matches!(
			places.add(" ", Coordinate::new(0.0, 0.0), None).await,
			Err(Error::EmptyPlaceName)
		));
		assert!(matches!(
			places.remove(0).await,
			Err(Error::PlaceNotFound(0))
		));
	}

	#[tokio::test]
	#[traced_test]
	async fn removing_shifts_following_places() {
		let mut places = SavedPlaces::load(Arc::new(MemoryStore::new())).await;
		for name in ["A", "B", "C"] {
			places
				.add(name, Coordinate::new(0.0, 0.0), None)
				.await
				.expect("valid place");
		}

		let removed = places.remove(1).await.expect("existing place");
		assert_eq!(removed.name, "B");
		assert_eq!(places.get(1).map(|place| place.name.as_str()), Some("C"));
	}

	#[tokio::test]
	#[traced_test]
	async fn distances_follow_list_order() {
		let mut places = SavedPlaces::load(Arc::new(MemoryStore::new())).await;
		places
			.add("Near", Coordinate::new(0.001, 0.001), None)
			.await
			.expect("valid place");
		places
			.add("Far", Coordinate::new(0.01, 0.01), None)
			.await
			.expect("valid place");

		let distances = places.distances_from(&Coordinate::new(0.0, 0.0));
		assert_eq!(distances.len(), 2);
		assert!((distances[0] - 157.25).abs() < 1.0);
		assert!((distances[1] - 1572.5).abs() < 1.0);
	}

	#[tokio::test]
	#[traced_test]
	async fn failed_writes_leave_the_list_untouched() {
		let store = Arc::new(FlakyStore::default());
		let mut places = SavedPlaces::load(store.clone()).await;
		places
			.add("Home", Coordinate::new(0.0, 0.0), None)
			.await
			.expect("valid place");

		store.fail_writes(true);

		assert!(matches!(
			places.add("Work", Coordinate::new(0.01, 0.01), None).await,
			Err(Error::Store(_))
		));
		assert!(matches!(places.remove(0).await, Err(Error::Store(_))));

		let names = places
			.list()
			.iter()
			.map(|place| place.name.as_str())
			.collect::<Vec<_>>();
		assert_eq!(names, ["Home"]);
	}

	#[tokio::test]
	#[traced_test]
	async fn corrupt_entry_yields_empty_list() {
		let store = MemoryStore::new();
		store
			.set(SAVED_PLACES_KEY, "{}".to_string())
			.await
			.expect("infallible");

		let places = SavedPlaces::load(Arc::new(store)).await;
		assert!(places.list().is_empty());
		assert!(logs_contain("Ignoring saved places"));
	}
}
