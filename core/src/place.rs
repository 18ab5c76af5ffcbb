use crate::error::{Error, Result};

use std::fmt;

use arrival_geo::Coordinate;
use serde::{Deserialize, Serialize};

const PINNED_NAME: &str = "Selected destination";
const PINNED_MARKER: &str = "🎯";
const SAVED_MARKER: &str = "📍";

/// A named point on the map. Destinations and bookmarks are both places.
///
/// Serialized with the short field names used by the persisted `@destination` and
/// `@saved_places` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
	pub name: String,
	#[serde(rename = "lat")]
	pub latitude: f64,
	#[serde(rename = "lng")]
	pub longitude: f64,
	#[serde(rename = "emoji", default = "default_marker")]
	pub marker: String,
}

fn default_marker() -> String {
	SAVED_MARKER.to_string()
}

impl Place {
	/// A user named place. Surrounding whitespace is trimmed and an empty name is rejected.
	pub fn named(name: impl AsRef<str>, at: Coordinate, marker: Option<&str>) -> Result<Self> {
		let name = name.as_ref().trim();
		if name.is_empty() {
			return Err(Error::EmptyPlaceName);
		}

		Ok(Self {
			name: name.to_string(),
			latitude: at.latitude,
			longitude: at.longitude,
			marker: marker.map_or_else(default_marker, ToString::to_string),
		})
	}

	/// An anonymous destination dropped on the map.
	#[must_use]
	pub fn pinned(at: Coordinate) -> Self {
		Self {
			name: PINNED_NAME.to_string(),
			latitude: at.latitude,
			longitude: at.longitude,
			marker: PINNED_MARKER.to_string(),
		}
	}

	#[must_use]
	pub const fn coordinate(&self) -> Coordinate {
		Coordinate::new(self.latitude, self.longitude)
	}

	pub(crate) fn is_valid(&self) -> bool {
		self.latitude.is_finite()
			&& self.longitude.is_finite()
			&& (-90.0..=90.0).contains(&self.latitude)
			&& (-180.0..=180.0).contains(&self.longitude)
	}
}

/// Distance from the destination at which the alert fires.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct AlertRadius(f64);

impl AlertRadius {
	/// Choices offered to the user.
	pub const PRESETS: [Self; 5] = [
		Self(100.0),
		Self(200.0),
		Self(300.0),
		Self(500.0),
		Self(1000.0),
	];

	pub fn new(meters: f64) -> Result<Self> {
		if meters.is_finite() && meters > 0.0 {
			Ok(Self(meters))
		} else {
			Err(Error::InvalidRadius(meters))
		}
	}

	#[must_use]
	pub const fn meters(self) -> f64 {
		self.0
	}

	#[must_use]
	pub fn contains(self, distance: f64) -> bool {
		distance <= self.0
	}
}

impl Default for AlertRadius {
	fn default() -> Self {
		Self(300.0)
	}
}

impl TryFrom<f64> for AlertRadius {
	type Error = Error;

	fn try_from(meters: f64) -> Result<Self> {
		Self::new(meters)
	}
}

impl From<AlertRadius> for f64 {
	fn from(radius: AlertRadius) -> Self {
		radius.0
	}
}

impl fmt::Display for AlertRadius {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&arrival_geo::format_distance(self.0))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn radius_must_be_positive_and_finite() {
		assert!(AlertRadius::new(300.0).is_ok());
		assert!(matches!(AlertRadius::new(0.0), Err(Error::InvalidRadius(_))));
		assert!(matches!(AlertRadius::new(-5.0), Err(Error::InvalidRadius(_))));
		assert!(AlertRadius::new(f64::NAN).is_err());
		assert!(AlertRadius::new(f64::INFINITY).is_err());
	}

	#[test]
	fn radius_boundary_is_inclusive() {
		let radius = AlertRadius::new(300.0).expect("valid radius");
		assert!(radius.contains(300.0));
		assert!(!radius.contains(300.01));
	}

	#[test]
	fn radius_rejects_invalid_json() {
		assert!(serde_json::from_str::<AlertRadius>("-1").is_err());
		assert_eq!(
			serde_json::from_str::<AlertRadius>("500").expect("valid radius"),
			AlertRadius::PRESETS[3]
		);
	}

	#[test]
	fn named_places_are_trimmed_and_non_empty() {
		let at = Coordinate::new(1.0, 2.0);

		let place = Place::named("  Home ", at, None).expect("valid name");
		assert_eq!(place.name, "Home");
		assert_eq!(place.marker, SAVED_MARKER);

		assert!(matches!(
			Place::named("   ", at, None),
			Err(Error::EmptyPlaceName)
		));
	}

	#[test]
	fn place_uses_short_wire_names() {
		let place = Place::named("Work", Coordinate::new(-12.5, 77.25), Some("🏢"))
			.expect("valid name");

		let json = serde_json::to_value(&place).expect("serializable");
		assert_eq!(
			json,
			serde_json::json!({"name": "Work", "lat": -12.5, "lng": 77.25, "emoji": "🏢"})
		);
	}

	#[test]
	fn out_of_range_places_are_invalid() {
		assert!(Place::pinned(Coordinate::new(10.0, 10.0)).is_valid());
		assert!(!Place::pinned(Coordinate::new(91.0, 10.0)).is_valid());
		assert!(!Place::pinned(Coordinate::new(f64::NAN, 10.0)).is_valid());
	}
}
