use crate::place::{AlertRadius, Place};

use arrival_geo::{distance_meters, Coordinate};
use serde::Serialize;

/// What the UI renders. A copy of the monitor's state at the time it was taken.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorState {
	pub destination: Option<Place>,
	pub radius: AlertRadius,
	pub is_monitoring: bool,
	/// The alert latch: set on entering the radius, cleared by start, stop, reset and by
	/// changing the destination or the radius.
	pub has_alerted: bool,
	pub last_known_position: Option<Coordinate>,
	pub last_computed_distance: Option<f64>,
}

impl MonitorState {
	pub(super) const fn idle(destination: Option<Place>, radius: AlertRadius) -> Self {
		Self {
			destination,
			radius,
			is_monitoring: false,
			has_alerted: false,
			last_known_position: None,
			last_computed_distance: None,
		}
	}

	/// Whether the last computed distance is inside the alert radius.
	#[must_use]
	pub fn is_within_radius(&self) -> bool {
		self.last_computed_distance
			.is_some_and(|distance| self.radius.contains(distance))
	}

	pub(super) fn recompute_distance(&mut self) -> Option<f64> {
		self.last_computed_distance = match (&self.destination, &self.last_known_position) {
			(Some(destination), Some(position)) => {
				Some(distance_meters(position, &destination.coordinate()))
			}
			_ => None,
		};

		self.last_computed_distance
	}
}

/// Published to [`ProximityMonitor::subscribe`](super::ProximityMonitor::subscribe)
/// receivers on every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
	DestinationChanged { destination: Place },
	RadiusChanged { radius: AlertRadius },
	Started { destination: Place, radius: AlertRadius },
	Stopped,
	Reset,
	DistanceUpdated { distance: f64 },
	/// The radius was entered; `dispatched` is false when another execution context had
	/// already shown the alert.
	Entered { distance: f64, dispatched: bool },
	LocationUnavailable { reason: String },
}
