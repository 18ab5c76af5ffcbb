//!
//! # Geo
//!
//! Great-circle math shared by the arrival monitor and the background evaluator.
//!
//! Distances are computed with the haversine formula over a spherical Earth of radius
//! [`EARTH_RADIUS_METERS`], which is accurate to well under one percent for the short
//! ranges an arrival alert cares about.
//!
//! ```
//! use arrival_geo::{distance_meters, Coordinate};
//!
//! let here = Coordinate::new(0.0, 0.0);
//! let there = Coordinate::new(0.001, 0.001);
//!
//! let meters = distance_meters(&here, &there);
//! assert!((meters - 157.25).abs() < 1.0);
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::module_name_repetitions)]

use serde::{Deserialize, Serialize};

/// Mean Earth radius used by every distance in the workspace.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A position fix as delivered by a location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
	pub latitude: f64,
	pub longitude: f64,
	/// Horizontal accuracy radius in meters, when the provider reports one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub accuracy: Option<f64>,
}

impl Coordinate {
	#[must_use]
	pub const fn new(latitude: f64, longitude: f64) -> Self {
		Self {
			latitude,
			longitude,
			accuracy: None,
		}
	}

	#[must_use]
	pub const fn with_accuracy(mut self, meters: f64) -> Self {
		self.accuracy = Some(meters);
		self
	}

	/// Same point with latitude clamped to `[-90, 90]` and longitude to `[-180, 180]`.
	#[must_use]
	pub fn clamped(self) -> Self {
		Self {
			latitude: self.latitude.clamp(-90.0, 90.0),
			longitude: self.longitude.clamp(-180.0, 180.0),
			accuracy: self.accuracy,
		}
	}
}

/// Great-circle distance between two coordinates, in meters.
///
/// Symmetric, returns `0.0` for identical points and `π · R` for antipodal ones.
#[must_use]
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
	let a = a.clamped();
	let b = b.clamped();

	let phi1 = a.latitude.to_radians();
	let phi2 = b.latitude.to_radians();
	let delta_phi = (b.latitude - a.latitude).to_radians();
	let delta_lambda = (b.longitude - a.longitude).to_radians();

	let half_chord = (delta_phi / 2.0).sin().powi(2)
		+ phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);

	// Rounding can push the term a hair outside [0, 1] near antipodes
	let half_chord = half_chord.clamp(0.0, 1.0);

	let angle = 2.0 * half_chord.sqrt().atan2((1.0 - half_chord).sqrt());

	EARTH_RADIUS_METERS * angle
}

/// Human readable distance: whole meters below one kilometer, kilometers with two
/// decimals above.
#[must_use]
pub fn format_distance(meters: f64) -> String {
	if meters < 1000.0 {
		format!("{} m", meters.round())
	} else {
		format!("{:.2} km", meters / 1000.0)
	}
}
