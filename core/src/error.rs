use crate::{alert::DispatchError, location::LocationError, persist::StoreError};

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionKind {
	ForegroundLocation,
	BackgroundLocation,
}

impl fmt::Display for PermissionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::ForegroundLocation => "foreground location",
			Self::BackgroundLocation => "background location",
		})
	}
}

#[derive(Debug, Error)]
pub enum Error {
	#[error("{0} permission was not granted")]
	PermissionDenied(PermissionKind),
	#[error("location unavailable: {0}")]
	LocationUnavailable(#[from] LocationError),
	#[error("no destination selected, pick one before starting to monitor")]
	NoDestination,
	#[error("alert radius must be a positive number of meters, got {0}")]
	InvalidRadius(f64),
	#[error("persisted entry <key='{key}'> is corrupt: {reason}")]
	PersistenceCorrupt { key: &'static str, reason: String },
	#[error("alert dispatch failed: {0}")]
	DispatchFailure(#[from] DispatchError),
	#[error(transparent)]
	Store(#[from] StoreError),
	#[error("place name must not be empty")]
	EmptyPlaceName,
	#[error("no saved place at index {0}")]
	PlaceNotFound(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
