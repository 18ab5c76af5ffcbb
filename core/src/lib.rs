//!
//! # Arrival core
//!
//! Watches the distance between the device and a destination and alerts once the device
//! gets within the alert radius.
//!
//! A [`ProximityMonitor`] owns the monitoring state and is fed by two producers: a
//! foreground watch and a registered background task. The background task runs its own
//! evaluation against the [`PersistedMonitorState`], which is the only thing both contexts
//! share. Platform services are reached through [`LocationBackend`],
//! [`NotificationBackend`], [`HapticBackend`] and [`KeyValueStore`]; the [`sim`] module
//! provides in-process versions of each.

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
#![allow(
	clippy::missing_errors_doc,
	clippy::module_name_repetitions,
	clippy::future_not_send
)]

pub mod alert;
pub mod config;
pub mod error;
pub mod journal;
pub mod location;
pub mod monitor;
pub mod persist;
pub mod place;
pub mod places;
pub mod sim;

pub use alert::{AlertDispatcher, HapticBackend, NotificationBackend};
pub use config::{MonitorConfig, RestartPolicy};
pub use error::{Error, PermissionKind, Result};
pub use journal::{EventLog, LogEntry, LogLevel};
pub use location::{LocationBackend, LocationError, PermissionStatus, WatchOptions};
pub use monitor::{Backends, MonitorActor, MonitorEvent, MonitorState, ProximityMonitor};
pub use persist::{FileStore, KeyValueStore, MemoryStore, PersistedMonitorState, StatePatch};
pub use place::{AlertRadius, Place};
pub use places::SavedPlaces;

pub use arrival_geo::{distance_meters, format_distance, Coordinate};
