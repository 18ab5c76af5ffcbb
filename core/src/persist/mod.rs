//! Durable key-value storage shared by the foreground monitor and the background task.
//!
//! The store is the only thing both execution contexts have in common, so every
//! decision that must survive the foreground going away is written here.

use std::{io, path::PathBuf};

use async_trait::async_trait;
use thiserror::Error;

mod state;
mod store;

pub use state::{PersistedMonitorState, PersistedSnapshot, StatePatch};
pub use store::{FileStore, MemoryStore};

pub const DESTINATION_KEY: &str = "@destination";
pub const ALERT_RADIUS_KEY: &str = "@alert_radius";
pub const ALERT_SHOWN_KEY: &str = "@alert_shown";
pub const MONITORING_KEY: &str = "@monitoring";
pub const SAVED_PLACES_KEY: &str = "@saved_places";
pub const APP_LOGS_KEY: &str = "@app_logs";

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("store file I/O error <path='{}'>: {source}", .path.display())]
	FileIO {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("store file <path='{}'> is not a JSON object: {source}", .path.display())]
	Decode {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
	#[error("failed to encode store contents: {0}")]
	Encode(#[from] serde_json::Error),
}

impl StoreError {
	pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
		Self::FileIO {
			path: path.into(),
			source,
		}
	}
}

/// String key-value storage. Writes are last-writer-wins and there is no transaction
/// across keys, readers must cope with a torn set of entries.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
	async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

	async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

	async fn remove(&self, key: &str) -> Result<(), StoreError>;
}
