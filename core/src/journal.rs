//! In-app event log.
//!
//! Every entry is also emitted through `tracing`; the log exists so the app can show
//! what the monitor did while nobody was watching a terminal. Entries are written to the
//! store as they are logged, so they survive the process being killed.

use crate::persist::{KeyValueStore, APP_LOGS_KEY};

use std::{collections::VecDeque, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Info,
	Success,
	Warning,
	Error,
	Debug,
}

impl fmt::Display for LogLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Info => "info",
			Self::Success => "success",
			Self::Warning => "warning",
			Self::Error => "error",
			Self::Debug => "debug",
		})
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
	pub id: Uuid,
	pub timestamp: DateTime<Utc>,
	pub level: LogLevel,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

pub struct EventLog {
	// Newest first
	entries: Mutex<VecDeque<LogEntry>>,
	capacity: usize,
	chan: broadcast::Sender<LogEntry>,
	store: Arc<dyn KeyValueStore>,
}

impl EventLog {
	/// Builds the log and restores whatever a previous run flushed to `store`.
	pub async fn init(store: Arc<dyn KeyValueStore>, capacity: usize) -> Arc<Self> {
		let mut entries = match store.get(APP_LOGS_KEY).await {
			Ok(Some(json)) => serde_json::from_str::<VecDeque<LogEntry>>(&json)
				.map_err(|e| warn!(?e, "Discarding unreadable persisted log entries"))
				.unwrap_or_default(),
			Ok(None) => VecDeque::new(),
			Err(e) => {
				error!(?e, "Failed to load persisted log entries");
				VecDeque::new()
			}
		};
		entries.truncate(capacity);

		Arc::new(Self {
			entries: Mutex::new(entries),
			capacity,
			chan: broadcast::channel(32).0,
			store,
		})
	}

	pub async fn log(
		&self,
		level: LogLevel,
		message: impl Into<String>,
		details: Option<serde_json::Value>,
	) {
		let entry = LogEntry {
			id: Uuid::new_v4(),
			timestamp: Utc::now(),
			level,
			message: message.into(),
			details,
		};

		match level {
			LogLevel::Info | LogLevel::Success => info!(%level, "{}", entry.message),
			LogLevel::Warning => warn!("{}", entry.message),
			LogLevel::Error => error!("{}", entry.message),
			LogLevel::Debug => debug!("{}", entry.message),
		}

		{
			let mut entries = self.entries.lock().await;
			entries.push_front(entry.clone());
			entries.truncate(self.capacity);
		}

		if self.chan.receiver_count() > 0 {
			self.chan.send(entry).ok();
		}

		self.flush().await;
	}

	pub async fn info(&self, message: impl Into<String>) {
		self.log(LogLevel::Info, message, None).await;
	}

	pub async fn success(&self, message: impl Into<String>) {
		self.log(LogLevel::Success, message, None).await;
	}

	pub async fn warning(&self, message: impl Into<String>) {
		self.log(LogLevel::Warning, message, None).await;
	}

	pub async fn error(&self, message: impl Into<String>) {
		self.log(LogLevel::Error, message, None).await;
	}

	/// Newest entry first.
	pub async fn entries(&self) -> Vec<LogEntry> {
		self.entries.lock().await.iter().cloned().collect()
	}

	pub async fn len(&self) -> usize {
		self.entries.lock().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.entries.lock().await.is_empty()
	}

	pub async fn clear(&self) {
		self.entries.lock().await.clear();
		self.flush().await;
	}

	/// New entries as they are logged.
	pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
		self.chan.subscribe()
	}

	pub async fn export_json(&self) -> String {
		serde_json::to_string_pretty(&*self.entries.lock().await).unwrap_or_else(|e| {
			error!(?e, "Failed to export log entries");
			"[]".to_string()
		})
	}

	/// Writes the current entries to the store. Failures are logged, never returned.
	pub async fn flush(&self) {
		// Held until the write lands, so an older snapshot never overwrites a newer one
		let entries = self.entries.lock().await;

		let json = match serde_json::to_string(&*entries) {
			Ok(json) => json,
			Err(e) => {
				error!(?e, "Failed to encode log entries");
				return;
			}
		};

		if let Err(e) = self.store.set(APP_LOGS_KEY, json).await {
			error!(?e, "Failed to persist log entries");
		}
	}
}

#[cfg(test)]
mod tests {
	use crate::persist::MemoryStore;

	use tracing_test::traced_test;

	use super::*;

	#[tokio::test]
	#[traced_test]
	async fn keeps_newest_entries_up_to_capacity() {
		let log = EventLog::init(Arc::new(MemoryStore::new()), 3).await;

		for i in 0..5 {
			log.info(format!("entry {i}")).await;
		}

		let messages = log
			.entries()
			.await
			.into_iter()
			.map(|entry| entry.message)
			.collect::<Vec<_>>();
		assert_eq!(messages, ["entry 4", "entry 3", "entry 2"]);
	}

	#[tokio::test]
	#[traced_test]
	async fn subscribers_receive_new_entries() {
		let log = EventLog::init(Arc::new(MemoryStore::new()), DEFAULT_LOG_CAPACITY).await;
		let mut rx = log.subscribe();

		log.warning("Limited permission").await;

		let entry = rx.recv().await.expect("entry broadcast");
		assert_eq!(entry.level, LogLevel::Warning);
		assert_eq!(entry.message, "Limited permission");
	}

	#[tokio::test]
	#[traced_test]
	async fn flushed_entries_survive_a_restart() {
		let store = MemoryStore::new();

		let log = EventLog::init(Arc::new(store.clone()), DEFAULT_LOG_CAPACITY).await;
		log.success("Monitoring started").await;
		log.log(
			LogLevel::Error,
			"Dispatch failed",
			Some(serde_json::json!({"reason": "denied"})),
		)
		.await;
		log.flush().await;

		let restored = EventLog::init(Arc::new(store), DEFAULT_LOG_CAPACITY).await;
		assert_eq!(restored.entries().await, log.entries().await);

		restored.clear().await;
		assert!(restored.is_empty().await);
	}

	#[tokio::test]
	#[traced_test]
	async fn entries_are_persisted_as_they_are_logged() {
		let store = MemoryStore::new();

		let log = EventLog::init(Arc::new(store.clone()), DEFAULT_LOG_CAPACITY).await;
		log.success("Arrived within 300 m of Central Station").await;
		// No flush, the process could die right here

		let restored = EventLog::init(Arc::new(store), DEFAULT_LOG_CAPACITY).await;
		let entries = restored.entries().await;
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].message, "Arrived within 300 m of Central Station");
	}

	#[tokio::test]
	#[traced_test]
	async fn unreadable_persisted_entries_are_discarded() {
		let store = MemoryStore::new();
		store
			.set(APP_LOGS_KEY, "[{\"broken\"".to_string())
			.await
			.expect("infallible");

		let log = EventLog::init(Arc::new(store), DEFAULT_LOG_CAPACITY).await;
		assert!(log.is_empty().await);
		assert!(logs_contain("Discarding unreadable persisted log entries"));
	}
}
