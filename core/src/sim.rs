//! In-process stand-ins for the platform backends.
//!
//! They record every call and let the caller play the platform's part (push a fix, tap a
//! notification action, deny a permission, fill up the disk), which is what the replay
//! CLI and the tests are built on.

use crate::{
	alert::{AlertContent, DispatchError, HapticBackend, NotificationBackend, NotificationResponse},
	error::PermissionKind,
	location::{LocationBackend, LocationError, PermissionStatus, PositionStream, WatchOptions},
	persist::{KeyValueStore, MemoryStore, StoreError},
};

use std::{
	collections::HashMap,
	io,
	sync::atomic::{AtomicBool, AtomicU64, Ordering},
	time::Duration,
};

use arrival_geo::Coordinate;
use async_channel as chan;
use async_trait::async_trait;
use tokio::{sync::Mutex, time::sleep};
use tracing::{debug, info};

type FixSender = chan::Sender<Result<Coordinate, LocationError>>;

const STREAM_CAPACITY: usize = 64;

/// A location provider driven by [`SimulatedLocation::push`].
pub struct SimulatedLocation {
	permissions: Mutex<HashMap<PermissionKind, PermissionStatus>>,
	current: Mutex<Result<Coordinate, LocationError>>,
	watchers: Mutex<Vec<FixSender>>,
	background_tasks: Mutex<HashMap<String, FixSender>>,
}

impl Default for SimulatedLocation {
	fn default() -> Self {
		Self {
			permissions: Mutex::new(HashMap::from([
				(PermissionKind::ForegroundLocation, PermissionStatus::Granted),
				(PermissionKind::BackgroundLocation, PermissionStatus::Granted),
			])),
			current: Mutex::new(Err(LocationError::Unavailable(
				"no fix yet".to_string(),
			))),
			watchers: Mutex::new(Vec::new()),
			background_tasks: Mutex::new(HashMap::new()),
		}
	}
}

impl SimulatedLocation {
	pub async fn set_permission(&self, kind: PermissionKind, status: PermissionStatus) {
		self.permissions.lock().await.insert(kind, status);
	}

	/// Delivers a fix to every live watch and background task, and makes it the answer
	/// to one-shot queries. Returns how many subscribers received it.
	pub async fn push(&self, coordinate: Coordinate) -> usize {
		*self.current.lock().await = Ok(coordinate);
		self.broadcast(Ok(coordinate)).await
	}

	/// Delivers an acquisition failure to every subscriber.
	pub async fn push_error(&self, error: LocationError) -> usize {
		*self.current.lock().await = Err(error.clone());
		self.broadcast(Err(error)).await
	}

	pub async fn active_watches(&self) -> usize {
		let mut watchers = self.watchers.lock().await;
		watchers.retain(|tx| !tx.is_closed());
		watchers.len()
	}

	pub async fn background_tasks(&self) -> Vec<String> {
		self.background_tasks.lock().await.keys().cloned().collect()
	}

	/// Registers `name` outside of any monitor, like a task a previous process never
	/// unregistered.
	pub async fn register_stale(&self, name: &str) -> PositionStream {
		let (tx, rx) = chan::bounded(STREAM_CAPACITY);
		self.background_tasks
			.lock()
			.await
			.insert(name.to_string(), tx);
		rx
	}

	async fn broadcast(&self, fix: Result<Coordinate, LocationError>) -> usize {
		let mut senders = {
			let mut watchers = self.watchers.lock().await;
			watchers.retain(|tx| !tx.is_closed());
			watchers.clone()
		};
		senders.extend(
			self.background_tasks
				.lock()
				.await
				.values()
				.filter(|tx| !tx.is_closed())
				.cloned(),
		);

		let mut delivered = 0;
		for tx in senders {
			if tx.send(fix.clone()).await.is_ok() {
				delivered += 1;
			}
		}

		delivered
	}
}

#[async_trait]
impl LocationBackend for SimulatedLocation {
	async fn permission(&self, kind: PermissionKind) -> PermissionStatus {
		self.permissions
			.lock()
			.await
			.get(&kind)
			.copied()
			.unwrap_or(PermissionStatus::Undetermined)
	}

	async fn request_permission(&self, kind: PermissionKind) -> PermissionStatus {
		// Nobody answers the prompt, an undetermined permission stays that way
		self.permission(kind).await
	}

	async fn current_position(&self) -> Result<Coordinate, LocationError> {
		self.current.lock().await.clone()
	}

	async fn watch_position(&self, options: WatchOptions) -> Result<PositionStream, LocationError> {
		if !self
			.permission(PermissionKind::ForegroundLocation)
			.await
			.is_granted()
		{
			return Err(LocationError::PermissionRevoked);
		}

		let (tx, rx) = chan::bounded(STREAM_CAPACITY);
		self.watchers.lock().await.push(tx);
		debug!(?options, "Simulated watch subscribed");

		Ok(rx)
	}

	async fn register_background_task(
		&self,
		name: &str,
		options: WatchOptions,
	) -> Result<PositionStream, LocationError> {
		if !self
			.permission(PermissionKind::BackgroundLocation)
			.await
			.is_granted()
		{
			return Err(LocationError::PermissionRevoked);
		}

		let (tx, rx) = chan::bounded(STREAM_CAPACITY);
		self.background_tasks
			.lock()
			.await
			.insert(name.to_string(), tx);
		debug!(%name, ?options, "Simulated background task registered");

		Ok(rx)
	}

	async fn unregister_background_task(&self, name: &str) {
		if let Some(tx) = self.background_tasks.lock().await.remove(name) {
			tx.close();
		}
	}

	async fn has_background_task(&self, name: &str) -> bool {
		self.background_tasks.lock().await.contains_key(name)
	}
}

/// Notification center that remembers what it was asked to show.
pub struct RecordingNotifications {
	permission: Mutex<PermissionStatus>,
	scheduled: Mutex<Vec<AlertContent>>,
	displayed: Mutex<Vec<AlertContent>>,
	fail_next: Mutex<bool>,
	responses_tx: chan::Sender<NotificationResponse>,
	responses_rx: chan::Receiver<NotificationResponse>,
}

impl Default for RecordingNotifications {
	fn default() -> Self {
		let (responses_tx, responses_rx) = chan::unbounded();

		Self {
			permission: Mutex::new(PermissionStatus::Granted),
			scheduled: Mutex::new(Vec::new()),
			displayed: Mutex::new(Vec::new()),
			fail_next: Mutex::new(false),
			responses_tx,
			responses_rx,
		}
	}
}

impl RecordingNotifications {
	pub async fn set_permission(&self, status: PermissionStatus) {
		*self.permission.lock().await = status;
	}

	pub async fn fail_next_schedule(&self) {
		*self.fail_next.lock().await = true;
	}

	/// Everything ever scheduled, oldest first.
	pub async fn scheduled(&self) -> Vec<AlertContent> {
		self.scheduled.lock().await.clone()
	}

	/// What is on screen right now.
	pub async fn displayed(&self) -> Vec<AlertContent> {
		self.displayed.lock().await.clone()
	}

	/// Plays the user tapping `action` on the notification.
	pub async fn respond(&self, action: &str) {
		self.responses_tx
			.send(NotificationResponse {
				action: action.to_string(),
			})
			.await
			.ok();
	}
}

#[async_trait]
impl NotificationBackend for RecordingNotifications {
	async fn request_permission(&self) -> PermissionStatus {
		*self.permission.lock().await
	}

	async fn schedule(&self, content: AlertContent) -> Result<(), DispatchError> {
		if std::mem::take(&mut *self.fail_next.lock().await) {
			return Err(DispatchError::Notification(
				"simulated delivery failure".to_string(),
			));
		}

		if !self.permission.lock().await.is_granted() {
			return Err(DispatchError::NotPermitted);
		}

		info!(title = %content.title, body = %content.body, "Notification shown");
		self.scheduled.lock().await.push(content.clone());
		self.displayed.lock().await.push(content);

		Ok(())
	}

	async fn dismiss_all(&self) -> Result<(), DispatchError> {
		self.displayed.lock().await.clear();
		Ok(())
	}

	fn responses(&self) -> chan::Receiver<NotificationResponse> {
		self.responses_rx.clone()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HapticCall {
	Vibrate { pattern: Vec<u64>, repeat: bool },
	Cancel,
}

#[derive(Default)]
pub struct RecordingHaptics {
	calls: Mutex<Vec<HapticCall>>,
}

impl RecordingHaptics {
	pub async fn calls(&self) -> Vec<HapticCall> {
		self.calls.lock().await.clone()
	}

	/// Whether the last call started a vibration that nothing cancelled since.
	pub async fn is_vibrating(&self) -> bool {
		matches!(
			self.calls.lock().await.last(),
			Some(HapticCall::Vibrate { .. })
		)
	}

	pub async fn vibrations(&self) -> usize {
		self.calls
			.lock()
			.await
			.iter()
			.filter(|call| matches!(call, HapticCall::Vibrate { .. }))
			.count()
	}
}

#[async_trait]
impl HapticBackend for RecordingHaptics {
	async fn vibrate(&self, pattern: &[u64], repeat: bool) -> Result<(), DispatchError> {
		self.calls.lock().await.push(HapticCall::Vibrate {
			pattern: pattern.to_vec(),
			repeat,
		});
		Ok(())
	}

	async fn cancel(&self) -> Result<(), DispatchError> {
		self.calls.lock().await.push(HapticCall::Cancel);
		Ok(())
	}
}

/// A [`MemoryStore`] whose writes can be slowed down or made to fail, like a busy or a full
/// disk. Reads always succeed.
#[derive(Debug, Default)]
pub struct FlakyStore {
	entries: MemoryStore,
	failing: AtomicBool,
	write_delay_ms: AtomicU64,
}

impl FlakyStore {
	pub fn fail_writes(&self, failing: bool) {
		self.failing.store(failing, Ordering::Release);
	}

	pub fn delay_writes(&self, delay: Duration) {
		self.write_delay_ms.store(
			u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
			Ordering::Release,
		);
	}

	async fn before_write(&self) -> Result<(), StoreError> {
		let delay_ms = self.write_delay_ms.load(Ordering::Acquire);
		if delay_ms > 0 {
			sleep(Duration::from_millis(delay_ms)).await;
		}

		if self.failing.load(Ordering::Acquire) {
			return Err(StoreError::io(
				"flaky-store",
				io::Error::other("disk full"),
			));
		}

		Ok(())
	}
}

#[async_trait]
impl KeyValueStore for FlakyStore {
	async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		self.entries.get(key).await
	}

	async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
		self.before_write().await?;
		self.entries.set(key, value).await
	}

	async fn remove(&self, key: &str) -> Result<(), StoreError> {
		self.before_write().await?;
		self.entries.remove(key).await
	}
}
