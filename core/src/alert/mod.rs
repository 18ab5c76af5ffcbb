//! Turning an arrival into something the user notices.

use crate::{error::Error, location::PermissionStatus, place::Place};

use std::sync::Arc;

use arrival_geo::format_distance;
use async_channel as chan;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

mod listener;

pub use listener::ResponseListener;

/// Action identifier attached to the alert notification to stop monitoring.
pub const STOP_MONITORING_ACTION: &str = "STOP_MONITORING";

/// Vibration played with the arrival notification, in milliseconds (wait, vibrate, ...).
pub const ARRIVAL_PATTERN: &[u64] = &[500, 200, 500, 200, 500, 200, 500];

/// Longer vibration used when the notification itself couldn't be delivered.
pub const FALLBACK_PATTERN: &[u64] = &[1000, 500, 1000, 500, 1000];

const ALERT_TITLE: &str = "You have arrived!";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
	#[error("notification backend failed: {0}")]
	Notification(String),
	#[error("notifications are not permitted")]
	NotPermitted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertAction {
	pub identifier: String,
	pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertContent {
	pub title: String,
	pub body: String,
	/// Stays on screen until dismissed or acted on.
	pub sticky: bool,
	pub actions: Vec<AlertAction>,
}

impl AlertContent {
	#[must_use]
	pub fn arrival(destination: &Place, distance: f64) -> Self {
		Self {
			title: ALERT_TITLE.to_string(),
			body: format!(
				"You are {} from {}",
				format_distance(distance),
				destination.name
			),
			sticky: true,
			actions: vec![AlertAction {
				identifier: STOP_MONITORING_ACTION.to_string(),
				title: "Stop".to_string(),
			}],
		}
	}
}

/// The user acting on a notification, delivered asynchronously by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationResponse {
	pub action: String,
}

#[async_trait]
pub trait NotificationBackend: Send + Sync + 'static {
	async fn request_permission(&self) -> PermissionStatus;

	/// Shows `content` immediately.
	async fn schedule(&self, content: AlertContent) -> Result<(), DispatchError>;

	async fn dismiss_all(&self) -> Result<(), DispatchError>;

	fn responses(&self) -> chan::Receiver<NotificationResponse>;
}

#[async_trait]
pub trait HapticBackend: Send + Sync + 'static {
	async fn vibrate(&self, pattern: &[u64], repeat: bool) -> Result<(), DispatchError>;

	async fn cancel(&self) -> Result<(), DispatchError>;
}

/// Idempotent alert delivery. Triggering replaces whatever alert is showing instead of
/// stacking a new one, which is what keeps two execution contexts racing on the same
/// arrival from producing two alerts.
#[derive(Clone)]
pub struct AlertDispatcher {
	notifications: Arc<dyn NotificationBackend>,
	haptics: Arc<dyn HapticBackend>,
}

impl AlertDispatcher {
	pub fn new(
		notifications: Arc<dyn NotificationBackend>,
		haptics: Arc<dyn HapticBackend>,
	) -> Self {
		Self {
			notifications,
			haptics,
		}
	}

	pub async fn trigger(&self, destination: &Place, distance: f64) {
		self.cancel().await;

		let content = AlertContent::arrival(destination, distance);
		debug!(?content, "Dispatching arrival alert");

		let pattern = match self.notifications.schedule(content).await {
			Ok(()) => ARRIVAL_PATTERN,
			Err(e) => {
				let e = Error::DispatchFailure(e);
				error!(%e, "Arrival notification failed, falling back to vibration only");
				FALLBACK_PATTERN
			}
		};

		if let Err(e) = self.haptics.vibrate(pattern, false).await {
			error!(?e, "Failed to vibrate for arrival alert");
		}
	}

	/// Silences the vibration and removes the notification. Safe when nothing is active.
	pub async fn cancel(&self) {
		if let Err(e) = self.haptics.cancel().await {
			warn!(?e, "Failed to cancel vibration");
		}

		if let Err(e) = self.notifications.dismiss_all().await {
			warn!(?e, "Failed to dismiss notifications");
		}
	}
}
