use crate::monitor::{MonitorActor, WeakProximityMonitor};

use super::{NotificationResponse, STOP_MONITORING_ACTION};

use arrival_actors::{Actor, Stopper};
use async_channel as chan;
use futures_concurrency::future::Race;
use tokio::spawn;
use tracing::{debug, info, warn};

/// Routes the notification's stop action back to the monitor, which may happen while the
/// UI is not in the foreground.
pub struct ResponseListener {
	responses: chan::Receiver<NotificationResponse>,
	monitor: WeakProximityMonitor,
}

impl ResponseListener {
	pub fn new(
		responses: chan::Receiver<NotificationResponse>,
		monitor: WeakProximityMonitor,
	) -> Self {
		Self { responses, monitor }
	}
}

enum Message {
	Response(NotificationResponse),
	Closed,
	Stop,
}

impl Actor<MonitorActor> for ResponseListener {
	const IDENTIFIER: MonitorActor = MonitorActor::ResponseListener;

	async fn run(&mut self, stop: Stopper) {
		loop {
			let message = (
				async {
					self.responses
						.recv()
						.await
						.map_or(Message::Closed, Message::Response)
				},
				async {
					(&stop).await;
					Message::Stop
				},
			)
				.race()
				.await;

			let response = match message {
				Message::Response(response) => response,
				Message::Closed => {
					debug!("Notification responses channel closed");
					return;
				}
				Message::Stop => return,
			};

			if response.action != STOP_MONITORING_ACTION {
				warn!(action = %response.action, "Ignoring unknown notification action");
				continue;
			}

			let Some(monitor) = self.monitor.upgrade() else {
				debug!("Monitor is gone, nothing to stop");
				return;
			};

			info!("Stop requested from the arrival notification");

			// Detached, stopping the monitor waits on the actors collection this actor
			// belongs to
			spawn(async move { monitor.stop().await });
		}
	}
}
