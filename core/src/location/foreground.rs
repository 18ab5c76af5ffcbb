use crate::monitor::MonitorActor;

use super::{forward, LocationBackend, PositionSink, SinkRef, WatchOptions};

use std::sync::{Arc, Weak};

use arrival_actors::{Actor, Stopper};
use tracing::{debug, error};

/// Continuous watch while the app has a UI, delivering straight to the live monitor.
pub struct ForegroundWatch {
	backend: Arc<dyn LocationBackend>,
	options: WatchOptions,
	sink: SinkRef,
}

impl ForegroundWatch {
	pub fn new(
		backend: Arc<dyn LocationBackend>,
		options: WatchOptions,
		sink: Weak<dyn PositionSink>,
	) -> Self {
		Self {
			backend,
			options,
			sink: SinkRef::Weak(sink),
		}
	}
}

impl Actor<MonitorActor> for ForegroundWatch {
	const IDENTIFIER: MonitorActor = MonitorActor::ForegroundWatch;

	async fn run(&mut self, stop: Stopper) {
		let stream = match self.backend.watch_position(self.options).await {
			Ok(stream) => stream,
			Err(e) => {
				error!(?e, "Failed to subscribe to foreground position updates");
				if let Some(sink) = self.sink.get() {
					sink.on_location_unavailable(e).await;
				}
				return;
			}
		};

		debug!(options = ?self.options, "Foreground watch subscribed");

		forward(&stream, &stop, &self.sink).await;

		// Dropping the receiver is what releases the platform subscription
		stream.close();
		debug!("Foreground watch unsubscribed");
	}
}
