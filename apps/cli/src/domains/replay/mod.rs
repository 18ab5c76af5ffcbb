//! Replays a recorded track through a monitor running on simulated platform services.
//!
//! State, saved places and the event log live in the data directory, so consecutive
//! replays behave like consecutive launches of the app.

mod args;

use std::{future::Future, path::Path, sync::Arc, time::Duration};

use anyhow::{bail, Context as _, Result};
use arrival_core::{
	alert::{AlertContent, STOP_MONITORING_ACTION},
	format_distance,
	sim::{RecordingHaptics, RecordingNotifications, SimulatedLocation},
	Backends, Coordinate, LocationError, MonitorEvent, MonitorState, Place, ProximityMonitor,
};
use serde::{Deserialize, Serialize};
use tokio::{
	fs,
	sync::broadcast,
	time::{sleep, timeout},
};
use tracing::{debug, info};

use crate::{
	context::{Context, OutputFormat},
	print_output,
};

pub use self::args::*;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TrackPoint {
	Fix(Coordinate),
	Failure { error: String },
}

#[derive(Serialize)]
struct ReplaySummary {
	fixes: usize,
	state: MonitorState,
	notifications: Vec<AlertContent>,
	vibrations: usize,
}

pub async fn run(ctx: &Context, args: ReplayArgs) -> Result<()> {
	let track = load_track(&args.track).await?;

	let location = Arc::new(SimulatedLocation::default());
	let notifications = Arc::new(RecordingNotifications::default());
	let haptics = Arc::new(RecordingHaptics::default());

	let monitor = ProximityMonitor::new(
		ctx.config.clone(),
		Backends {
			store: ctx.store(),
			location: location.clone(),
			notifications: notifications.clone(),
			haptics: haptics.clone(),
		},
	)
	.await;
	let mut events = monitor.subscribe();

	select_destination(&monitor, &args).await?;
	if let Some(radius) = args.radius {
		monitor.set_radius(radius).await?;
	}
	monitor.start().await?;

	let sim = location.as_ref();
	wait_for(|| async move { sim.active_watches().await > 0 })
		.await
		.context("foreground watch never subscribed")?;

	let mut replayed = 0;
	for point in track {
		let delivered = match point {
			TrackPoint::Fix(coordinate) => location.push(coordinate).await,
			TrackPoint::Failure { error } => {
				location
					.push_error(LocationError::Unavailable(error))
					.await
			}
		};
		debug!(delivered, "Track point pushed");
		replayed += 1;

		// Lockstep with the foreground watch: every point yields exactly one of these
		loop {
			let event = next_event(&mut events).await?;
			report(ctx.format, &event);
			if matches!(
				event,
				MonitorEvent::DistanceUpdated { .. } | MonitorEvent::LocationUnavailable { .. }
			) {
				break;
			}
		}

		// Waits for the evaluation of this point to finish
		if args.stop_on_arrival && monitor.state().await.has_alerted {
			info!("Tapping the stop action of the arrival notification");
			notifications.respond(STOP_MONITORING_ACTION).await;
			loop {
				let event = next_event(&mut events).await?;
				report(ctx.format, &event);
				if event == MonitorEvent::Stopped {
					break;
				}
			}
			break;
		}

		if args.interval_ms > 0 {
			sleep(Duration::from_millis(args.interval_ms)).await;
		}
	}

	if args.keep_monitoring {
		info!("Leaving monitoring on");
	} else {
		monitor.stop().await;
	}
	monitor.shutdown().await;

	while let Ok(event) = events.try_recv() {
		report(ctx.format, &event);
	}

	let summary = ReplaySummary {
		fixes: replayed,
		state: monitor.state().await,
		notifications: notifications.scheduled().await,
		vibrations: haptics.vibrations().await,
	};

	print_output!(ctx, &summary, |summary: &ReplaySummary| {
		println!(
			"Replayed {} points, {} notification(s), {} vibration(s)",
			summary.fixes,
			summary.notifications.len(),
			summary.vibrations
		);
		for notification in &summary.notifications {
			println!("  {}: {}", notification.title, notification.body);
		}
		if summary.state.is_monitoring {
			println!("Still monitoring");
		}
	});

	Ok(())
}

async fn load_track(path: &Path) -> Result<Vec<TrackPoint>> {
	let json = fs::read_to_string(path)
		.await
		.with_context(|| format!("failed to read track {}", path.display()))?;

	serde_json::from_str(&json)
		.with_context(|| format!("failed to parse track {}", path.display()))
}

async fn select_destination(monitor: &ProximityMonitor, args: &ReplayArgs) -> Result<()> {
	if let Some(index) = args.place {
		monitor.select_saved_place(index).await?;
		return Ok(());
	}

	match (args.lat, args.lng) {
		(Some(lat), Some(lng)) => {
			let at = Coordinate::new(lat, lng);
			let place = match &args.name {
				Some(name) => Place::named(name, at, None)?,
				None => Place::pinned(at),
			};
			monitor.set_destination(place).await;
		}
		_ if monitor.state().await.destination.is_some() => {
			info!("Using the destination of the previous session");
		}
		_ => bail!("no destination, pass --lat and --lng or --place"),
	}

	Ok(())
}

async fn next_event(events: &mut broadcast::Receiver<MonitorEvent>) -> Result<MonitorEvent> {
	timeout(DELIVERY_TIMEOUT, events.recv())
		.await
		.context("the monitor stopped reacting")?
		.context("monitor events channel failed")
}

async fn wait_for<F, Fut>(mut check: F) -> Result<()>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = bool>,
{
	timeout(DELIVERY_TIMEOUT, async {
		while !check().await {
			sleep(POLL_INTERVAL).await;
		}
	})
	.await?;

	Ok(())
}

fn report(format: OutputFormat, event: &MonitorEvent) {
	if let OutputFormat::Json = format {
		match serde_json::to_string(event) {
			Ok(json) => println!("{json}"),
			Err(e) => eprintln!("Failed to serialize event: {e}"),
		}
		return;
	}

	match event {
		MonitorEvent::DestinationChanged { destination } => {
			println!("Destination: {} {}", destination.marker, destination.name);
		}
		MonitorEvent::RadiusChanged { radius } => println!("Alert radius: {radius}"),
		MonitorEvent::Started {
			destination,
			radius,
		} => println!("Monitoring {} within {radius}", destination.name),
		MonitorEvent::Stopped => println!("Monitoring stopped"),
		MonitorEvent::Reset => println!("Alert dismissed"),
		MonitorEvent::DistanceUpdated { distance } => {
			println!("  {} to destination", format_distance(*distance));
		}
		MonitorEvent::Entered {
			distance,
			dispatched: true,
		} => println!("Arrived, {} away, alert shown", format_distance(*distance)),
		MonitorEvent::Entered {
			distance,
			dispatched: false,
		} => println!(
			"Arrived, {} away, already alerted in the background",
			format_distance(*distance)
		),
		MonitorEvent::LocationUnavailable { reason } => println!("  {reason}"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn track_mixes_fixes_and_failures() {
		let dir = tempfile::tempdir().expect("temp dir");
		let path = dir.path().join("track.json");
		fs::write(
			&path,
			r#"[
				{"latitude": 52.53, "longitude": 13.37},
				{"error": "lost signal"},
				{"latitude": 52.5251, "longitude": 13.3955, "accuracy": 8.0}
			]"#,
		)
		.await
		.expect("writable");

		let track = load_track(&path).await.expect("valid track");
		assert_eq!(track.len(), 3);
		assert!(matches!(
			track[0],
			TrackPoint::Fix(Coordinate {
				accuracy: None,
				..
			})
		));
		assert!(matches!(&track[1], TrackPoint::Failure { error } if error == "lost signal"));
		assert!(matches!(
			track[2],
			TrackPoint::Fix(Coordinate {
				accuracy: Some(_),
				..
			})
		));
	}

	#[tokio::test]
	async fn malformed_track_is_reported() {
		let dir = tempfile::tempdir().expect("temp dir");
		let path = dir.path().join("track.json");
		fs::write(&path, r#"[{"lat": 1.0}]"#).await.expect("writable");

		let e = load_track(&path).await.expect_err("invalid point");
		assert!(e.to_string().contains("failed to parse track"));
	}
}
