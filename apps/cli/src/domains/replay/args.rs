use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ReplayArgs {
	/// JSON array of fixes, `{"latitude": .., "longitude": ..}`, or `{"error": ".."}` for a
	/// failed acquisition
	pub track: PathBuf,

	/// Destination latitude
	#[arg(long, requires = "lng", allow_hyphen_values = true)]
	pub lat: Option<f64>,

	/// Destination longitude
	#[arg(long, requires = "lat", allow_hyphen_values = true)]
	pub lng: Option<f64>,

	/// Destination name, an unnamed pin is used otherwise
	#[arg(long, requires = "lat")]
	pub name: Option<String>,

	/// Use the saved place at this index as destination
	#[arg(long, conflicts_with = "lat")]
	pub place: Option<usize>,

	/// Alert radius in meters
	#[arg(long)]
	pub radius: Option<f64>,

	/// Pause between fixes, in milliseconds
	#[arg(long, default_value_t = 0)]
	pub interval_ms: u64,

	/// Tap the notification's stop action as soon as the arrival alert shows
	#[arg(long, default_value_t = false)]
	pub stop_on_arrival: bool,

	/// Leave monitoring on when the track ends, for the next run to pick up
	#[arg(long, default_value_t = false)]
	pub keep_monitoring: bool,
}
