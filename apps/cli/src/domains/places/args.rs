use clap::Args;

#[derive(Args, Debug)]
pub struct PlacesListArgs {
	/// Latitude to measure distances from
	#[arg(long, requires = "lng", allow_hyphen_values = true)]
	pub lat: Option<f64>,

	/// Longitude to measure distances from
	#[arg(long, requires = "lat", allow_hyphen_values = true)]
	pub lng: Option<f64>,
}

#[derive(Args, Debug)]
pub struct PlacesAddArgs {
	/// Display name of the place
	pub name: String,

	#[arg(long, allow_hyphen_values = true)]
	pub lat: f64,

	#[arg(long, allow_hyphen_values = true)]
	pub lng: f64,

	/// Emoji shown next to the place
	#[arg(long)]
	pub marker: Option<String>,
}

#[derive(Args, Debug)]
pub struct PlacesRemoveArgs {
	/// Position of the place in `places list`
	pub index: usize,
}
