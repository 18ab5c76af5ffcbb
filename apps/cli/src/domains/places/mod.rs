//! Saved places management

mod args;

use anyhow::Result;
use arrival_core::{format_distance, Coordinate, Place, SavedPlaces};
use clap::Subcommand;
use serde::Serialize;

use crate::{context::Context, print_output};

pub use self::args::*;

#[derive(Subcommand, Debug)]
pub enum PlacesCmd {
	/// List saved places
	List(PlacesListArgs),
	/// Save a new place
	Add(PlacesAddArgs),
	/// Remove a saved place
	Remove(PlacesRemoveArgs),
}

#[derive(Serialize)]
struct PlaceRow<'a> {
	index: usize,
	#[serde(flatten)]
	place: &'a Place,
	#[serde(skip_serializing_if = "Option::is_none")]
	distance_meters: Option<f64>,
}

pub async fn run(ctx: &Context, cmd: PlacesCmd) -> Result<()> {
	let mut places = SavedPlaces::load(ctx.store()).await;

	match cmd {
		PlacesCmd::List(args) => {
			let distances = match (args.lat, args.lng) {
				(Some(lat), Some(lng)) => Some(places.distances_from(&Coordinate::new(lat, lng))),
				_ => None,
			};

			let rows = places
				.list()
				.iter()
				.enumerate()
				.map(|(index, place)| PlaceRow {
					index,
					place,
					distance_meters: distances.as_ref().map(|distances| distances[index]),
				})
				.collect::<Vec<_>>();

			print_output!(ctx, &rows, |rows: &Vec<PlaceRow<'_>>| {
				if rows.is_empty() {
					println!("No saved places");
					return;
				}
				for row in rows {
					let distance = row
						.distance_meters
						.map(|meters| format!(" ({})", format_distance(meters)))
						.unwrap_or_default();
					println!(
						"{:>3}. {} {} [{:.5}, {:.5}]{distance}",
						row.index, row.place.marker, row.place.name, row.place.latitude,
						row.place.longitude,
					);
				}
			});
		}
		PlacesCmd::Add(args) => {
			let place = places
				.add(&args.name, Coordinate::new(args.lat, args.lng), args.marker.as_deref())
				.await?;

			print_output!(ctx, place, |place: &Place| {
				println!("Saved {} {}", place.marker, place.name);
			});
		}
		PlacesCmd::Remove(args) => {
			let place = places.remove(args.index).await?;

			print_output!(ctx, &place, |place: &Place| {
				println!("Removed {}", place.name);
			});
		}
	}

	Ok(())
}
