use std::path::PathBuf;

use anyhow::{Context as _, Result};
use arrival_core::MonitorConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod context;
mod domains;
mod util;

use crate::{
	context::{Context, OutputFormat},
	domains::{logs::LogsCmd, places::PlacesCmd, replay::ReplayArgs},
};

const DATA_DIR_ENV: &str = "ARRIVAL_DATA_DIR";

#[derive(Parser, Debug)]
#[command(name = "arrival", about = "Arrival alert CLI (simulated platform)")]
struct Cli {
	/// Path to the arrival data directory
	#[arg(long)]
	data_dir: Option<PathBuf>,

	/// Output format
	#[arg(long, value_enum, default_value = "human")]
	format: OutputFormat,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Replay a recorded track against a destination
	Replay(ReplayArgs),
	/// Saved places operations
	#[command(subcommand)]
	Places(PlacesCmd),
	/// Event log operations
	#[command(subcommand)]
	Logs(LogsCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::registry()
		.with(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| EnvFilter::new("info,arrival_core=debug")),
		)
		.with(fmt::layer().with_writer(std::io::stderr))
		.init();

	let cli = Cli::parse();

	let data_dir = match cli
		.data_dir
		.or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
	{
		Some(dir) => dir,
		None => std::env::current_dir()?.join("arrival_data"),
	};
	std::fs::create_dir_all(&data_dir)
		.with_context(|| format!("failed to create {}", data_dir.display()))?;

	let config = MonitorConfig::load_from(&data_dir)?;
	let ctx = Context::new(cli.format, data_dir, config);

	match cli.command {
		Commands::Replay(args) => domains::replay::run(&ctx, args).await?,
		Commands::Places(cmd) => domains::places::run(&ctx, cmd).await?,
		Commands::Logs(cmd) => domains::logs::run(&ctx, cmd).await?,
	}

	Ok(())
}
