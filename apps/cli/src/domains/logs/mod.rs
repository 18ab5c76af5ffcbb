//! The event log recorded by previous runs

mod args;

use anyhow::Result;
use arrival_core::{EventLog, LogEntry, LogLevel};
use clap::Subcommand;

use crate::{context::Context, print_output};

pub use self::args::*;

#[derive(Subcommand, Debug)]
pub enum LogsCmd {
	/// Show recorded entries
	Show(LogsShowArgs),
	/// Export every entry as JSON
	Export,
	/// Delete every entry
	Clear,
}

pub async fn run(ctx: &Context, cmd: LogsCmd) -> Result<()> {
	let journal = EventLog::init(ctx.store(), ctx.config.log_capacity).await;

	match cmd {
		LogsCmd::Show(args) => {
			let level = args.level.map(LogLevel::from);
			let entries = journal
				.entries()
				.await
				.into_iter()
				.filter(|entry| level.map_or(true, |level| entry.level == level))
				.take(args.limit)
				.collect::<Vec<_>>();

			print_output!(ctx, &entries, |entries: &Vec<LogEntry>| {
				if entries.is_empty() {
					println!("No log entries");
					return;
				}
				for entry in entries {
					println!(
						"{} {:>7} {}",
						entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
						entry.level.to_string(),
						entry.message
					);
				}
			});
		}
		LogsCmd::Export => println!("{}", journal.export_json().await),
		LogsCmd::Clear => {
			let count = journal.len().await;
			journal.clear().await;
			println!("Cleared {count} log entries");
		}
	}

	Ok(())
}
