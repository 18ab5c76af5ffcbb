use arrival_core::{FileStore, KeyValueStore, MonitorConfig};

use std::{path::PathBuf, sync::Arc};

/// File holding the persisted monitor state, saved places and event log.
pub const STATE_FILE_NAME: &str = "state.json";

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
	Human,
	Json,
}

pub struct Context {
	pub format: OutputFormat,
	pub data_dir: PathBuf,
	pub config: MonitorConfig,
}

impl Context {
	pub fn new(format: OutputFormat, data_dir: PathBuf, config: MonitorConfig) -> Self {
		Self {
			format,
			data_dir,
			config,
		}
	}

	/// The store shared by every command, and by separate runs of the CLI.
	pub fn store(&self) -> Arc<dyn KeyValueStore> {
		Arc::new(FileStore::new(self.data_dir.join(STATE_FILE_NAME)))
	}
}
