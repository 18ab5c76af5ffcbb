//! Monitor configuration

use crate::{
	journal::DEFAULT_LOG_CAPACITY,
	location::{WatchOptions, BACKGROUND_TASK_NAME},
	place::AlertRadius,
};

use std::{
	fs,
	path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "arrival.json";

const CONFIG_VERSION: u32 = 1;

/// What `start()` does when monitoring is already on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
	/// Keep the running session untouched.
	#[default]
	Ignore,
	/// Reset the alert latch and renew both watch subscriptions.
	Restart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
	/// Config schema version
	pub version: u32,

	/// Radius selected when nothing was persisted yet
	#[serde(default)]
	pub default_radius: AlertRadius,

	#[serde(default = "WatchOptions::foreground")]
	pub foreground: WatchOptions,

	#[serde(default = "WatchOptions::background")]
	pub background: WatchOptions,

	#[serde(default = "default_task_name")]
	pub background_task_name: String,

	#[serde(default)]
	pub restart_policy: RestartPolicy,

	/// Maximum number of entries kept by the event log
	#[serde(default = "default_log_capacity")]
	pub log_capacity: usize,

	#[serde(skip)]
	path: Option<PathBuf>,
}

fn default_task_name() -> String {
	BACKGROUND_TASK_NAME.to_string()
}

const fn default_log_capacity() -> usize {
	DEFAULT_LOG_CAPACITY
}

impl Default for MonitorConfig {
	fn default() -> Self {
		Self {
			version: CONFIG_VERSION,
			default_radius: AlertRadius::default(),
			foreground: WatchOptions::foreground(),
			background: WatchOptions::background(),
			background_task_name: default_task_name(),
			restart_policy: RestartPolicy::default(),
			log_capacity: DEFAULT_LOG_CAPACITY,
			path: None,
		}
	}
}

impl MonitorConfig {
	/// Load configuration from a data directory, writing the defaults when there is none
	pub fn load_from(data_dir: impl AsRef<Path>) -> Result<Self> {
		let config_path = data_dir.as_ref().join(CONFIG_FILE_NAME);

		if config_path.exists() {
			info!("Loading config from {:?}", config_path);
			let json = fs::read_to_string(&config_path)
				.with_context(|| format!("failed to read {}", config_path.display()))?;
			let mut config: Self = serde_json::from_str(&json)
				.with_context(|| format!("failed to parse {}", config_path.display()))?;
			config.path = Some(config_path);

			if config.version < CONFIG_VERSION {
				info!(
					"Migrating config from v{} to v{}",
					config.version, CONFIG_VERSION
				);
				config.version = CONFIG_VERSION;
				config.save()?;
			}

			Ok(config)
		} else {
			warn!("No config found, creating default at {:?}", config_path);
			let config = Self {
				path: Some(config_path),
				..Self::default()
			};
			config.save()?;
			Ok(config)
		}
	}

	/// Save configuration to the file it was loaded from; a no-op for in-memory configs
	pub fn save(&self) -> Result<()> {
		let Some(config_path) = &self.path else {
			return Ok(());
		};

		if let Some(parent) = config_path.parent() {
			fs::create_dir_all(parent)?;
		}

		let json = serde_json::to_string_pretty(self)?;
		fs::write(config_path, json)?;
		info!("Saved config to {:?}", config_path);
		Ok(())
	}

	#[must_use]
	pub fn path(&self) -> Option<&Path> {
		self.path.as_deref()
	}
}
