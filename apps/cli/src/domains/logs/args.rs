use arrival_core::LogLevel;
use clap::{Args, ValueEnum};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
	Info,
	Success,
	Warning,
	Error,
	Debug,
}

impl From<LogLevelArg> for LogLevel {
	fn from(level: LogLevelArg) -> Self {
		match level {
			LogLevelArg::Info => Self::Info,
			LogLevelArg::Success => Self::Success,
			LogLevelArg::Warning => Self::Warning,
			LogLevelArg::Error => Self::Error,
			LogLevelArg::Debug => Self::Debug,
		}
	}
}

#[derive(Args, Debug)]
pub struct LogsShowArgs {
	/// Number of entries to show, newest first
	#[arg(long, short = 'n', default_value_t = 50)]
	pub limit: usize,

	/// Only show entries of this level
	#[arg(long, value_enum)]
	pub level: Option<LogLevelArg>,
}
