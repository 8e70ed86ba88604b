use clap::builder::{
	Styles,
	styling::{AnsiColor, Effects},
};
use tracing_subscriber::EnvFilter;

use ground_domain::TaskMode;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.literal(AnsiColor::Yellow.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Magenta.on_default())
		.error(AnsiColor::Red.on_default() | Effects::BOLD)
}

/// Installs the global fmt subscriber. An unparsable directive falls back to `info`.
pub fn init_tracing(log_level: &str) {
	let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	// A second install in the same process is a no-op.
	let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Clap value parser for `--mode`.
pub fn parse_task_mode(raw: &str) -> Result<TaskMode, String> {
	TaskMode::parse(raw).ok_or_else(|| {
		format!("Unknown task mode {raw:?}; expected one of build, debug, explain or refactor.")
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn task_modes_parse_case_insensitively() {
		assert_eq!(parse_task_mode("Explain"), Ok(TaskMode::Explain));

		let err = parse_task_mode("ship").expect_err("Unknown modes must be rejected.");

		assert!(err.contains("\"ship\""), "Unexpected error: {err}");
	}
}
