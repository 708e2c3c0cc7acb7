use log::LevelFilter;

/// Returns the maximum log level, determined at compile time.
pub fn max_level() -> LevelFilter {
	let log_level: Option<&'static str> = option_env!("COALESCED_LOG_LEVEL_FILTER");
	match log_level {
		Some("Error") => LevelFilter::Error,
		Some("Debug") => LevelFilter::Debug,
		Some("Off") => LevelFilter::Off,
		Some("Trace") => LevelFilter::Trace,
		Some("Warn") => LevelFilter::Warn,
		_ => LevelFilter::Info,
	}
}

#[cfg(feature = "std")]
mod stderr {
	use log::{Metadata, Record};

	/// Prints records to stderr.
	pub(super) struct StderrLogger;

	impl log::Log for StderrLogger {
		fn enabled(&self, _: &Metadata<'_>) -> bool {
			true
		}

		fn flush(&self) {
			// nothing to do
		}

		fn log(&self, record: &Record<'_>) {
			if self.enabled(record.metadata()) {
				std::eprintln!("[{}][{}] {}", record.level(), record.target(), record.args());
			}
		}
	}
}

/// Installs the stderr logger.
///
/// Fails if another logger has already been installed.
#[cfg(feature = "std")]
pub fn init() -> Result<(), log::SetLoggerError> {
	log::set_logger(&stderr::StderrLogger)?;
	log::set_max_level(max_level());
	Ok(())
}
