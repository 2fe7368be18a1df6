//! Logger initialization.

use tracing::level_filters::LevelFilter as Level;
use tracing_subscriber::filter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;

/// Represents the role of the logger.
#[derive(Debug)]
pub enum LogRole {
    /// The node agent embedding the coordinator.
    Node,
    /// For testing purpose.
    #[cfg(test)]
    Test,
}

impl LogRole {
    /// Returns the string representation of the log role.
    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match *self {
            LogRole::Node => "node",
            #[cfg(test)]
            LogRole::Test => "test",
        }
    }
}

/// Initialize the logger with the default settings.
/// The log file is located at `./volume_expander_<role>.log`.
#[allow(clippy::let_underscore_must_use)]
#[allow(clippy::needless_pass_by_value)] // Just pass a temporary value is fine.
#[inline]
pub fn init_logger(role: LogRole, level: Level) {
    let filter = filter::Targets::new()
        .with_target("volume_expander::store", Level::INFO)
        .with_target("volume_expander::coordinator", level)
        .with_target("", level);

    let log_path = format!("./volume_expander_{}.log", role.as_str());
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path)
        .unwrap_or_else(|err| panic!("Failed to open log file ,err {err}"));

    let layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_file(false)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_filter(filter);

    let subscriber = tracing_subscriber::Registry::default().with(layer);

    if cfg!(test) {
        let _: Result<(), tracing::subscriber::SetGlobalDefaultError> =
            tracing::subscriber::set_global_default(subscriber);
    } else {
        tracing::subscriber::set_global_default(subscriber)
            .unwrap_or_else(|error| panic!("Could not set logger ,err {error}"));
    }
}
