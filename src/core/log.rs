use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, filter::Targets, fmt, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

/// Output flavour of the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// One-shot commands: silent unless verbose, pretty, no timestamps.
    Cli,
    /// Long-running service: info by default, with timestamps.
    Daemon,
}

pub fn init_logging(verbose: bool, mode: LogMode) {
    let (level_filter, level) = match (verbose, mode) {
        (true, _) => (LevelFilter::DEBUG, "debug"),
        (false, LogMode::Daemon) => (LevelFilter::INFO, "info"),
        (false, LogMode::Cli) => (LevelFilter::OFF, "off"),
    };
    let app_filter = Targets::new().with_target("kurs", level_filter);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let cli_layer = (mode == LogMode::Cli).then(|| fmt::layer().pretty().without_time());
    let daemon_layer = (mode == LogMode::Daemon).then(fmt::layer);

    tracing_subscriber::registry()
        .with(cli_layer)
        .with(daemon_layer)
        .with(app_filter)
        .with(env_filter)
        .init();
}
