use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Crates whose events follow `--log-level`. Everything else is capped at
/// warn so runtime internals do not drown out connection events.
const TINYRPC_TARGETS: [&str; 6] = [
    "tinyrpc",
    "tinyrpc_transport",
    "tinyrpc_frame",
    "tinyrpc_codec",
    "tinyrpc_server",
    "tinyrpc_client",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }

    /// Per-frame events come from several modules; name them when they show.
    fn shows_targets(self) -> bool {
        matches!(self, LogLevel::Debug | LogLevel::Trace)
    }
}

fn log_filter(level: LogLevel) -> Targets {
    let level = level.as_filter();
    Targets::new()
        .with_default(level.min(LevelFilter::WARN))
        .with_targets(TINYRPC_TARGETS.iter().map(|target| (*target, level)))
}

/// Install the global subscriber on stderr.
///
/// Connections are pinned to named `tinyrpc-worker-N` threads, so thread
/// names are always included to tell event loops apart.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(level.shows_targets())
        .with_thread_names(true);
    let registry = tracing_subscriber::registry().with(log_filter(level));

    let _ = match format {
        LogFormat::Text => registry.with(layer).try_init(),
        LogFormat::Json => registry.with(layer.json()).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn levels_map_to_filters() {
        assert_eq!(LogLevel::Error.as_filter(), LevelFilter::ERROR);
        assert_eq!(LogLevel::Trace.as_filter(), LevelFilter::TRACE);
        assert!(LogLevel::Debug.as_filter() > LogLevel::Info.as_filter());
    }

    #[test]
    fn tinyrpc_crates_follow_the_requested_level() {
        let filter = log_filter(LogLevel::Debug);
        assert!(filter.would_enable("tinyrpc_server::connection", &Level::DEBUG));
        assert!(filter.would_enable("tinyrpc_client::client", &Level::DEBUG));
        assert!(!filter.would_enable("tinyrpc_server::connection", &Level::TRACE));
    }

    #[test]
    fn other_crates_are_capped_at_warn() {
        let filter = log_filter(LogLevel::Trace);
        assert!(filter.would_enable("tokio::runtime", &Level::WARN));
        assert!(!filter.would_enable("tokio::runtime", &Level::DEBUG));

        let quiet = log_filter(LogLevel::Error);
        assert!(!quiet.would_enable("tokio::runtime", &Level::WARN));
    }

    #[test]
    fn targets_only_shown_when_verbose() {
        assert!(!LogLevel::Info.shows_targets());
        assert!(LogLevel::Debug.shows_targets());
        assert!(LogLevel::Trace.shows_targets());
    }
}
