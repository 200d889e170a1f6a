// logging.rs — tracing subscriber setup for the arcc binary
//
// The library only emits `tracing` events; installing a subscriber is the
// binary's job. Filters start from `RUST_LOG` and add the `--log-level`
// directive. Output always goes to stderr so stdout stays clean for
// `--emit`.
//
// Preconditions: called at most once per process.
// Postconditions: a global subscriber is installed.
// Failure modes: none; a second call is ignored.
// Side effects: sets the global default subscriber.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

pub fn init_logging(level: LogLevel, json: bool) {
    let filter = EnvFilter::from_default_env().add_directive(level.as_tracing_level().into());
    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()
    };
    if result.is_err() {
        tracing::debug!("subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_map_to_tracing() {
        assert_eq!(LogLevel::Warn.as_tracing_level(), tracing::Level::WARN);
        assert_eq!(LogLevel::Trace.as_tracing_level(), tracing::Level::TRACE);
    }

    #[test]
    fn second_init_is_ignored() {
        init_logging(LogLevel::Error, false);
        init_logging(LogLevel::Error, true);
    }
}
