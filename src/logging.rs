//! Logging setup for wireup
//!
//! Structured logging rides on `tracing`. The `logging` feature (on by
//! default) compiles the debug/trace statements into the crate; actually
//! seeing them requires a subscriber, either your own or one installed
//! through this module with the `logging-pretty` or `logging-json` feature.
//!
//! ```rust,ignore
//! use wireup::logging;
//!
//! logging::init_pretty();
//!
//! // or tuned:
//! logging::builder()
//!     .with_level(tracing::Level::TRACE)
//!     .wireup_only()
//!     .json()
//!     .init();
//! ```

use tracing::Level;

/// Output format for the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON lines, for aggregated production logs
    #[default]
    Json,
    /// Colorful multi-line output for development
    Pretty,
    /// Single-line human-readable output
    Compact,
}

/// Fluent subscriber configuration
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    with_file: bool,
    with_line_number: bool,
    with_thread_ids: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Json,
            target: None,
            with_file: false,
            with_line_number: false,
            with_thread_ids: false,
        }
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum level to record
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn trace(mut self) -> Self {
        self.level = Level::TRACE;
        self
    }

    pub fn debug(mut self) -> Self {
        self.level = Level::DEBUG;
        self
    }

    pub fn info(mut self) -> Self {
        self.level = Level::INFO;
        self
    }

    /// Only record events from one target
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Only record wireup's own events
    pub fn wireup_only(self) -> Self {
        self.with_target_filter("wireup")
    }

    pub fn with_file(mut self) -> Self {
        self.with_file = true;
        self
    }

    pub fn with_line_number(mut self) -> Self {
        self.with_line_number = true;
        self
    }

    pub fn with_thread_ids(mut self) -> Self {
        self.with_thread_ids = true;
        self
    }

    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// Install a global subscriber with these settings.
    ///
    /// Needs `logging-pretty` or `logging-json`; without either this is a
    /// no-op so callers never have to feature-gate their own code.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let filter = match self.target {
            Some(target) => EnvFilter::new(format!("{}={}", target, self.level)),
            None => EnvFilter::new(self.level.to_string()),
        };

        let layer = fmt::layer()
            .with_file(self.with_file)
            .with_line_number(self.with_line_number)
            .with_thread_ids(self.with_thread_ids)
            .with_target(true);

        match self.format {
            LogFormat::Json => {
                #[cfg(feature = "logging-json")]
                {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(layer.json())
                        .init();
                }
                #[cfg(not(feature = "logging-json"))]
                {
                    tracing_subscriber::registry().with(filter).with(layer).init();
                }
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer.pretty())
                    .init();
            }
            LogFormat::Compact => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer.compact())
                    .init();
            }
        }
    }

    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) {
        // No subscriber feature enabled
    }
}

pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Install a subscriber with defaults: JSON when `logging-json` is enabled,
/// pretty otherwise.
pub fn init() {
    #[cfg(feature = "logging-json")]
    {
        init_json();
    }
    #[cfg(not(feature = "logging-json"))]
    {
        init_pretty();
    }
}

/// JSON lines at DEBUG
pub fn init_json() {
    builder().json().debug().init();
}

/// Colorful development output at DEBUG
pub fn init_pretty() {
    builder().pretty().debug().init();
}

/// Pretty output showing only wireup's own events
pub fn init_wireup_only() {
    builder().pretty().wireup_only().debug().init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let builder = LoggingBuilder::default();
        assert_eq!(builder.level, Level::DEBUG);
        assert_eq!(builder.format, LogFormat::Json);
        assert!(builder.target.is_none());
    }

    #[test]
    fn builder_chain() {
        let builder = LoggingBuilder::new()
            .trace()
            .pretty()
            .with_file()
            .with_line_number()
            .wireup_only();

        assert_eq!(builder.level, Level::TRACE);
        assert_eq!(builder.format, LogFormat::Pretty);
        assert!(builder.with_file);
        assert!(builder.with_line_number);
        assert_eq!(builder.target, Some("wireup"));
    }
}
