//! Logging configuration for the container
//!
//! Every event the container emits uses the [`TARGET`] target.
//! Registration, eviction and disposal log at `debug`; resolution hot paths
//! log at `trace`. This module wires up a `tracing-subscriber` for them.
//!
//! # Features
//!
//! - `logging` - Emit events (default)
//! - `logging-json` - Use JSON structured output (recommended for production)
//! - `logging-pretty` - Use colorful pretty output (recommended for development)
//!
//! # Example
//!
//! ```rust,ignore
//! use service_container::logging;
//!
//! // JSON if logging-json is enabled, pretty otherwise
//! logging::init();
//!
//! // Or use builder for custom configuration
//! logging::builder()
//!     .trace()
//!     .container_only()
//!     .compact()
//!     .with_thread_ids()
//!     .init();
//! ```

use tracing::Level;

/// Target used by every event the container emits
pub const TARGET: &str = "service_container";

/// Logging format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON structured logging (production default)
    #[default]
    Json,
    /// Pretty colorful output (development)
    Pretty,
    /// Compact single-line output
    Compact,
}

/// Builder for logging configuration
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    with_file: bool,
    with_line_number: bool,
    with_thread_ids: bool,
    with_thread_names: bool,
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
            with_thread_names: false,
        }
    }
}

impl LoggingBuilder {
    /// Create a new logging builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum log level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set log level to TRACE (shows every resolution step)
    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    /// Set log level to DEBUG
    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    /// Set log level to INFO
    pub fn info(self) -> Self {
        self.with_level(Level::INFO)
    }

    /// Filter to only show logs from a specific target
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Only show container logs
    pub fn container_only(self) -> Self {
        self.with_target_filter(TARGET)
    }

    /// Include file names in log output
    pub fn with_file(mut self) -> Self {
        self.with_file = true;
        self
    }

    /// Include line numbers in log output
    pub fn with_line_number(mut self) -> Self {
        self.with_line_number = true;
        self
    }

    /// Include thread IDs in log output
    pub fn with_thread_ids(mut self) -> Self {
        self.with_thread_ids = true;
        self
    }

    /// Include thread names in log output
    pub fn with_thread_names(mut self) -> Self {
        self.with_thread_names = true;
        self
    }

    /// Use JSON structured logging format
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    /// Use pretty colorful logging format
    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    /// Use compact single-line logging format
    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// Format that will actually be used; JSON falls back to pretty
    /// when the `logging-json` feature is off.
    pub fn effective_format(&self) -> LogFormat {
        match self.format {
            LogFormat::Json if cfg!(not(feature = "logging-json")) => LogFormat::Pretty,
            format => format,
        }
    }

    /// Directive string handed to `EnvFilter`
    fn directive(&self) -> String {
        match self.target {
            Some(target) => format!("{target}={}", self.level),
            None => self.level.to_string(),
        }
    }

    /// Install the configured subscriber as the global default.
    ///
    /// Fails if a global subscriber is already set.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn try_init(self) -> Result<(), tracing_subscriber::util::TryInitError> {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let format = self.effective_format();

        macro_rules! configured {
            ($layer:expr) => {
                $layer
                    .with_file(self.with_file)
                    .with_line_number(self.with_line_number)
                    .with_thread_ids(self.with_thread_ids)
                    .with_thread_names(self.with_thread_names)
                    .with_target(true)
            };
        }

        let subscriber = tracing_subscriber::registry()
            .with(EnvFilter::new(self.directive()))
            .with((format == LogFormat::Pretty).then(|| configured!(fmt::layer().pretty())))
            .with((format == LogFormat::Compact).then(|| configured!(fmt::layer().compact())));

        #[cfg(feature = "logging-json")]
        let subscriber =
            subscriber.with((format == LogFormat::Json).then(|| configured!(fmt::layer().json())));

        subscriber.try_init()
    }

    /// Install the configured subscriber, keeping any subscriber that is
    /// already installed.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Initialize (no-op when subscriber features not available)
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) {}
}

/// Create a new logging builder
pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Initialize logging with default settings
///
/// Uses JSON format if `logging-json` feature is enabled,
/// otherwise pretty format.
pub fn init() {
    builder().debug().init();
}

/// Initialize pretty colorful logging
///
/// # Example output
/// ```text
///   2024-01-01T00:00:00.000Z DEBUG service_container: Registered service
///     service: "db", lifecycle: "singleton", dependencies: 1
/// ```
pub fn init_pretty() {
    builder().pretty().debug().init();
}

/// Initialize JSON structured logging
///
/// # Example output
/// ```json
/// {"timestamp":"2024-01-01T00:00:00.000Z","level":"DEBUG","target":"service_container","fields":{"message":"Registered service","service":"db","lifecycle":"singleton"}}
/// ```
pub fn init_json() {
    builder().json().debug().init();
}

/// Initialize logging for the container only (filters other crates)
pub fn init_container_only() {
    builder().container_only().debug().init();
}
