//! Subscriber setup shared by the FitKit binaries and tests.

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::FitKitError;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-field human output.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// Newline-delimited JSON.
    Json,
}

/// What to log and how.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level used when neither `filter` nor `RUST_LOG` is set.
    pub level: Level,
    pub format: LogFormat,
    /// Add `file:line` to each event.
    pub location: bool,
    pub thread_names: bool,
    /// Log span open/close.
    pub span_events: bool,
    /// Directive string, e.g. `"fitkit_sw=debug,reqwest=warn"`.
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            location: false,
            thread_names: false,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn debug() -> Self {
        Self {
            level: Level::DEBUG,
            location: true,
            span_events: true,
            ..Self::default()
        }
    }

    pub fn trace() -> Self {
        Self {
            level: Level::TRACE,
            thread_names: true,
            ..Self::debug()
        }
    }

    /// JSON at INFO, for log shippers.
    pub fn production() -> Self {
        Self::default().with_format(LogFormat::Json)
    }

    /// Map a `-v` count: none is WARN, then INFO, DEBUG, TRACE.
    pub fn from_verbosity(verbosity: u8) -> Self {
        match verbosity {
            0 => Self {
                level: Level::WARN,
                ..Self::default()
            }
            .with_format(LogFormat::Compact),
            1 => Self::default().with_format(LogFormat::Compact),
            2 => Self::debug(),
            _ => Self::trace(),
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Explicit filter, then `RUST_LOG`, then `level`. A bad directive
    /// string falls through to `level`.
    fn env_filter(&self) -> EnvFilter {
        let parsed = match self.filter.as_deref() {
            Some(directives) => EnvFilter::try_new(directives).ok(),
            None => EnvFilter::try_from_default_env().ok(),
        };
        parsed.unwrap_or_else(|| EnvFilter::new(self.level.as_str().to_ascii_lowercase()))
    }

    fn fmt_layer(&self) -> BoxedLayer {
        let spans = if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let base = fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(spans)
            .with_file(self.location)
            .with_line_number(self.location)
            .with_thread_names(self.thread_names);

        match self.format {
            LogFormat::Pretty => base.boxed(),
            LogFormat::Compact => base.compact().boxed(),
            LogFormat::Json => base.json().with_timer(ChronoUtc::rfc_3339()).boxed(),
        }
    }
}

/// Install the global subscriber. Events go to stderr so stdout stays free
/// for command output.
///
/// Errors if a global subscriber is already set.
pub fn init_logging(config: &LogConfig) -> Result<(), FitKitError> {
    tracing_subscriber::registry()
        .with(config.fmt_layer())
        .with(config.env_filter())
        .try_init()
        .map_err(|e| FitKitError::config_with_source("installing log subscriber", e))
}
