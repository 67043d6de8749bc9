//! # FitKit Common
//!
//! Error type, logging setup and timeout helper shared by the FitKit crates
//! and the `sw-probe` tool.

use std::time::Duration;
use thiserror::Error;

pub mod logging;
pub mod timeout;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use timeout::with_timeout;

type Source = Box<dyn std::error::Error + Send + Sync>;

/// Error surfaced by FitKit binaries.
#[derive(Error, Debug)]
pub enum FitKitError {
    /// Install, activate or fetch through the worker failed.
    #[error("Worker error: {message}")]
    Worker {
        message: String,
        #[source]
        source: Option<Source>,
    },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Source>,
    },

    /// Bad or unreadable configuration.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Source>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Something that should not happen; carries a backtrace.
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        backtrace: Option<backtrace::Backtrace>,
    },
}

/// `fn name(message)` and `fn name_with_source(message, source)` for each
/// message-plus-source variant.
macro_rules! sourced_constructors {
    ($($variant:ident => $plain:ident, $sourced:ident;)*) => {
        impl FitKitError {
            $(
                pub fn $plain(message: impl Into<String>) -> Self {
                    FitKitError::$variant {
                        message: message.into(),
                        source: None,
                    }
                }

                pub fn $sourced<E>(message: impl Into<String>, source: E) -> Self
                where
                    E: std::error::Error + Send + Sync + 'static,
                {
                    FitKitError::$variant {
                        message: message.into(),
                        source: Some(Box::new(source)),
                    }
                }
            )*
        }
    };
}

sourced_constructors! {
    Worker => worker, worker_with_source;
    Network => network, network_with_source;
    Config => config, config_with_source;
}

impl FitKitError {
    /// Internal error with a captured backtrace.
    pub fn internal(message: impl Into<String>) -> Self {
        FitKitError::Internal {
            message: message.into(),
            backtrace: Some(backtrace::Backtrace::new()),
        }
    }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FitKitError::Network { .. } | FitKitError::Timeout(_) | FitKitError::Io(_))
    }

    /// Short category name for log fields.
    pub fn category(&self) -> &'static str {
        use FitKitError::*;
        match self {
            Worker { .. } => "worker",
            Network { .. } => "network",
            Config { .. } => "config",
            Io(_) => "io",
            Json(_) => "json",
            Timeout(_) => "timeout",
            NotFound(_) => "not_found",
            InvalidArgument(_) => "invalid_argument",
            Internal { .. } => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, FitKitError>;

pub trait ResultExt<T> {
    /// Wrap any error as an internal error prefixed with `message`.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| FitKitError::internal(format!("{}: {}", message.into(), e)))
    }
}

pub trait OptionExt<T> {
    /// `None` becomes `NotFound(resource)`.
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| FitKitError::NotFound(resource.into()))
    }
}
