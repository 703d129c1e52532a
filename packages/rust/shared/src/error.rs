//! Error types for HomeViz.
//!
//! Library crates use [`HomeVizError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all HomeViz operations.
#[derive(Debug, thiserror::Error)]
pub enum HomeVizError {
    /// Tenant or step configuration error (missing type, unknown handler,
    /// missing prompt capability, bad config file).
    #[error("config error: {message}")]
    Config { message: String },

    /// The external service signalled a rate limit. Retryable.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Raw transport or API failure, not yet attributed to a step.
    #[error("network error: {0}")]
    Network(String),

    /// A fatal external-service failure while running a pipeline step.
    #[error("service error in step '{step}': {message}")]
    Service { step: String, message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Image decoding or encoding error.
    #[error("image error: {0}")]
    Image(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input, invalid tenant data, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The pipeline produced an image identical to its input and the
    /// configured policy treats that as fatal.
    #[error("pipeline output is identical to the input image")]
    IdenticalOutput,

    /// The run was cancelled by its caller.
    #[error("pipeline run cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, HomeVizError>;

impl HomeVizError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a step-attributed service error.
    pub fn service(step: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Service {
            step: step.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error is a transient rate-limit signal.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Attribute an external-call failure to the step it happened in.
    ///
    /// Configuration errors and cancellation pass through unmodified, as do
    /// errors already attributed to a step.
    pub fn in_step(self, step: &str) -> Self {
        match self {
            Self::Network(message) | Self::Image(message) => Self::service(step, message),
            Self::RateLimited(message) => {
                Self::service(step, format!("rate limited: {message}"))
            }
            other => other,
        }
    }
}
