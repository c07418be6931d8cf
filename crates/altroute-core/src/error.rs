use thiserror::Error;

use crate::FailureCode;

/// Result type alias for alternative routing operations
pub type Result<T> = std::result::Result<T, AltRouteError>;

/// Errors that can occur while routing or intercepting requests
#[derive(Error, Debug)]
pub enum AltRouteError {
    /// A URL could not be parsed or rebuilt
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A request arrived without any URL
    #[error("request has no URL")]
    MissingUrl,

    /// A URL parsed but carries no host
    #[error("URL has no host: {0}")]
    MissingHost(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Request timed out
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// Connection failed
    #[error("connection failed: {0}")]
    Connection(String),

    /// JSON parsing/serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Reading a configuration file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl AltRouteError {
    /// Returns true if the error is a transport condition worth retrying
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connection(_))
    }

    /// Maps the error onto the network failure code used for routing decisions
    #[must_use]
    pub const fn failure_code(&self) -> Option<FailureCode> {
        match self {
            Self::Timeout(_) => Some(FailureCode::TimedOut),
            Self::Connection(_) => Some(FailureCode::CannotConnectToHost),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let err = AltRouteError::InvalidUrl("coreios://".to_string());
        assert!(err.to_string().contains("coreios://"));

        let err = AltRouteError::Timeout(5);
        assert_eq!(err.to_string(), "request timed out after 5 seconds");
    }

    #[test]
    fn transport_errors_map_to_solvable_codes() {
        let err = AltRouteError::Connection("refused".into());
        assert!(err.is_retryable());
        assert_eq!(err.failure_code(), Some(FailureCode::CannotConnectToHost));

        let err = AltRouteError::Config("bad".into());
        assert!(!err.is_retryable());
        assert_eq!(err.failure_code(), None);
    }

    #[test]
    fn io_errors_convert() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: AltRouteError = io_err.into();
        assert!(matches!(err, AltRouteError::Io(_)));
    }
}
