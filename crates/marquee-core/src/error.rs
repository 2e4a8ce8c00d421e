//! Error types for Marquee Core

use crate::ads::AdError;
use crate::event::BackendFamily;
use thiserror::Error;

/// Result type alias for session and adapter construction
pub type Result<T> = std::result::Result<T, Error>;

/// Marquee error types
///
/// Playback operations (`play`, `pause`, the setters) never return these:
/// engine failures are turned into `playererror` events and ad failures fall
/// back to content. Errors surface only from construction, backend selection
/// and SDK resolution.
#[derive(Error, Debug)]
pub enum Error {
    // Initialization errors
    #[error("SDK not available after loading: {sdk}")]
    SdkUnavailable { sdk: String },

    #[error("Failed to load script {url}: {reason}")]
    ScriptLoad { url: String, reason: String },

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Completion signal dropped before it settled")]
    SignalDropped,

    // Selection errors
    #[error("No backend can play any of the candidate sources")]
    NoSuitableBackend,

    #[error("No candidate sources given")]
    NoSources,

    // Ad errors
    #[error("Ad error: {0}")]
    Ad(#[from] AdError),

    // Engine errors
    #[error("{family} engine error: {message}")]
    Engine {
        family: BackendFamily,
        message: String,
    },

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an engine runtime error
    pub fn engine(family: BackendFamily, msg: impl Into<String>) -> Self {
        Error::Engine {
            family,
            message: msg.into(),
        }
    }

    /// Returns true if playback can continue by degrading (drop the ad, keep content)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Ad(_) | Error::Engine { .. })
    }

    /// Returns the error code for logs and host telemetry
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::SdkUnavailable { .. } => "SDK_UNAVAILABLE",
            Error::ScriptLoad { .. } => "SCRIPT_LOAD",
            Error::Initialization(_) => "INITIALIZATION",
            Error::SignalDropped => "SIGNAL_DROPPED",
            Error::NoSuitableBackend => "NO_BACKEND",
            Error::NoSources => "NO_SOURCES",
            Error::Ad(_) => "AD_ERROR",
            Error::Engine { .. } => "ENGINE",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Json(_) => "JSON",
            Error::Url(_) => "URL",
            Error::Internal(_) => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        let ad = Error::Ad(AdError::new(1009, "empty VAST response"));
        assert!(ad.is_recoverable());
        assert_eq!(ad.error_code(), "AD_ERROR");

        let engine = Error::engine(BackendFamily::Dash, "segment 404");
        assert!(engine.is_recoverable());
        assert_eq!(engine.to_string(), "DASH engine error: segment 404");

        assert!(!Error::NoSuitableBackend.is_recoverable());
        assert!(!Error::SdkUnavailable { sdk: "ima".into() }.is_recoverable());
    }
}
