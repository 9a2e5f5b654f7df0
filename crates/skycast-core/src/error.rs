//! Error kinds surfaced by forecast retrieval.
//!
//! Every failure a caller can see maps to one [`ErrorKind`]. The kind is the
//! stable contract; the human-readable string is rendered by a
//! [`MessageCatalog`], so raw upstream text never reaches an end user.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a retrieval failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    InvalidCoordinates,
    NotFound,
    ServiceUnavailable,
    Timeout,
    InvalidResponse,
    InvalidRequest,
    FetchFailed,
    RetrievalFailed,
}

impl ErrorKind {
    /// Stable identifier, suitable for logs and message lookups.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InvalidCoordinates => "invalid_coordinates",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::FetchFailed => "fetch_failed",
            ErrorKind::RetrievalFailed => "retrieval_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which upstream a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Upstream {
    Geocoding,
    Timezone,
    Weather,
}

impl Upstream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Upstream::Geocoding => "geocoding",
            Upstream::Timezone => "timezone",
            Upstream::Weather => "weather",
        }
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from forecast retrieval.
///
/// The `detail` strings are diagnostic only. Use [`ForecastError::user_message`]
/// for anything shown to a person.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid {axis}: {value}. Must be between {min} and {max}")]
    InvalidCoordinates {
        axis: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("No {upstream} match for '{query}'")]
    NotFound { upstream: Upstream, query: String },

    #[error("{0} service unavailable: circuit open")]
    ServiceUnavailable(Upstream),

    #[error("{upstream} request timed out: {detail}")]
    Timeout { upstream: Upstream, detail: String },

    #[error("{upstream} returned an invalid response: {detail}")]
    InvalidResponse { upstream: Upstream, detail: String },

    #[error("{upstream} rejected the request with status {status}")]
    InvalidRequest { upstream: Upstream, status: u16 },

    #[error("{upstream} fetch failed: {detail}")]
    FetchFailed { upstream: Upstream, detail: String },

    #[error("Forecast retrieval failed: {0}")]
    RetrievalFailed(String),

    /// Programmer-level failure (client construction, serialization).
    /// Converted to `RetrievalFailed` at the orchestrator boundary.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ForecastError {
    /// The stable kind of this error.
    ///
    /// `Internal` reports as `RetrievalFailed`; callers never see an
    /// unclassified failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForecastError::InvalidInput(_) => ErrorKind::InvalidInput,
            ForecastError::InvalidCoordinates { .. } => ErrorKind::InvalidCoordinates,
            ForecastError::NotFound { .. } => ErrorKind::NotFound,
            ForecastError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            ForecastError::Timeout { .. } => ErrorKind::Timeout,
            ForecastError::InvalidResponse { .. } => ErrorKind::InvalidResponse,
            ForecastError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            ForecastError::FetchFailed { .. } => ErrorKind::FetchFailed,
            ForecastError::RetrievalFailed(_) | ForecastError::Internal(_) => {
                ErrorKind::RetrievalFailed
            }
        }
    }

    /// The upstream this error originated from, if any.
    pub fn upstream(&self) -> Option<Upstream> {
        match self {
            ForecastError::NotFound { upstream, .. }
            | ForecastError::Timeout { upstream, .. }
            | ForecastError::InvalidResponse { upstream, .. }
            | ForecastError::InvalidRequest { upstream, .. }
            | ForecastError::FetchFailed { upstream, .. } => Some(*upstream),
            ForecastError::ServiceUnavailable(upstream) => Some(*upstream),
            _ => None,
        }
    }

    /// Short, stable message from the default English catalog.
    pub fn user_message(&self) -> String {
        EnglishCatalog.message(self.kind(), self.upstream())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        ForecastError::InvalidInput(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ForecastError::Internal(message.into())
    }
}

/// Renders error kinds as human-readable text.
///
/// Implement this to plug in a translation layer.
pub trait MessageCatalog: Send + Sync {
    fn message(&self, kind: ErrorKind, upstream: Option<Upstream>) -> String;
}

/// Default English messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishCatalog;

impl MessageCatalog for EnglishCatalog {
    fn message(&self, kind: ErrorKind, upstream: Option<Upstream>) -> String {
        let text = match (kind, upstream) {
            (ErrorKind::InvalidInput, _) => "Please enter an address.",
            (ErrorKind::InvalidCoordinates, _) => "The location's coordinates are invalid.",
            (ErrorKind::NotFound, _) => {
                "We couldn't find that address. Please check it and try again."
            }
            (ErrorKind::ServiceUnavailable, Some(Upstream::Geocoding)) => {
                "Address lookup is temporarily unavailable. Please try again shortly."
            }
            (ErrorKind::ServiceUnavailable, _) => {
                "Weather service is temporarily unavailable. Please try again shortly."
            }
            (ErrorKind::Timeout, Some(Upstream::Geocoding)) => {
                "Address lookup timed out. Please try again."
            }
            (ErrorKind::Timeout, _) => {
                "We're having trouble getting weather data right now. Please try again later."
            }
            (ErrorKind::InvalidResponse, _) => {
                "Received invalid weather data. Unable to process weather data."
            }
            (ErrorKind::InvalidRequest, _) => "The weather request was invalid.",
            (ErrorKind::FetchFailed, Some(Upstream::Geocoding)) => {
                "We couldn't look up that address. Please try again later."
            }
            (ErrorKind::FetchFailed, _) => {
                "We're having trouble getting weather data right now. Please try again later."
            }
            (ErrorKind::RetrievalFailed, _) => {
                "Something went wrong retrieving the forecast. Please try again."
            }
        };
        text.to_string()
    }
}
