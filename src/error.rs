//! Error kinds shared by every layer of the forecast pipeline
//!
//! Fetchers, sources and managers all speak `ApiError`. The variant is the kind
//! of failure, not the source it came from, so callers can react to
//! authentication and rate-limit problems without knowing which API raised them.

use thiserror::Error;

/// Errors that can occur while fetching or assembling forecast data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Transport-level I/O failure (connection, timeout, unexpected status)
    #[error("Network error: {0}")]
    Network(String),

    /// Credentials were rejected by the remote service
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The remote service refused the request because of its quota
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Payload was malformed or failed validation
    #[error("Invalid data: {0}")]
    Data(String),

    /// Anything else
    #[error("{0}")]
    Generic(String),
}

impl ApiError {
    /// Maps a non-success HTTP status to an error kind
    ///
    /// 401/403 become `Authentication`, 429 becomes `RateLimit`, everything
    /// else is treated as a `Network` failure.
    pub fn from_status(status: u16, context: &str) -> Self {
        match status {
            401 | 403 => ApiError::Authentication(format!("{} (HTTP {})", context, status)),
            429 => ApiError::RateLimit(format!("{} (HTTP {})", context, status)),
            _ => ApiError::Network(format!("{} returned HTTP {}", context, status)),
        }
    }

    /// Whether this error must escape a fetcher instead of being swallowed
    pub fn is_auth_or_rate_limit(&self) -> bool {
        matches!(self, ApiError::Authentication(_) | ApiError::RateLimit(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Data(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Data(err.to_string())
    }
}

/// A forecast domain handled by the combined coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Weather,
    Astronomy,
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Domain::Weather => write!(f, "weather"),
            Domain::Astronomy => write!(f, "astronomy"),
        }
    }
}

/// Errors from the combined coordinator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CombinedError {
    /// Neither domain produced any daily records
    #[error("No forecast data available ({}): {}", join_domains(.unavailable), .messages.join("; "))]
    NoData {
        unavailable: Vec<Domain>,
        messages: Vec<String>,
    },
}

fn join_domains(domains: &[Domain]) -> String {
    if domains.is_empty() {
        return "no sources configured".to_string();
    }
    domains
        .iter()
        .map(|d| format!("{} unavailable", d))
        .collect::<Vec<_>>()
        .join(", ")
}
