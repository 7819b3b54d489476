use thiserror::Error;

/// Market Data Pipeline error taxonomy (§7). `code()` returns the stable wire code.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum DataError {
    #[error("instrument not found: {0}")]
    InstrumentNotFound(String),

    #[error("no reference price available for instrument")]
    NoReferencePrice,

    #[error("feed is unhealthy")]
    FeedUnhealthy,

    #[error("broker token missing or expired")]
    UpstoxTokenMissing,

    #[error("upstream request timed out")]
    UpstreamTimeout,

    #[error("malformed broker frame: {0}")]
    MalformedFrame(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DataError {
    pub fn code(&self) -> &'static str {
        match self {
            DataError::InstrumentNotFound(_) => "INSTRUMENT_NOT_FOUND",
            DataError::NoReferencePrice => "NO_REFERENCE_PRICE",
            DataError::FeedUnhealthy => "FEED_UNHEALTHY",
            DataError::UpstoxTokenMissing => "UPSTOX_TOKEN_MISSING",
            DataError::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            DataError::MalformedFrame(_) => "VALIDATION",
            DataError::Internal(_) => "INTERNAL",
        }
    }
}
