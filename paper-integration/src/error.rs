use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error taxonomy shared across the paper trading core (§7 of the specification).
///
/// Kinds, not type names: every crate-local error ultimately maps down to one of these so the
/// Order API surface can return a structured `{code, message}` without leaking internal enum
/// variants to collaborators (HTTP layer, SSE transport).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    FatFinger,
    NotionalCap,
    RiskLimit,
    InsufficientFunds,
    InstrumentNotFound,
    NoReferencePrice,
    FeedUnhealthy,
    UpstreamAuth,
    UpstreamTimeout,
    IdempotencyReplay,
    Internal,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::FatFinger => "FAT_FINGER",
            ErrorKind::NotionalCap => "NOTIONAL_CAP",
            ErrorKind::RiskLimit => "RISK_LIMIT",
            ErrorKind::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorKind::InstrumentNotFound => "INSTRUMENT_NOT_FOUND",
            ErrorKind::NoReferencePrice => "NO_REFERENCE_PRICE",
            ErrorKind::FeedUnhealthy => "FEED_UNHEALTHY",
            ErrorKind::UpstreamAuth => "UPSTREAM_AUTH",
            ErrorKind::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            ErrorKind::IdempotencyReplay => "IDEMPOTENCY_REPLAY",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

/// Structured failure returned across the Order API boundary (§7: "the core returns a
/// structured `{code, message}`"). HTTP status mapping is a collaborator detail and lives
/// outside this crate.
#[derive(Debug, Clone, Error, Eq, PartialEq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, code, message)
    }

    pub fn risk(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RiskLimit, code, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, "INTERNAL", message)
    }
}
