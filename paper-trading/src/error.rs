use paper_data::DataError;
use paper_instrument::InstrumentError;
use paper_integration::error::{CoreError, ErrorKind};
use paper_risk::RiskError;

/// Map a [`paper_execution::ExecutionError`] down to the `{kind, code, message}` shape every
/// Order API call returns (§7). The per-crate error keeps its own `code()`; only the `kind`
/// bucket is decided here, since only the composition root sees every crate's error type at once.
pub fn to_core_error(err: paper_execution::ExecutionError) -> CoreError {
    use paper_execution::ExecutionError;

    let kind = match &err {
        ExecutionError::InstrumentNotFound => ErrorKind::InstrumentNotFound,
        ExecutionError::Risk(risk) => risk_kind(risk),
        ExecutionError::NoReferencePrice => ErrorKind::NoReferencePrice,
        ExecutionError::OrderNotFound(_) => ErrorKind::Validation,
        ExecutionError::AlreadyTerminal(_) => ErrorKind::Validation,
        ExecutionError::DuplicateIdempotencyKey => ErrorKind::IdempotencyReplay,
        ExecutionError::Ledger(_) => ErrorKind::Internal,
    };

    CoreError::new(kind, err.code(), err.to_string())
}

fn risk_kind(err: &RiskError) -> ErrorKind {
    match err {
        RiskError::QuantitySanity
        | RiskError::PartialExitNotAllowed { .. }
        | RiskError::PriceTickValidation => ErrorKind::Validation,
        RiskError::FatFingerPrice => ErrorKind::FatFinger,
        RiskError::MaxNotionalPerOrder => ErrorKind::NotionalCap,
        RiskError::LeverageExceeded
        | RiskError::PositionLimitExceeded
        | RiskError::DerivativeExposureTooHigh
        | RiskError::ConcentrationRisk
        | RiskError::InsufficientMarginBuffer
        | RiskError::ExpiryRiskBlock => ErrorKind::RiskLimit,
    }
}

pub fn instrument_error_to_core(err: InstrumentError) -> CoreError {
    CoreError::new(ErrorKind::InstrumentNotFound, "INSTRUMENT_NOT_FOUND", err.to_string())
}

pub fn data_error_to_core(err: DataError) -> CoreError {
    let kind = match &err {
        DataError::InstrumentNotFound(_) => ErrorKind::InstrumentNotFound,
        DataError::NoReferencePrice => ErrorKind::NoReferencePrice,
        DataError::FeedUnhealthy => ErrorKind::FeedUnhealthy,
        DataError::UpstoxTokenMissing => ErrorKind::UpstreamAuth,
        DataError::UpstreamTimeout => ErrorKind::UpstreamTimeout,
        DataError::MalformedFrame(_) | DataError::Internal(_) => ErrorKind::Internal,
    };
    CoreError::new(kind, err.code(), err.to_string())
}
