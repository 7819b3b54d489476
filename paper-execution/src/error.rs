use paper_data::DataError;
use paper_instrument::InstrumentError;
use paper_ledger::LedgerError;
use paper_risk::RiskError;
use thiserror::Error;

/// Errors raised while driving an order through acceptance, margin blocking, matching and
/// settlement (§4.11). `code()` returns the stable wire code; risk/acceptance rejections forward
/// the underlying [`RiskError`]'s code unchanged rather than wrapping it in a new one.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ExecutionError {
    #[error("instrument not found")]
    InstrumentNotFound,

    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error("no reference price available to accept this order")]
    NoReferencePrice,

    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("order {0} is already in a terminal state")]
    AlreadyTerminal(String),

    #[error("duplicate idempotency key for user")]
    DuplicateIdempotencyKey,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ExecutionError {
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::InstrumentNotFound => "INSTRUMENT_NOT_FOUND",
            ExecutionError::Risk(err) => err.code(),
            ExecutionError::NoReferencePrice => "NO_REFERENCE_PRICE",
            ExecutionError::OrderNotFound(_) => "ORDER_NOT_FOUND",
            ExecutionError::AlreadyTerminal(_) => "ALREADY_TERMINAL",
            ExecutionError::DuplicateIdempotencyKey => "IDEMPOTENCY_REPLAY",
            ExecutionError::Ledger(_) => "INTERNAL",
        }
    }
}

impl From<InstrumentError> for ExecutionError {
    fn from(_: InstrumentError) -> Self {
        ExecutionError::InstrumentNotFound
    }
}

impl From<DataError> for ExecutionError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::NoReferencePrice => ExecutionError::NoReferencePrice,
            DataError::InstrumentNotFound(_) => ExecutionError::InstrumentNotFound,
            _ => ExecutionError::NoReferencePrice,
        }
    }
}
