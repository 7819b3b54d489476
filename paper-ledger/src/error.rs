use paper_integration::accounts::UserId;
use thiserror::Error;

/// Errors raised by the [`crate::ledger::Ledger`] and [`crate::wallet::WalletService`] (§4.7,
/// §4.8). `IdempotentReplay` is explicitly not an error condition to callers - it is returned so
/// the caller can distinguish "nothing new happened" from "here is a fresh entry" while still
/// getting a `Result` they must handle.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum LedgerError {
    #[error("ledger entry amount must be > 0, got {0}")]
    NonPositiveAmount(String),

    #[error("debit and credit account must differ")]
    SameAccount,

    #[error("no wallet/position state exists yet for user {0}")]
    UnknownUser(UserId),
}
