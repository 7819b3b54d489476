use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// Ledger account types (§3 `AccountType`). Every [`crate::money::Money`] movement is a debit on
/// one of these and a credit on another, never a free-standing adjustment.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, Serialize, Deserialize,
)]
pub enum AccountType {
    Cash,
    MarginBlocked,
    UnrealizedPnl,
    RealizedPnl,
    Fees,
}

/// Opaque user identifier. Kept as a newtype (rather than a bare `String`) so ledger, wallet and
/// execution APIs cannot be called with a mismatched identifier by accident.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, From, Serialize, Deserialize,
)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
