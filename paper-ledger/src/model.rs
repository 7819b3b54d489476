use chrono::{DateTime, Utc};
use derive_more::{Constructor, Display, From};
use paper_integration::accounts::{AccountType, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Identifier of a [`LedgerEntry`], generated via [`paper_integration::id::random_id`].
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, From, Serialize, Deserialize,
)]
pub struct LedgerEntryId(pub SmolStr);

impl LedgerEntryId {
    pub fn random() -> Self {
        Self(paper_integration::id::random_id())
    }
}

/// What a [`LedgerEntry`] is in reference to - drives the idempotency key convention used
/// throughout Execution Service (§4.11): `MARGIN-<orderId>`, `UNBLOCK-<orderId>`,
/// `PNL-<tradeId>`, `FEE-<tradeId>`, or the bootstrap `ADJUSTMENT`.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, Serialize, Deserialize,
)]
pub enum ReferenceType {
    Margin,
    Unblock,
    Pnl,
    Fee,
    Adjustment,
}

/// A single append-only double-entry journal row (§4.7, §3 LedgerEntry). The sum of debits
/// always equals the sum of credits across the whole journal because every entry is itself a
/// single debit/credit pair of equal magnitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Constructor)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub user_id: UserId,
    pub debit_account: AccountType,
    pub credit_account: AccountType,
    pub amount: Decimal,
    pub reference_type: ReferenceType,
    pub reference_id: SmolStr,
    pub idempotency_key: SmolStr,
    pub created_at: DateTime<Utc>,
}
