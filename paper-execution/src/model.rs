use chrono::{DateTime, Utc};
use derive_more::{Display, From};
use paper_instrument::InstrumentKey;
use paper_integration::{
    accounts::UserId,
    order::{ExitReason, OrderSide, OrderStatus, OrderType},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Identifier of an [`Order`], generated via [`paper_integration::id::random_id`].
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, From, Serialize, Deserialize,
)]
pub struct OrderId(pub SmolStr);

impl OrderId {
    pub fn random() -> Self {
        Self(paper_integration::id::random_id())
    }
}

/// Identifier of a [`Trade`], generated via [`paper_integration::id::random_id`].
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, From, Serialize, Deserialize,
)]
pub struct TradeId(pub SmolStr);

impl TradeId {
    pub fn random() -> Self {
        Self(paper_integration::id::random_id())
    }
}

/// Multi-component trade cost (§3 Trade `feesBreakdown`). Split out rather than a single scalar
/// so a caller can report brokerage, taxes and exchange charges separately, the way the legacy
/// fee-accounting model split fees into per-category fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeesBreakdown {
    pub brokerage: Decimal,
    pub taxes: Decimal,
    pub exchange_charges: Decimal,
}

impl FeesBreakdown {
    pub fn total(&self) -> Decimal {
        self.brokerage + self.taxes + self.exchange_charges
    }
}

/// A request to place a new order (§6 `placeOrder`).
#[derive(Debug, Clone)]
pub struct NewOrderRequest {
    pub instrument_key: InstrumentKey,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    pub idempotency_key: SmolStr,
    /// Present only for a forced settlement fill at expiry (§4.10 "MARKET with exitReason=EXPIRY").
    pub settlement_price: Option<Decimal>,
    pub exit_reason: Option<ExitReason>,
}

/// An order's full lifecycle state (§3 Order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub instrument_key: InstrumentKey,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    pub status: OrderStatus,
    pub filled_qty: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub realized_pnl: Option<Decimal>,
    pub idempotency_key: SmolStr,
    pub blocked_margin: Option<Decimal>,
    pub settlement_price: Option<Decimal>,
    pub exit_reason: Option<ExitReason>,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_working(&self) -> bool {
        matches!(self.status, OrderStatus::Accepted | OrderStatus::Working)
    }

    /// Signed order quantity: positive for BUY, negative for SELL (§4.8 position math input).
    pub fn signed_quantity(&self) -> Decimal {
        Decimal::from(self.side.signum()) * self.quantity
    }
}

/// An immutable execution record (§3 Trade).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub instrument_key: InstrumentKey,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fees: FeesBreakdown,
    pub timestamp: DateTime<Utc>,
}
