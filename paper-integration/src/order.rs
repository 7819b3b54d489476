use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Side of an order or position (§3 Order).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub enum OrderSide {
    #[serde(alias = "buy", alias = "BUY", alias = "b")]
    Buy,
    #[serde(alias = "sell", alias = "SELL", alias = "s")]
    Sell,
}

impl OrderSide {
    /// `+1` for `Buy`, `-1` for `Sell` - the sign convention used throughout position math.
    pub fn signum(self) -> i32 {
        match self {
            OrderSide::Buy => 1,
            OrderSide::Sell => -1,
        }
    }
}

impl Display for OrderSide {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                OrderSide::Buy => "BUY",
                OrderSide::Sell => "SELL",
            }
        )
    }
}

/// Pricing mechanism of an order (§3 Order).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub enum OrderType {
    Market,
    Limit,
}

impl Display for OrderType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                OrderType::Market => "MARKET",
                OrderType::Limit => "LIMIT",
            }
        )
    }
}

/// Lifecycle state of an order (§3 Order). Terminal states are `Filled`, `Rejected`, `Cancelled`
/// and `Expired` - once reached, no further state transition may occur for that order.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub enum OrderStatus {
    Accepted,
    Working,
    Filled,
    PartiallyFilled,
    Rejected,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Rejected | OrderStatus::Cancelled | OrderStatus::Expired
        )
    }
}

/// Reason a position was force-exited by the liquidation sweep or the expiry settlement job
/// (§4.10, §4.11). `None` for an ordinary user-initiated order.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub enum ExitReason {
    Liquidation,
    Expiry,
}
