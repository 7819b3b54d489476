use std::collections::{HashMap, HashSet};

use paper_instrument::{InstrumentKey, InstrumentType};
use paper_integration::accounts::UserId;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A user's net exposure in one instrument (§3 Position). `signed_quantity > 0` is long,
/// `< 0` is short; a position that nets to zero is deleted from the store rather than kept as a
/// zero row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub user_id: UserId,
    pub instrument_key: InstrumentKey,
    pub signed_quantity: Decimal,
    pub average_price: Decimal,
    pub instrument_type: InstrumentType,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.signed_quantity > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.signed_quantity < Decimal::ZERO
    }

    pub fn notional(&self, price: Decimal) -> Decimal {
        self.signed_quantity.abs() * price
    }

    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        self.signed_quantity * (price - self.average_price)
    }
}

/// Outcome of applying a fill to a (possibly absent) prior position (§4.8 position math).
#[derive(Debug, Clone, PartialEq)]
pub struct PositionUpdate {
    pub position: Option<Position>,
    pub realized_pnl: Decimal,
}

/// Apply a fill of signed quantity `q` at price `p` to `existing` (may be `None`), following the
/// §4.8 rules: same-sign (or opening) moves recompute the weighted average price with no realized
/// PnL; opposite-sign moves realize PnL on the reduced portion and, if the fill flips the sign,
/// open a fresh leg on the residual at `p`.
pub fn apply_fill(
    existing: Option<&Position>,
    user_id: &UserId,
    instrument_key: &InstrumentKey,
    instrument_type: InstrumentType,
    q: Decimal,
    p: Decimal,
) -> PositionUpdate {
    let (existing_qty, existing_avg) = existing
        .map(|pos| (pos.signed_quantity, pos.average_price))
        .unwrap_or((Decimal::ZERO, Decimal::ZERO));

    let same_direction =
        existing_qty.is_zero() || existing_qty.signum() == q.signum();

    if same_direction {
        let new_qty = existing_qty + q;
        let new_avg = if new_qty.is_zero() {
            Decimal::ZERO
        } else {
            (existing_qty.abs() * existing_avg + q.abs() * p) / (existing_qty.abs() + q.abs())
        };

        return PositionUpdate {
            position: Some(Position {
                user_id: user_id.clone(),
                instrument_key: instrument_key.clone(),
                signed_quantity: new_qty,
                average_price: new_avg,
                instrument_type,
            }),
            realized_pnl: Decimal::ZERO,
        };
    }

    // Reducing or flipping an existing position.
    let reduced = existing_qty.abs().min(q.abs());
    let realized_pnl = reduced * (p - existing_avg) * existing_qty.signum();
    let new_qty = existing_qty + q;

    if new_qty.is_zero() {
        return PositionUpdate {
            position: None,
            realized_pnl,
        };
    }

    // Sign flip: the residual quantity opens a brand new leg at the fill price.
    let flipped = new_qty.signum() != existing_qty.signum();
    let new_avg = if flipped { p } else { existing_avg };

    PositionUpdate {
        position: Some(Position {
            user_id: user_id.clone(),
            instrument_key: instrument_key.clone(),
            signed_quantity: new_qty,
            average_price: new_avg,
            instrument_type,
        }),
        realized_pnl,
    }
}

/// Materialized per-user position table plus the reverse index `instrument -> {users with open
/// positions}` (§9 Design Notes: "Store only IDs; resolve via the store") that the MTM Engine
/// walks on every tick without scanning every user in the process.
#[derive(Debug, Default)]
pub struct PositionStore {
    positions: RwLock<HashMap<UserId, HashMap<InstrumentKey, Position>>>,
    reverse_index: RwLock<HashMap<InstrumentKey, HashSet<UserId>>>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &UserId, instrument_key: &InstrumentKey) -> Option<Position> {
        self.positions
            .read()
            .get(user_id)
            .and_then(|by_instrument| by_instrument.get(instrument_key))
            .cloned()
    }

    pub fn positions_for_user(&self, user_id: &UserId) -> Vec<Position> {
        self.positions
            .read()
            .get(user_id)
            .map(|by_instrument| by_instrument.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Users holding an open position in `instrument_key`, consulted by the MTM Engine for every
    /// incoming tick (§4.12).
    pub fn users_with_position(&self, instrument_key: &InstrumentKey) -> Vec<UserId> {
        self.reverse_index
            .read()
            .get(instrument_key)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Apply a fill, updating both the position table and the reverse index. Returns the
    /// realized PnL from any reduction.
    pub fn apply_fill(
        &self,
        user_id: &UserId,
        instrument_key: &InstrumentKey,
        instrument_type: InstrumentType,
        q: Decimal,
        p: Decimal,
    ) -> Decimal {
        let existing = self.get(user_id, instrument_key);
        let update = apply_fill(
            existing.as_ref(),
            user_id,
            instrument_key,
            instrument_type,
            q,
            p,
        );

        let mut positions = self.positions.write();
        let mut reverse_index = self.reverse_index.write();
        let by_instrument = positions.entry(user_id.clone()).or_default();

        match update.position {
            Some(position) => {
                by_instrument.insert(instrument_key.clone(), position);
                reverse_index
                    .entry(instrument_key.clone())
                    .or_default()
                    .insert(user_id.clone());
            }
            None => {
                by_instrument.remove(instrument_key);
                if let Some(users) = reverse_index.get_mut(instrument_key) {
                    users.remove(user_id);
                    if users.is_empty() {
                        reverse_index.remove(instrument_key);
                    }
                }
            }
        }

        update.realized_pnl
    }

    pub fn clear_user(&self, user_id: &UserId) {
        if let Some(by_instrument) = self.positions.write().remove(user_id) {
            let mut reverse_index = self.reverse_index.write();
            for instrument_key in by_instrument.keys() {
                if let Some(users) = reverse_index.get_mut(instrument_key) {
                    users.remove(user_id);
                    if users.is_empty() {
                        reverse_index.remove(instrument_key);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn increase_recomputes_weighted_average_with_no_realized_pnl() {
        let update = apply_fill(
            None,
            &UserId::new("u1"),
            &InstrumentKey::new("NSE_EQ|X"),
            InstrumentType::Equity,
            dec!(10),
            dec!(100),
        );
        let position = update.position.unwrap();
        assert_eq!(position.signed_quantity, dec!(10));
        assert_eq!(position.average_price, dec!(100));
        assert_eq!(update.realized_pnl, dec!(0));

        let update = apply_fill(
            Some(&position),
            &UserId::new("u1"),
            &InstrumentKey::new("NSE_EQ|X"),
            InstrumentType::Equity,
            dec!(10),
            dec!(110),
        );
        let position = update.position.unwrap();
        assert_eq!(position.signed_quantity, dec!(20));
        assert_eq!(position.average_price, dec!(105));
        assert_eq!(update.realized_pnl, dec!(0));
    }

    #[test]
    fn full_reduction_deletes_the_row_and_realizes_pnl() {
        let long = Position {
            user_id: UserId::new("u1"),
            instrument_key: InstrumentKey::new("NSE_EQ|X"),
            signed_quantity: dec!(10),
            average_price: dec!(100.05),
            instrument_type: InstrumentType::Equity,
        };

        let update = apply_fill(
            Some(&long),
            &UserId::new("u1"),
            &InstrumentKey::new("NSE_EQ|X"),
            InstrumentType::Equity,
            dec!(-10),
            dec!(119.94),
        );

        assert!(update.position.is_none());
        assert_eq!(update.realized_pnl, dec!(198.9));
    }

    #[test]
    fn reverse_index_tracks_users_with_open_positions() {
        let store = PositionStore::new();
        let key = InstrumentKey::new("NSE_EQ|X");
        let user = UserId::new("u1");

        store.apply_fill(&user, &key, InstrumentType::Equity, dec!(10), dec!(100));
        assert_eq!(store.users_with_position(&key), vec![user.clone()]);

        store.apply_fill(&user, &key, InstrumentType::Equity, dec!(-10), dec!(105));
        assert!(store.users_with_position(&key).is_empty());
    }
}
