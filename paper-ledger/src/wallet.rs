use std::{collections::HashMap, time::{Duration, Instant}};

use paper_instrument::InstrumentKey;
use paper_integration::accounts::{AccountType, UserId};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ledger::Ledger, position::PositionStore};

/// §4.12 classification of margin usage relative to equity.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum MarginStatus {
    Normal,
    Stressed,
    Liquidating,
}

impl MarginStatus {
    pub fn classify(margin_used: Decimal, equity: Decimal) -> Self {
        if equity <= Decimal::ZERO {
            return MarginStatus::Liquidating;
        }

        let ratio = margin_used / equity;
        if ratio < Decimal::new(60, 2) {
            MarginStatus::Normal
        } else if ratio < Decimal::new(85, 2) {
            MarginStatus::Stressed
        } else {
            MarginStatus::Liquidating
        }
    }
}

/// Lifecycle state of the account as a whole, distinct from [`MarginStatus`] (§3 supplements:
/// `accountState` is named but not enumerated by the distilled spec).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum AccountState {
    Active,
    Liquidating,
    Frozen,
}

/// Derived view of a user's monetary state (§3 WalletProjection). Always recomputable from the
/// Ledger; only ever persisted as a cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletProjection {
    pub balance: Decimal,
    pub blocked_balance: Decimal,
    pub equity: Decimal,
    pub margin_status: MarginStatus,
    pub account_state: AccountState,
}

struct CachedWallet {
    wallet: WalletProjection,
    cached_at: Instant,
}

/// Projections of the Ledger and of fills (§4.8). `getWallet`/`getPositions` are backed by a
/// per-user TTL cache (default 3s, §5 "Wallet cache") to absorb pre-trade-risk bursts without
/// walking the whole journal on every acceptance check.
pub struct WalletService {
    ledger: std::sync::Arc<Ledger>,
    positions: std::sync::Arc<PositionStore>,
    cache: RwLock<HashMap<UserId, CachedWallet>>,
    cache_ttl: Duration,
}

impl WalletService {
    pub fn new(ledger: std::sync::Arc<Ledger>, positions: std::sync::Arc<PositionStore>) -> Self {
        Self {
            ledger,
            positions,
            cache: RwLock::new(HashMap::new()),
            cache_ttl: Duration::from_secs(3),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Recompute `{balance, blockedBalance, equity}` identically to replaying every historical
    /// ledger entry from scratch (§4.7 rebuild rule). Margin-used for classification comes from
    /// the current `MarginBlocked` balance; `unrealized` comes straight from the journal too, so
    /// this function never reaches into live tick state - that is the MTM Engine's job via
    /// `forceRefresh`.
    pub fn recalculate_from_ledger(&self, user_id: &UserId) -> WalletProjection {
        let cash = self.ledger.balance(user_id, AccountType::Cash);
        let blocked = self.ledger.balance(user_id, AccountType::MarginBlocked);
        let unrealized = self.ledger.balance(user_id, AccountType::UnrealizedPnl);
        let realized = self.ledger.balance(user_id, AccountType::RealizedPnl);
        let fees = self.ledger.balance(user_id, AccountType::Fees);

        let equity = cash + blocked + unrealized + realized - fees;
        let margin_status = MarginStatus::classify(blocked, equity);
        let account_state = match margin_status {
            MarginStatus::Liquidating => AccountState::Liquidating,
            _ => AccountState::Active,
        };

        let wallet = WalletProjection {
            balance: cash,
            blocked_balance: blocked,
            equity,
            margin_status,
            account_state,
        };

        self.cache.write().insert(
            user_id.clone(),
            CachedWallet {
                wallet: wallet.clone(),
                cached_at: Instant::now(),
            },
        );

        wallet
    }

    /// Fetch the cached wallet if still fresh, otherwise recompute from the Ledger.
    pub fn get_wallet(&self, user_id: &UserId) -> WalletProjection {
        if let Some(cached) = self.cache.read().get(user_id) {
            if cached.cached_at.elapsed() < self.cache_ttl {
                return cached.wallet.clone();
            }
        }

        self.recalculate_from_ledger(user_id)
    }

    pub fn invalidate(&self, user_id: &UserId) {
        self.cache.write().remove(user_id);
    }

    /// Push a tick-driven revaluation straight into the wallet cache (§4.12 "flush snapshots to
    /// the Wallet projection on a coalesced cadence"). `live_unrealized` replaces the ledger's
    /// `UnrealizedPnl` balance for the purpose of this snapshot only - the ledger itself is never
    /// mutated by a mark-to-market pass, just at settlement. Bypasses the TTL: the MTM Engine's
    /// cadence, not the cache's, governs how fresh this value is.
    pub fn apply_live_snapshot(&self, user_id: &UserId, live_unrealized: Decimal) -> WalletProjection {
        let cash = self.ledger.balance(user_id, AccountType::Cash);
        let blocked = self.ledger.balance(user_id, AccountType::MarginBlocked);
        let realized = self.ledger.balance(user_id, AccountType::RealizedPnl);
        let fees = self.ledger.balance(user_id, AccountType::Fees);

        let equity = cash + blocked + live_unrealized + realized - fees;
        let margin_status = MarginStatus::classify(blocked, equity);
        let account_state = match margin_status {
            MarginStatus::Liquidating => AccountState::Liquidating,
            _ => AccountState::Active,
        };

        let wallet = WalletProjection {
            balance: cash,
            blocked_balance: blocked,
            equity,
            margin_status,
            account_state,
        };

        self.cache.write().insert(
            user_id.clone(),
            CachedWallet {
                wallet: wallet.clone(),
                cached_at: Instant::now(),
            },
        );

        wallet
    }

    pub fn get_positions(&self, user_id: &UserId) -> Vec<crate::position::Position> {
        self.positions.positions_for_user(user_id)
    }

    pub fn position_notional(&self, user_id: &UserId, instrument_key: &InstrumentKey, price: Decimal) -> Decimal {
        self.positions
            .get(user_id, instrument_key)
            .map(|p| p.notional(price))
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReferenceType;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[test]
    fn recalculate_matches_online_projection_after_a_sequence_of_entries() {
        let ledger = Arc::new(Ledger::new());
        let positions = Arc::new(PositionStore::new());
        let wallet = WalletService::new(Arc::clone(&ledger), positions);
        let user = UserId::new("u1");

        ledger.bootstrap_cash(user.clone(), dec!(1_000_000)).unwrap();
        ledger
            .record_entry(
                user.clone(),
                AccountType::Cash,
                AccountType::MarginBlocked,
                dec!(1000.50),
                ReferenceType::Margin,
                "order-1",
                "MARGIN-order-1",
            )
            .unwrap();

        let projection = wallet.recalculate_from_ledger(&user);
        assert_eq!(projection.balance, dec!(999999.50));
        assert_eq!(projection.blocked_balance, dec!(1000.50));
        assert_eq!(projection.equity, dec!(1_000_000));
        assert_eq!(projection.margin_status, MarginStatus::Normal);
    }

    #[test]
    fn liquidating_when_margin_used_is_95_percent_of_equity() {
        let ledger = Arc::new(Ledger::new());
        let positions = Arc::new(PositionStore::new());
        let wallet = WalletService::new(Arc::clone(&ledger), positions);
        let user = UserId::new("u1");

        ledger.bootstrap_cash(user.clone(), dec!(10_000)).unwrap();
        ledger
            .record_entry(
                user.clone(),
                AccountType::Cash,
                AccountType::MarginBlocked,
                dec!(9_500),
                ReferenceType::Margin,
                "order-1",
                "MARGIN-order-1",
            )
            .unwrap();

        let projection = wallet.recalculate_from_ledger(&user);
        assert_eq!(projection.equity, dec!(10_000));
        assert_eq!(projection.margin_status, MarginStatus::Liquidating);
        assert_eq!(projection.account_state, AccountState::Liquidating);
    }
}
