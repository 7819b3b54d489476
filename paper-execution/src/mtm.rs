use std::{
    collections::HashSet,
    sync::Arc,
};

use chrono::Utc;
use paper_data::{NormalizedTick, TickBus, TickHandler};
use paper_integration::{accounts::UserId, metrics::Counters};
use paper_ledger::{MarginStatus, PositionStore, WalletService};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::warn;

use crate::execution::ExecutionService;

/// Revalues open positions on every tick and flushes the result to the Wallet projection on a
/// coalesced cadence (§4.12). Subscribes to the [`TickBus`] as a [`TickHandler`]; marking a user
/// dirty is non-blocking the same way [`TickBus::publish`] marks an instrument dirty, and the
/// actual revaluation happens on [`Self::flush`], called by the composition root's 250ms timer.
pub struct MtmEngine {
    positions: Arc<PositionStore>,
    wallet: Arc<WalletService>,
    execution: Arc<ExecutionService>,
    dirty: RwLock<HashSet<UserId>>,
    counters: Counters,
}

impl MtmEngine {
    pub fn new(
        positions: Arc<PositionStore>,
        wallet: Arc<WalletService>,
        execution: Arc<ExecutionService>,
    ) -> Self {
        Self {
            positions,
            wallet,
            execution,
            dirty: RwLock::new(HashSet::new()),
            counters: Counters::new(),
        }
    }

    /// Sum unrealized PnL across every open position for `user_id`, marking to each instrument's
    /// current tick (or, if the instrument hasn't ticked yet, its stored average price).
    fn live_unrealized(&self, user_id: &UserId, tick_bus: &TickBus) -> Decimal {
        self.positions
            .positions_for_user(user_id)
            .into_iter()
            .map(|position| {
                let mark = tick_bus
                    .latest(&position.instrument_key)
                    .map(|t| t.price)
                    .unwrap_or(position.average_price);
                position.unrealized_pnl(mark)
            })
            .sum()
    }

    /// Revalue one user immediately: push a live snapshot to the wallet cache, classify margin
    /// status, and enqueue a liquidation sweep if the result is `LIQUIDATING` (§4.12 items 2-6).
    fn revalue(&self, user_id: &UserId, tick_bus: &TickBus) {
        let live_unrealized = self.live_unrealized(user_id, tick_bus);
        let projection = self.wallet.apply_live_snapshot(user_id, live_unrealized);

        if projection.margin_status == MarginStatus::Liquidating {
            let orders = self.execution.force_liquidate(user_id, Utc::now());
            if !orders.is_empty() {
                warn!(%user_id, "account entered liquidation on mark-to-market revaluation");
            }
        }

        self.counters.incr("mtm.revalued");
    }

    /// Deliver the coalesced dirty set exactly once per user, then clear it (§4.12 "flush
    /// snapshots to the Wallet projection on a coalesced cadence").
    pub fn flush(&self, tick_bus: &TickBus) {
        let dirty_users: Vec<UserId> = {
            let mut dirty = self.dirty.write();
            dirty.drain().collect()
        };

        for user_id in dirty_users {
            self.revalue(&user_id, tick_bus);
        }
    }

    /// Revalue a single user immediately, bypassing the coalesce window (§4.12 `forceRefresh`,
    /// e.g. right after `resetAccount` or a manual margin check).
    pub fn force_refresh(&self, user_id: &UserId, tick_bus: &TickBus) {
        self.dirty.write().remove(user_id);
        self.revalue(user_id, tick_bus);
    }
}

impl TickHandler for MtmEngine {
    /// Mark every user holding a position in this instrument dirty via the Position Store's
    /// reverse index (§4.12 "walk the reverse index on every incoming tick"). Delivery is
    /// deferred to [`Self::flush`].
    fn on_tick(&self, tick: &NormalizedTick) {
        let users = self.positions.users_with_position(&tick.instrument_key);
        if users.is_empty() {
            return;
        }

        let mut dirty = self.dirty.write();
        dirty.extend(users);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paper_data::FeedHealthMonitor;
    use paper_instrument::{Exchange, Instrument, InstrumentKey, InstrumentStore, InstrumentType};
    use paper_integration::config::CoreConfig;
    use paper_ledger::Ledger;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn equity(key: &str) -> Instrument {
        Instrument {
            instrument_key: InstrumentKey::new(key),
            trading_symbol: "X".into(),
            name: "X Ltd".into(),
            underlying: "X".into(),
            segment: "EQ".into(),
            exchange: Exchange::Nse,
            instrument_type: InstrumentType::Equity,
            option_type: None,
            strike: None,
            expiry: None,
            tick_size: dec!(0.05),
            lot_size: 1,
            prev_close: Some(dec!(100)),
        }
    }

    fn tick(price: Decimal, timestamp: i64) -> NormalizedTick {
        NormalizedTick::new(
            InstrumentKey::new("NSE_EQ|X"),
            "X".into(),
            price,
            dec!(1),
            timestamp,
            Exchange::Nse,
            Some(dec!(100)),
        )
    }

    fn harness() -> (MtmEngine, Arc<TickBus>, Arc<PositionStore>, Arc<WalletService>, UserId) {
        let instruments = Arc::new(InstrumentStore::new());
        instruments.load(vec![equity("NSE_EQ|X")]).unwrap();
        let tick_bus = Arc::new(TickBus::new());
        let health = Arc::new(FeedHealthMonitor::new(Duration::from_secs(5), 0.5, 3));
        let ledger = Arc::new(Ledger::new());
        let positions = Arc::new(PositionStore::new());
        let wallet = Arc::new(WalletService::new(Arc::clone(&ledger), Arc::clone(&positions)));
        let user = UserId::new("u1");
        ledger.bootstrap_cash(user.clone(), dec!(100_000)).unwrap();

        let execution = Arc::new(ExecutionService::new(
            instruments,
            Arc::clone(&tick_bus),
            health,
            ledger,
            Arc::clone(&positions),
            Arc::clone(&wallet),
            CoreConfig::default(),
        ));

        let mtm = MtmEngine::new(Arc::clone(&positions), Arc::clone(&wallet), execution);
        (mtm, tick_bus, positions, wallet, user)
    }

    #[test]
    fn on_tick_marks_only_users_with_an_open_position() {
        let (mtm, tick_bus, positions, _wallet, user) = harness();
        positions.apply_fill(
            &user,
            &InstrumentKey::new("NSE_EQ|X"),
            InstrumentType::Equity,
            dec!(10),
            dec!(100),
        );

        mtm.on_tick(&tick(dec!(101), 1_000));
        assert!(mtm.dirty.read().contains(&user));
    }

    #[test]
    fn flush_pushes_a_live_snapshot_reflecting_unrealized_pnl() {
        let (mtm, tick_bus, positions, wallet, user) = harness();
        positions.apply_fill(
            &user,
            &InstrumentKey::new("NSE_EQ|X"),
            InstrumentType::Equity,
            dec!(10),
            dec!(100),
        );
        tick_bus.publish(tick(dec!(110), 1_000));

        mtm.on_tick(&tick_bus.latest(&InstrumentKey::new("NSE_EQ|X")).unwrap());
        mtm.flush(&tick_bus);

        let projection = wallet.get_wallet(&user);
        // 10 units long from 100, marked at 110: +100 unrealized on top of 100,000 cash.
        assert_eq!(projection.equity, dec!(100_100));
    }

    #[test]
    fn force_refresh_revalues_immediately_without_a_prior_on_tick() {
        let (mtm, tick_bus, positions, wallet, user) = harness();
        positions.apply_fill(
            &user,
            &InstrumentKey::new("NSE_EQ|X"),
            InstrumentType::Equity,
            dec!(10),
            dec!(100),
        );
        tick_bus.publish(tick(dec!(90), 1_000));

        mtm.force_refresh(&user, &tick_bus);

        let projection = wallet.get_wallet(&user);
        assert_eq!(projection.equity, dec!(99_900));
    }
}
