use std::{sync::Arc, time::Duration};

use chrono::Utc;
use paper_data::{
    BrokerAdapter, CandleEngine, FeedHealthMonitor, SessionState, SubscriptionBroker, TickBus,
    TickHandler,
};
use paper_execution::{ExecutionService, MtmEngine, NewOrderRequest, Order};
use paper_instrument::{Instrument, InstrumentKey, InstrumentStore};
use paper_integration::{
    accounts::UserId,
    config::CoreConfig,
    error::CoreError,
};
use paper_ledger::{Ledger, PositionStore, WalletProjection, WalletService};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::info;
use url::Url;

use crate::error::to_core_error;

/// Candle intervals the composition root aggregates for every instrument (§4.4 does not mandate
/// a fixed set; 1 minute and 5 minutes cover the common paper-trading chart resolutions).
const CANDLE_INTERVALS_SECONDS: [u64; 2] = [60, 300];

/// Relays every published tick into the [`CandleEngine`] across all configured intervals. A
/// standalone [`TickHandler`] rather than folding into [`CandleEngine`] itself, since one tick
/// fans out to several independent per-interval series.
struct CandleRelay {
    engine: Arc<CandleEngine>,
}

impl TickHandler for CandleRelay {
    fn on_tick(&self, tick: &paper_data::NormalizedTick) {
        for interval in CANDLE_INTERVALS_SECONDS {
            self.engine.on_tick(tick, interval);
        }
    }
}

/// Owns every long-lived component of the paper trading core and the cooperative tasks that
/// drive them (§9). Constructed once per process; the Order API methods below are the only
/// public surface a web/HTTP layer needs.
pub struct System {
    pub instruments: Arc<InstrumentStore>,
    pub tick_bus: Arc<TickBus>,
    pub health: Arc<FeedHealthMonitor>,
    pub broker: Arc<BrokerAdapter>,
    pub candles: Arc<CandleEngine>,
    pub subscriptions: Arc<SubscriptionBroker>,
    pub ledger: Arc<Ledger>,
    pub positions: Arc<PositionStore>,
    pub wallet: Arc<WalletService>,
    pub execution: Arc<ExecutionService>,
    pub mtm: Arc<MtmEngine>,
    pub config: CoreConfig,
    feed_shutdown: RwLock<Option<paper_data::ShutdownToken>>,
}

impl System {
    /// Build every component and wire the Tick Bus subscribers (§9 "Startup"). Instruments must
    /// be loaded into the returned [`InstrumentStore`] before the Order API is used; sourcing the
    /// instrument master is a transport/ingestion concern outside this core.
    pub fn new(config: CoreConfig) -> Self {
        let instruments = Arc::new(InstrumentStore::new());
        let tick_bus = Arc::new(TickBus::new());
        let health = Arc::new(FeedHealthMonitor::new(
            Duration::from_millis(config.feed_max_tick_age_ms),
            config.feed_min_tick_rate,
            config.feed_min_active_tokens,
        ));
        let broker = Arc::new(BrokerAdapter::new(
            Arc::clone(&instruments),
            Arc::clone(&tick_bus),
            Arc::clone(&health),
        ));
        let candles = Arc::new(CandleEngine::new());
        let subscriptions = Arc::new(SubscriptionBroker::new(Arc::clone(&broker)));

        let ledger = Arc::new(Ledger::new());
        let positions = Arc::new(PositionStore::new());
        let wallet = Arc::new(WalletService::new(Arc::clone(&ledger), Arc::clone(&positions)));

        let execution = Arc::new(ExecutionService::new(
            Arc::clone(&instruments),
            Arc::clone(&tick_bus),
            Arc::clone(&health),
            Arc::clone(&ledger),
            Arc::clone(&positions),
            Arc::clone(&wallet),
            config.clone(),
        ));
        let mtm = Arc::new(MtmEngine::new(
            Arc::clone(&positions),
            Arc::clone(&wallet),
            Arc::clone(&execution),
        ));

        tick_bus.subscribe(Arc::clone(&health) as Arc<dyn TickHandler>);
        tick_bus.subscribe(Arc::clone(&subscriptions) as Arc<dyn TickHandler>);
        tick_bus.subscribe(Arc::new(CandleRelay {
            engine: Arc::clone(&candles),
        }));
        tick_bus.subscribe(Arc::clone(&mtm) as Arc<dyn TickHandler>);

        Self {
            instruments,
            tick_bus,
            health,
            broker,
            candles,
            subscriptions,
            ledger,
            positions,
            wallet,
            execution,
            mtm,
            config,
            feed_shutdown: RwLock::new(None),
        }
    }

    /// Start the broker websocket feed loop as a background task (§4.3, §5 "Broker adapter's
    /// socket read and reconnect backoff"). A no-op if a feed is already running; callers
    /// typically invoke this once at startup using `config.broker_ws_url`/`broker_access_token`.
    /// The task is stopped cooperatively by [`Self::shutdown`].
    pub fn spawn_broker_feed(&self, url: Url, token: impl Into<String>) {
        if self.feed_shutdown.read().is_some() {
            return;
        }

        self.broker.set_token(token);
        let shutdown = paper_data::ShutdownToken::new();
        let task_shutdown = shutdown.clone();
        let adapter = Arc::clone(&self.broker);
        tokio::spawn(paper_data::feed::run(adapter, url, task_shutdown));
        *self.feed_shutdown.write() = Some(shutdown);
    }

    /// One cooperative scheduling tick (§9): deliver coalesced ticks to every subscriber, attempt
    /// fills for working orders, flush mark-to-market snapshots, and push coalesced SSE batches.
    /// Intended to be driven by a fixed-interval loop in `main`.
    pub fn run_cycle(&self) {
        self.tick_bus.flush();
        self.execution.scan_and_fill(Utc::now());
        self.mtm.flush(&self.tick_bus);
        self.subscriptions.flush_all();
    }

    /// Cooperative shutdown (§9): stop accepting new broker frames, drain the Tick Bus one last
    /// time so every subscriber sees whatever arrived before the stop signal, flush outstanding
    /// MTM snapshots, and disconnect every SSE client. The Ledger has no in-memory buffer to
    /// commit - every write already landed synchronously in [`Self::place_order`].
    pub fn shutdown(&self) {
        info!("paper trading core shutting down");
        if let Some(token) = self.feed_shutdown.read().clone() {
            token.signal();
        }
        self.health.set_websocket_connected(false);
        self.health.set_session_state(SessionState::Disconnected);
        self.tick_bus.flush();
        self.mtm.flush(&self.tick_bus);
    }

    // ---- Order API (§6) ----

    pub fn place_order(
        &self,
        user_id: &UserId,
        request: NewOrderRequest,
    ) -> Result<Order, CoreError> {
        self.execution
            .place_order(user_id, request, Utc::now())
            .map_err(to_core_error)
    }

    pub fn cancel_order(
        &self,
        user_id: &UserId,
        order_id: &paper_execution::OrderId,
    ) -> Result<Order, CoreError> {
        self.execution
            .cancel_order(user_id, order_id)
            .map_err(to_core_error)
    }

    /// Reset a user's account to a clean slate (§6 `resetAccount`): wipe orders, trades,
    /// positions and ledger history, then reseed cash to `RESET_BALANCE`.
    pub fn reset_account(&self, user_id: &UserId) -> Result<(), CoreError> {
        self.execution
            .reset_account(user_id, self.config.reset_balance)
            .map_err(to_core_error)?;
        self.mtm.force_refresh(user_id, &self.tick_bus);
        Ok(())
    }

    pub fn get_wallet(&self, user_id: &UserId) -> WalletProjection {
        self.wallet.get_wallet(user_id)
    }

    pub fn get_positions(&self, user_id: &UserId) -> Vec<paper_ledger::Position> {
        self.wallet.get_positions(user_id)
    }

    pub fn orders_for_user(&self, user_id: &UserId) -> Vec<Order> {
        self.execution.orders_for_user(user_id)
    }

    pub fn bootstrap_user(&self, user_id: &UserId) -> Result<(), CoreError> {
        self.ledger
            .bootstrap_cash(user_id.clone(), self.config.default_wallet_balance)
            .map_err(|err| CoreError::internal(err.to_string()))?;
        Ok(())
    }

    pub fn load_instruments(&self, instruments: Vec<Instrument>) -> Result<(), CoreError> {
        self.instruments
            .load(instruments)
            .map_err(crate::error::instrument_error_to_core)
    }

    pub fn resolve_instrument(&self, symbol_or_key: &str) -> Result<Arc<Instrument>, CoreError> {
        self.instruments
            .resolve(symbol_or_key)
            .map_err(crate::error::instrument_error_to_core)
    }

    pub fn best_price(&self, key: &InstrumentKey) -> Result<Decimal, CoreError> {
        paper_data::PriceOracle::new(
            &self.tick_bus,
            &self.health,
            &self.instruments,
            self.config.paper_trading_mode,
        )
        .best_price(key, Utc::now().timestamp())
        .map_err(crate::error::data_error_to_core)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paper_instrument::{Exchange, InstrumentType};
    use paper_integration::order::{OrderSide, OrderType};
    use rust_decimal_macros::dec;

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

    #[test]
    fn a_fresh_system_bootstraps_a_user_and_places_an_order() {
        let system = System::new(CoreConfig::default());
        system.load_instruments(vec![equity("NSE_EQ|X")]).unwrap();

        let user = UserId::new("u1");
        system.bootstrap_user(&user).unwrap();

        system.tick_bus.publish(paper_data::NormalizedTick::new(
            InstrumentKey::new("NSE_EQ|X"),
            "X".into(),
            dec!(100),
            dec!(1),
            Utc::now().timestamp(),
            Exchange::Nse,
            Some(dec!(100)),
        ));
        system.run_cycle();

        let order = system
            .place_order(
                &user,
                NewOrderRequest {
                    instrument_key: InstrumentKey::new("NSE_EQ|X"),
                    side: OrderSide::Buy,
                    quantity: dec!(10),
                    order_type: OrderType::Market,
                    limit_price: None,
                    idempotency_key: "req-1".into(),
                    settlement_price: None,
                    exit_reason: None,
                },
            )
            .unwrap();

        assert_eq!(order.status, paper_integration::order::OrderStatus::Accepted);

        system.run_cycle();
        let orders = system.orders_for_user(&user);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, paper_integration::order::OrderStatus::Filled);
    }

    #[test]
    fn reset_account_reseeds_cash_and_wipes_orders() {
        let system = System::new(CoreConfig::default());
        system.load_instruments(vec![equity("NSE_EQ|X")]).unwrap();

        let user = UserId::new("u1");
        system.bootstrap_user(&user).unwrap();
        system.reset_account(&user).unwrap();

        let wallet = system.get_wallet(&user);
        assert_eq!(wallet.balance, system.config.reset_balance);
        assert!(system.orders_for_user(&user).is_empty());
    }
}
