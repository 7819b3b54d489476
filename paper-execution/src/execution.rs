use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use paper_instrument::InstrumentStore;
use paper_integration::{
    accounts::{AccountType, UserId},
    config::CoreConfig,
    metrics::Counters,
    order::{OrderSide, OrderStatus, OrderType},
};
use paper_ledger::{Ledger, PositionStore, ReferenceType, WalletService};
use paper_risk::{
    acceptance::{check_acceptance, AcceptanceRequest},
    pretrade::{check_pretrade, project_quantity, PretradeRequest, ProjectedPosition},
};
use parking_lot::RwLock;
use paper_data::{FeedHealthMonitor, PriceOracle, TickBus};
use rust_decimal::Decimal;
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::{
    error::ExecutionError,
    fill::resolve_fill,
    model::{FeesBreakdown, NewOrderRequest, Order, OrderId, Trade, TradeId},
};

/// Brokerage, taxes and exchange charges, each a flat fraction of the traded notional. The
/// simulator never connects to a real venue's fee schedule, so these are plausible flat rates
/// rather than ticker-specific slabs (§3 Trade `feesBreakdown`).
const BROKERAGE_RATE: Decimal = Decimal::from_parts(3, 0, 0, false, 4);
const TAXES_RATE: Decimal = Decimal::from_parts(1, 0, 0, false, 4);
const EXCHANGE_CHARGES_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 5);

fn fees_for(notional: Decimal) -> FeesBreakdown {
    FeesBreakdown {
        brokerage: notional * BROKERAGE_RATE,
        taxes: notional * TAXES_RATE,
        exchange_charges: notional * EXCHANGE_CHARGES_RATE,
    }
}

/// Drives the order lifecycle of §4.11: accept → block margin → match via the Fill Engine →
/// write a trade → update position → release margin → realize PnL. Orders and trades are held
/// in-process (the system-of-record for money is always the [`Ledger`]); a restart loses only the
/// order/trade audit trail, never account balances.
pub struct ExecutionService {
    instruments: Arc<InstrumentStore>,
    tick_bus: Arc<TickBus>,
    health: Arc<FeedHealthMonitor>,
    ledger: Arc<Ledger>,
    positions: Arc<PositionStore>,
    wallet: Arc<WalletService>,
    config: CoreConfig,
    orders: RwLock<HashMap<OrderId, Order>>,
    idempotency: RwLock<HashMap<UserId, HashMap<SmolStr, OrderId>>>,
    trades: RwLock<Vec<Trade>>,
    counters: Counters,
}

impl ExecutionService {
    pub fn new(
        instruments: Arc<InstrumentStore>,
        tick_bus: Arc<TickBus>,
        health: Arc<FeedHealthMonitor>,
        ledger: Arc<Ledger>,
        positions: Arc<PositionStore>,
        wallet: Arc<WalletService>,
        config: CoreConfig,
    ) -> Self {
        Self {
            instruments,
            tick_bus,
            health,
            ledger,
            positions,
            wallet,
            config,
            orders: RwLock::new(HashMap::new()),
            idempotency: RwLock::new(HashMap::new()),
            trades: RwLock::new(Vec::new()),
            counters: Counters::new(),
        }
    }

    fn oracle(&self) -> PriceOracle<'_> {
        PriceOracle::new(
            &self.tick_bus,
            &self.health,
            &self.instruments,
            self.config.paper_trading_mode,
        )
    }

    /// Run acceptance + pre-trade risk, block margin, and persist the order as `ACCEPTED`
    /// (§6 `placeOrder`, §4.11 steps 1-3). Returns the prior order unchanged if `idempotency_key`
    /// has already been used for this user.
    pub fn place_order(
        &self,
        user_id: &UserId,
        request: NewOrderRequest,
        now: DateTime<Utc>,
    ) -> Result<Order, ExecutionError> {
        if let Some(order_id) = self
            .idempotency
            .read()
            .get(user_id)
            .and_then(|keys| keys.get(request.idempotency_key.as_str()))
        {
            debug!(%user_id, idempotency_key = %request.idempotency_key, "order idempotency replay");
            return Ok(self.orders.read().get(order_id).cloned().expect("idempotency map is consistent with orders"));
        }

        let instrument = self.instruments.by_key(&request.instrument_key)?;
        let reference_price = self
            .oracle()
            .best_price(&request.instrument_key, now.timestamp())?;
        let existing_position = self.positions.get(user_id, &request.instrument_key);
        let signed_order_qty = Decimal::from(request.side.signum()) * request.quantity;

        check_acceptance(
            &AcceptanceRequest {
                instrument: &instrument,
                quantity: request.quantity,
                order_type: request.order_type,
                limit_price: request.limit_price,
                reference_price,
                existing_position_qty: existing_position.as_ref().map(|p| p.signed_quantity),
                signed_order_qty,
            },
            &self.config,
        )?;

        let wallet = self.wallet.get_wallet(user_id);
        let mut open_positions = self.positions.positions_for_user(user_id);
        open_positions.retain(|p| p.instrument_key != request.instrument_key);

        let mut instruments_by_key = HashMap::new();
        for position in &open_positions {
            if let Ok(instrument) = self.instruments.by_key(&position.instrument_key) {
                instruments_by_key.insert(position.instrument_key.clone(), instrument);
            }
        }

        let mut projected = Vec::with_capacity(open_positions.len() + 1);
        for position in &open_positions {
            let Some(other_instrument) = instruments_by_key.get(&position.instrument_key) else {
                continue;
            };
            let mark_price = self
                .oracle()
                .best_price(&position.instrument_key, now.timestamp())
                .unwrap_or(position.average_price);
            projected.push(ProjectedPosition {
                instrument: other_instrument,
                signed_quantity: position.signed_quantity,
                mark_price,
            });
        }

        let projected_quantity = project_quantity(existing_position.as_ref(), request.side, request.quantity);
        projected.push(ProjectedPosition {
            instrument: &instrument,
            signed_quantity: projected_quantity,
            mark_price: reference_price,
        });

        check_pretrade(
            &PretradeRequest {
                side: request.side,
                traded_instrument_key: &request.instrument_key,
                wallet: &wallet,
                projected_positions: &projected,
                now,
            },
            &self.config,
        )?;

        let order_id = OrderId::random();
        let is_option_buy = matches!(request.side, OrderSide::Buy);
        let effective_price = request.limit_price.unwrap_or(reference_price);
        let notional = request.quantity * effective_price;
        let required_margin = notional * instrument.margin_notional_multiplier(is_option_buy);

        self.ledger.record_entry(
            user_id.clone(),
            AccountType::Cash,
            AccountType::MarginBlocked,
            required_margin,
            ReferenceType::Margin,
            order_id.0.clone(),
            format!("MARGIN-{}", order_id.0),
        )?;
        self.wallet.invalidate(user_id);

        let order = Order {
            id: order_id.clone(),
            user_id: user_id.clone(),
            instrument_key: request.instrument_key,
            side: request.side,
            quantity: request.quantity,
            order_type: request.order_type,
            limit_price: request.limit_price,
            status: OrderStatus::Accepted,
            filled_qty: Decimal::ZERO,
            avg_fill_price: None,
            realized_pnl: None,
            idempotency_key: request.idempotency_key.clone(),
            blocked_margin: Some(required_margin),
            settlement_price: request.settlement_price,
            exit_reason: request.exit_reason,
            created_at: now,
            executed_at: None,
        };

        self.orders.write().insert(order_id.clone(), order.clone());
        self.idempotency
            .write()
            .entry(user_id.clone())
            .or_default()
            .insert(request.idempotency_key, order_id);

        self.counters.incr("order.accepted");
        Ok(order)
    }

    /// Atomically unblock margin and move a non-terminal order to `CANCELLED` (§4.11
    /// "Cancellation").
    pub fn cancel_order(&self, user_id: &UserId, order_id: &OrderId) -> Result<Order, ExecutionError> {
        let mut orders = self.orders.write();
        let order = orders
            .get_mut(order_id)
            .filter(|o| &o.user_id == user_id)
            .ok_or_else(|| ExecutionError::OrderNotFound(order_id.0.to_string()))?;

        if order.status.is_terminal() {
            return Err(ExecutionError::AlreadyTerminal(order_id.0.to_string()));
        }

        if let Some(blocked) = order.blocked_margin.filter(|amount| *amount > Decimal::ZERO) {
            self.ledger.record_entry(
                user_id.clone(),
                AccountType::MarginBlocked,
                AccountType::Cash,
                blocked,
                ReferenceType::Unblock,
                order_id.0.clone(),
                format!("UNBLOCK-{}", order_id.0),
            )?;
        }

        order.status = OrderStatus::Cancelled;
        order.executed_at = Some(Utc::now());
        self.wallet.invalidate(user_id);
        self.counters.incr("order.cancelled");
        Ok(order.clone())
    }

    /// Scan every `ACCEPTED`/`WORKING` order and attempt a fill via the Fill Engine (§4.11 step
    /// 4). Intended to be driven by the composition root's tick-cycle loop, not per-tick per
    /// order - a single pass touches every working order regardless of which instrument just
    /// ticked.
    pub fn scan_and_fill(&self, now: DateTime<Utc>) {
        let now_unix = now.timestamp();
        let working: Vec<Order> = self
            .orders
            .read()
            .values()
            .filter(|o| o.is_working())
            .cloned()
            .collect();

        for order in working {
            let Ok(instrument) = self.instruments.by_key(&order.instrument_key) else {
                continue;
            };

            let outcome = resolve_fill(&order, &instrument, &self.tick_bus, &self.config, now_unix);
            if !outcome.should_fill {
                continue;
            }

            let Some(fill_price) = outcome.fill_price else {
                continue;
            };

            self.apply_fill(&order, &instrument, fill_price, now);
        }
    }

    fn apply_fill(&self, order: &Order, instrument: &paper_instrument::Instrument, fill_price: Decimal, now: DateTime<Utc>) {
        let trade_id = TradeId::random();
        let signed_qty = order.signed_quantity();
        let notional = order.quantity * fill_price;
        let fees = fees_for(notional);

        let realized = self.positions.apply_fill(
            &order.user_id,
            &order.instrument_key,
            instrument.instrument_type,
            signed_qty,
            fill_price,
        );

        if let Some(blocked) = order.blocked_margin.filter(|amount| *amount > Decimal::ZERO) {
            if let Err(err) = self.ledger.record_entry(
                order.user_id.clone(),
                AccountType::MarginBlocked,
                AccountType::Cash,
                blocked,
                ReferenceType::Unblock,
                order.id.0.clone(),
                format!("UNBLOCK-{}", order.id.0),
            ) {
                warn!(error = %err, order_id = %order.id, "failed to unblock margin on fill");
            }
        }

        if realized > Decimal::ZERO {
            let _ = self.ledger.record_entry(
                order.user_id.clone(),
                AccountType::RealizedPnl,
                AccountType::Cash,
                realized,
                ReferenceType::Pnl,
                trade_id.0.clone(),
                format!("PNL-{}", trade_id.0),
            );
        } else if realized < Decimal::ZERO {
            let _ = self.ledger.record_entry(
                order.user_id.clone(),
                AccountType::Cash,
                AccountType::RealizedPnl,
                -realized,
                ReferenceType::Pnl,
                trade_id.0.clone(),
                format!("PNL-{}", trade_id.0),
            );
        }

        let fee_total = fees.total();
        if fee_total > Decimal::ZERO {
            let _ = self.ledger.record_entry(
                order.user_id.clone(),
                AccountType::Cash,
                AccountType::Fees,
                fee_total,
                ReferenceType::Fee,
                trade_id.0.clone(),
                format!("FEE-{}", trade_id.0),
            );
        }

        let trade = Trade {
            id: trade_id,
            order_id: order.id.clone(),
            user_id: order.user_id.clone(),
            instrument_key: order.instrument_key.clone(),
            side: order.side,
            quantity: order.quantity,
            price: fill_price,
            fees,
            timestamp: now,
        };
        self.trades.write().push(trade);

        if let Some(stored) = self.orders.write().get_mut(&order.id) {
            stored.filled_qty = order.quantity;
            stored.avg_fill_price = Some(fill_price);
            stored.realized_pnl = Some(realized);
            stored.status = OrderStatus::Filled;
            stored.executed_at = Some(now);
        }

        self.wallet.invalidate(&order.user_id);
        self.counters.incr("order.filled");
    }

    /// Enqueue a forced-exit `MARKET` order per open position for `user_id`, largest-loss-first
    /// (§4.12 item 6). Bypasses acceptance's partial-exit rule - a liquidation always closes the
    /// whole position - but still settles through [`Self::scan_and_fill`] like any other order.
    pub fn force_liquidate(&self, user_id: &UserId, now: DateTime<Utc>) -> Vec<OrderId> {
        let mut positions = self.positions.positions_for_user(user_id);
        positions.sort_by_key(|position| {
            let mark = self
                .tick_bus
                .latest(&position.instrument_key)
                .map(|t| t.price)
                .unwrap_or(position.average_price);
            position.unrealized_pnl(mark)
        });

        let mut created = Vec::with_capacity(positions.len());
        for position in positions {
            let side = if position.signed_quantity > Decimal::ZERO {
                OrderSide::Sell
            } else {
                OrderSide::Buy
            };

            let order_id = OrderId::random();
            let order = Order {
                id: order_id.clone(),
                user_id: user_id.clone(),
                instrument_key: position.instrument_key.clone(),
                side,
                quantity: position.signed_quantity.abs(),
                order_type: OrderType::Market,
                limit_price: None,
                status: OrderStatus::Accepted,
                filled_qty: Decimal::ZERO,
                avg_fill_price: None,
                realized_pnl: None,
                idempotency_key: format!("LIQUIDATION-{}-{}", user_id, position.instrument_key).into(),
                blocked_margin: None,
                settlement_price: None,
                exit_reason: Some(paper_integration::order::ExitReason::Liquidation),
                created_at: now,
                executed_at: None,
            };

            self.orders.write().insert(order_id.clone(), order);
            created.push(order_id);
        }

        if !created.is_empty() {
            warn!(%user_id, count = created.len(), "forced liquidation orders enqueued");
        }
        created
    }

    /// Atomically delete the user's orders, trades, positions and ledger, then reseed the wallet
    /// to `resetBalance` (§6 `resetAccount`).
    pub fn reset_account(&self, user_id: &UserId, reset_balance: Decimal) -> Result<(), ExecutionError> {
        self.orders.write().retain(|_, order| &order.user_id != user_id);
        self.idempotency.write().remove(user_id);
        self.trades.write().retain(|trade| &trade.user_id != user_id);
        self.positions.clear_user(user_id);
        self.ledger.clear_user(user_id);
        self.ledger.bootstrap_cash(user_id.clone(), reset_balance)?;
        self.wallet.invalidate(user_id);
        Ok(())
    }

    pub fn get_order(&self, order_id: &OrderId) -> Option<Order> {
        self.orders.read().get(order_id).cloned()
    }

    pub fn orders_for_user(&self, user_id: &UserId) -> Vec<Order> {
        self.orders
            .read()
            .values()
            .filter(|o| &o.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn trades_for_user(&self, user_id: &UserId) -> Vec<Trade> {
        self.trades
            .read()
            .iter()
            .filter(|t| &t.user_id == user_id)
            .cloned()
            .collect()
    }
}
