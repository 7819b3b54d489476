use paper_instrument::{Instrument, InstrumentType};
use paper_integration::{config::CoreConfig, money::round_to_tick, order::OrderType};
use rust_decimal::Decimal;

use crate::model::Order;
use paper_data::TickBus;
use paper_integration::order::OrderSide;

/// Outcome of asking the Fill Engine to resolve a working order against the current tick (§4.10).
/// `should_fill = false` leaves the order `WORKING` for the next scan; the Execution Service
/// never treats this as an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillOutcome {
    pub should_fill: bool,
    pub fill_price: Option<Decimal>,
}

impl FillOutcome {
    fn no_fill() -> Self {
        Self {
            should_fill: false,
            fill_price: None,
        }
    }

    fn fill_at(price: Decimal) -> Self {
        Self {
            should_fill: true,
            fill_price: Some(price),
        }
    }
}

fn slippage_bps_for(instrument_type: InstrumentType, config: &CoreConfig) -> u32 {
    let bps = match instrument_type {
        InstrumentType::Equity | InstrumentType::Index => config.fill_slippage_bps_equity,
        InstrumentType::Future => config.fill_slippage_bps_futures,
        InstrumentType::Option => config.fill_slippage_bps_options,
    };
    bps.clamp(5, 15)
}

/// Try to fill `order` against `instrument`'s current tick on the bus, subject to
/// `FILL_TICK_MAX_AGE_SECONDS`. A `MARKET` order carrying `exitReason = EXPIRY` fills at its
/// carried settlement price unconditionally, bypassing tick freshness entirely (§4.10).
pub fn resolve_fill(
    order: &Order,
    instrument: &Instrument,
    tick_bus: &TickBus,
    config: &CoreConfig,
    now_unix: i64,
) -> FillOutcome {
    use paper_integration::order::ExitReason;

    if order.exit_reason == Some(ExitReason::Expiry) {
        if let Some(settlement_price) = order.settlement_price {
            return FillOutcome::fill_at(settlement_price);
        }
    }

    let Some(tick) = tick_bus.latest(&order.instrument_key) else {
        return FillOutcome::no_fill();
    };

    let age = now_unix - tick.timestamp;
    if age < 0 || age as u64 > config.fill_tick_max_age_seconds {
        return FillOutcome::no_fill();
    }

    match order.order_type {
        OrderType::Market => {
            let bps = slippage_bps_for(instrument.instrument_type, config);
            let slippage = Decimal::new(bps as i64, 4);
            let slipped = match order.side {
                OrderSide::Buy => tick.price * (Decimal::ONE + slippage),
                OrderSide::Sell => tick.price * (Decimal::ONE - slippage),
            };
            let round_up = matches!(order.side, OrderSide::Buy);
            FillOutcome::fill_at(round_to_tick(slipped, instrument.tick_size, round_up))
        }
        OrderType::Limit => {
            let Some(limit_price) = order.limit_price else {
                return FillOutcome::no_fill();
            };

            let fills = match order.side {
                OrderSide::Buy => tick.price <= limit_price,
                OrderSide::Sell => tick.price >= limit_price,
            };
            if !fills {
                return FillOutcome::no_fill();
            }

            let round_up = matches!(order.side, OrderSide::Sell);
            FillOutcome::fill_at(round_to_tick(tick.price, instrument.tick_size, round_up))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use paper_instrument::{Exchange, InstrumentKey};
    use paper_integration::{accounts::UserId, order::OrderStatus};
    use rust_decimal_macros::dec;

    fn instrument() -> Instrument {
        Instrument {
            instrument_key: InstrumentKey::new("NSE_EQ|X"),
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

    fn market_order(side: OrderSide) -> Order {
        Order {
            id: crate::model::OrderId::random(),
            user_id: UserId::new("u1"),
            instrument_key: InstrumentKey::new("NSE_EQ|X"),
            side,
            quantity: dec!(10),
            order_type: OrderType::Market,
            limit_price: None,
            status: OrderStatus::Accepted,
            filled_qty: Decimal::ZERO,
            avg_fill_price: None,
            realized_pnl: None,
            idempotency_key: "order-1".into(),
            blocked_margin: None,
            settlement_price: None,
            exit_reason: None,
            created_at: Utc::now(),
            executed_at: None,
        }
    }

    fn publish_tick(bus: &TickBus, price: Decimal, timestamp: i64) {
        bus.publish(paper_data::NormalizedTick::new(
            InstrumentKey::new("NSE_EQ|X"),
            "X".into(),
            price,
            dec!(1),
            timestamp,
            Exchange::Nse,
            Some(dec!(100)),
        ));
    }

    #[test]
    fn market_buy_slips_up_and_rounds_away_from_the_taker() {
        let bus = TickBus::new();
        publish_tick(&bus, dec!(100), 1_000);

        let outcome = resolve_fill(&market_order(OrderSide::Buy), &instrument(), &bus, &CoreConfig::default(), 1_000);
        assert!(outcome.should_fill);
        // 100 * 1.0005 = 100.05, already on the tick grid.
        assert_eq!(outcome.fill_price, Some(dec!(100.05)));
    }

    #[test]
    fn market_sell_slips_down() {
        let bus = TickBus::new();
        publish_tick(&bus, dec!(100), 1_000);

        let outcome = resolve_fill(&market_order(OrderSide::Sell), &instrument(), &bus, &CoreConfig::default(), 1_000);
        assert!(outcome.should_fill);
        assert_eq!(outcome.fill_price, Some(dec!(99.95)));
    }

    #[test]
    fn stale_tick_beyond_max_age_does_not_fill() {
        let bus = TickBus::new();
        publish_tick(&bus, dec!(100), 0);

        let config = CoreConfig::default();
        let outcome = resolve_fill(
            &market_order(OrderSide::Buy),
            &instrument(),
            &bus,
            &config,
            config.fill_tick_max_age_seconds as i64 + 100,
        );
        assert!(!outcome.should_fill);
    }

    #[test]
    fn limit_buy_fills_only_when_tick_is_at_or_below_limit() {
        let bus = TickBus::new();
        publish_tick(&bus, dec!(101), 1_000);

        let mut order = market_order(OrderSide::Buy);
        order.order_type = OrderType::Limit;
        order.limit_price = Some(dec!(100));

        let outcome = resolve_fill(&order, &instrument(), &bus, &CoreConfig::default(), 1_000);
        assert!(!outcome.should_fill);

        publish_tick(&bus, dec!(99.97), 1_001);
        let outcome = resolve_fill(&order, &instrument(), &bus, &CoreConfig::default(), 1_001);
        assert!(outcome.should_fill);
        assert_eq!(outcome.fill_price, Some(dec!(99.95)));
    }

    #[test]
    fn expiry_settlement_ignores_tick_freshness() {
        let bus = TickBus::new();

        let mut order = market_order(OrderSide::Buy);
        order.exit_reason = Some(paper_integration::order::ExitReason::Expiry);
        order.settlement_price = Some(dec!(123.45));

        let outcome = resolve_fill(&order, &instrument(), &bus, &CoreConfig::default(), 1_000_000);
        assert_eq!(outcome.fill_price, Some(dec!(123.45)));
    }
}
