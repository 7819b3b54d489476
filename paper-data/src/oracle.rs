use std::time::Duration;

use paper_instrument::{InstrumentKey, InstrumentStore};
use rust_decimal::Decimal;

use crate::{bus::TickBus, error::DataError, health::FeedHealthMonitor};

/// Default bound on tick/last-known staleness before the Price Oracle falls through to the next
/// resolution step (§4.5, `FEED_MAX_TICK_AGE_MS`).
pub const FEED_MAX_TICK_AGE: Duration = Duration::from_millis(5000);

/// Deterministic fallback used only when `simulation_mode` is enabled, keyed by instrument so
/// repeated calls for the same instrument walk a stable, seeded sequence rather than jumping
/// around arbitrarily (§4.5 step 4, "deterministic simulation oracle").
fn simulated_walk(key: &InstrumentKey, seed_price: Decimal) -> Decimal {
    let mut hash: u64 = 1469598103934665603;
    for byte in key.as_str().as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }

    let step = ((hash % 21) as i64) - 10;
    let drift = Decimal::new(step, 4);
    (seed_price * (Decimal::ONE + drift)).max(Decimal::new(1, 2))
}

/// Resolves a best-effort reference price for an instrument by walking the fallback chain defined
/// in §4.5: a fresh Tick Bus cache entry, then the Feed Health Monitor's last-known price, then the
/// Instrument Store's previous close, and finally (only in simulation mode) a deterministic
/// random-walk oracle. Returns [`DataError::NoReferencePrice`] if every step is exhausted.
pub struct PriceOracle<'a> {
    tick_bus: &'a TickBus,
    health: &'a FeedHealthMonitor,
    instruments: &'a InstrumentStore,
    max_age: Duration,
    simulation_mode: bool,
}

impl<'a> PriceOracle<'a> {
    pub fn new(
        tick_bus: &'a TickBus,
        health: &'a FeedHealthMonitor,
        instruments: &'a InstrumentStore,
        simulation_mode: bool,
    ) -> Self {
        Self {
            tick_bus,
            health,
            instruments,
            max_age: FEED_MAX_TICK_AGE,
            simulation_mode,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// `now_unix` is compared against the cached tick's own `timestamp` field (as
    /// `resolve_fill` compares against `FILL_TICK_MAX_AGE_SECONDS`): a tick older than
    /// `self.max_age` is not fresh enough for step 1 and falls through to the Feed Health
    /// Monitor's bounded last-known price instead (§4.5 steps 1-2).
    pub fn best_price(&self, key: &InstrumentKey, now_unix: i64) -> Result<Decimal, DataError> {
        if let Some(tick) = self.tick_bus.latest(key) {
            let age_seconds = now_unix - tick.timestamp;
            if age_seconds >= 0 && age_seconds as u64 <= self.max_age.as_secs() {
                return Ok(tick.price);
            }
        }

        if let Some(price) = self.health.last_price(key, self.max_age) {
            return Ok(price);
        }

        let instrument = self.instruments.by_key(key);
        if let Ok(instrument) = instrument {
            if let Some(prev_close) = instrument.prev_close {
                return Ok(prev_close);
            }

            if self.simulation_mode {
                return Ok(simulated_walk(key, Decimal::ONE));
            }
        }

        Err(DataError::NoReferencePrice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paper_instrument::{Exchange, Instrument, InstrumentType};
    use rust_decimal_macros::dec;

    fn instrument(key: &str, prev_close: Option<Decimal>) -> Instrument {
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
            prev_close,
        }
    }

    #[test]
    fn prefers_a_fresh_tick_over_every_other_source() {
        let bus = TickBus::new();
        let health = FeedHealthMonitor::new(Duration::from_secs(5), 0.5, 3);
        let store = InstrumentStore::new();
        store
            .load(vec![instrument("NSE_EQ|X", Some(dec!(50)))])
            .unwrap();

        bus.publish(crate::tick::NormalizedTick::new(
            InstrumentKey::new("NSE_EQ|X"),
            "X".into(),
            dec!(123.45),
            dec!(1),
            1_700_000_000,
            Exchange::Nse,
            Some(dec!(50)),
        ));

        let oracle = PriceOracle::new(&bus, &health, &store, false);
        assert_eq!(
            oracle
                .best_price(&InstrumentKey::new("NSE_EQ|X"), 1_700_000_002)
                .unwrap(),
            dec!(123.45)
        );
    }

    #[test]
    fn stale_tick_falls_through_to_feed_health_last_known_price() {
        let bus = TickBus::new();
        let health = FeedHealthMonitor::new(Duration::from_secs(5), 0.5, 3);
        let store = InstrumentStore::new();
        store
            .load(vec![instrument("NSE_EQ|X", Some(dec!(50)))])
            .unwrap();

        let key = InstrumentKey::new("NSE_EQ|X");
        let health_tick = crate::tick::NormalizedTick::new(
            key.clone(),
            "X".into(),
            dec!(200),
            dec!(1),
            1_700_000_000,
            Exchange::Nse,
            Some(dec!(50)),
        );
        crate::bus::TickHandler::on_tick(&health, &health_tick);
        bus.publish(crate::tick::NormalizedTick::new(
            key.clone(),
            "X".into(),
            dec!(123.45),
            dec!(1),
            1_700_000_000,
            Exchange::Nse,
            Some(dec!(50)),
        ));

        let oracle = PriceOracle::new(&bus, &health, &store, false);
        assert_eq!(
            oracle.best_price(&key, 1_700_000_000 + 6).unwrap(),
            dec!(200)
        );
    }

    #[test]
    fn falls_back_to_prev_close_when_no_tick_or_last_known_price() {
        let bus = TickBus::new();
        let health = FeedHealthMonitor::new(Duration::from_secs(5), 0.5, 3);
        let store = InstrumentStore::new();
        store
            .load(vec![instrument("NSE_EQ|X", Some(dec!(50)))])
            .unwrap();

        let oracle = PriceOracle::new(&bus, &health, &store, false);
        assert_eq!(
            oracle
                .best_price(&InstrumentKey::new("NSE_EQ|X"), 1_700_000_000)
                .unwrap(),
            dec!(50)
        );
    }

    #[test]
    fn fails_with_no_reference_price_when_every_source_is_exhausted() {
        let bus = TickBus::new();
        let health = FeedHealthMonitor::new(Duration::from_secs(5), 0.5, 3);
        let store = InstrumentStore::new();
        store.load(vec![instrument("NSE_EQ|X", None)]).unwrap();

        let oracle = PriceOracle::new(&bus, &health, &store, false);
        let err = oracle
            .best_price(&InstrumentKey::new("NSE_EQ|X"), 1_700_000_000)
            .unwrap_err();
        assert_eq!(err.code(), "NO_REFERENCE_PRICE");
    }

    #[test]
    fn simulation_mode_synthesizes_a_price_when_nothing_else_resolves() {
        let bus = TickBus::new();
        let health = FeedHealthMonitor::new(Duration::from_secs(5), 0.5, 3);
        let store = InstrumentStore::new();
        store.load(vec![instrument("NSE_EQ|X", None)]).unwrap();

        let oracle = PriceOracle::new(&bus, &health, &store, true);
        let price = oracle
            .best_price(&InstrumentKey::new("NSE_EQ|X"), 1_700_000_000)
            .unwrap();
        assert!(price > Decimal::ZERO);
    }
}
