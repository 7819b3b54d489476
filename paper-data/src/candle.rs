use std::collections::HashMap;

use paper_instrument::InstrumentKey;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::tick::NormalizedTick;

/// An interval-aligned OHLCV bar (§3 Candle). `low ≤ open,close ≤ high` and `openTime` is a
/// multiple of the aggregator's interval for the whole lifetime of the candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Whether a tick produced a brand new bar or extended the current one (§4.4 step 3 vs 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleEventKind {
    New,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandleEvent {
    pub kind: CandleEventKind,
    pub candle: Candle,
}

#[derive(Debug, Clone, Copy)]
struct SeriesState {
    current: Candle,
    last_bucket: i64,
}

/// Per-`(instrumentKey, intervalSeconds)` isolated OHLCV aggregator (§4.4). Every series is
/// independent: no ordering guarantee holds across instruments or across intervals, only strict
/// monotonicity of `openTime` within one series.
#[derive(Default)]
pub struct CandleEngine {
    series: RwLock<HashMap<(InstrumentKey, u64), SeriesState>>,
}

impl CandleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a tick into the series for `(tick.instrument_key, interval_seconds)`, returning the
    /// resulting candle event, or `None` if the tick was discarded as stale (§4.4 step 4).
    pub fn on_tick(&self, tick: &NormalizedTick, interval_seconds: u64) -> Option<CandleEvent> {
        let bucket = tick.timestamp.div_euclid(interval_seconds as i64);
        let aligned_time = bucket * interval_seconds as i64;

        let mut series = self.series.write();
        let key = (tick.instrument_key.clone(), interval_seconds);

        match series.get_mut(&key) {
            None => {
                let candle = Candle {
                    open_time: aligned_time,
                    open: tick.price,
                    high: tick.price,
                    low: tick.price,
                    close: tick.price,
                    volume: Decimal::ZERO,
                };
                series.insert(
                    key,
                    SeriesState {
                        current: candle,
                        last_bucket: bucket,
                    },
                );
                Some(CandleEvent {
                    kind: CandleEventKind::New,
                    candle,
                })
            }
            Some(state) if bucket > state.last_bucket => {
                if bucket - state.last_bucket > 5 {
                    warn!(
                        instrument = %tick.instrument_key.as_str(),
                        interval_seconds,
                        gap_buckets = bucket - state.last_bucket,
                        "candle gap detected"
                    );
                }

                let candle = Candle {
                    open_time: aligned_time,
                    open: tick.price,
                    high: tick.price,
                    low: tick.price,
                    close: tick.price,
                    volume: Decimal::ZERO,
                };
                state.current = candle;
                state.last_bucket = bucket;
                Some(CandleEvent {
                    kind: CandleEventKind::New,
                    candle,
                })
            }
            Some(state) if tick.timestamp < state.current.open_time => None,
            Some(state) => {
                state.current.close = tick.price;
                state.current.high = state.current.high.max(tick.price);
                state.current.low = state.current.low.min(tick.price);
                state.current.volume += tick.volume;
                Some(CandleEvent {
                    kind: CandleEventKind::Update,
                    candle: state.current,
                })
            }
        }
    }

    /// Clear state for every interval of `instrument_key`, or just `interval_seconds` if given
    /// (§4.4 "Reset API clears per-instrument or per-(instrument, interval) state").
    pub fn reset(&self, instrument_key: &InstrumentKey, interval_seconds: Option<u64>) {
        let mut series = self.series.write();
        match interval_seconds {
            Some(interval) => {
                series.remove(&(instrument_key.clone(), interval));
            }
            None => {
                series.retain(|(key, _), _| key != instrument_key);
            }
        }
    }

    pub fn current(&self, instrument_key: &InstrumentKey, interval_seconds: u64) -> Option<Candle> {
        self.series
            .read()
            .get(&(instrument_key.clone(), interval_seconds))
            .map(|state| state.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paper_instrument::Exchange;
    use rust_decimal_macros::dec;

    fn tick(ts: i64, price: Decimal) -> NormalizedTick {
        NormalizedTick::new(
            InstrumentKey::new("NSE_EQ|X"),
            "X".into(),
            price,
            dec!(10),
            ts,
            Exchange::Nse,
            Some(dec!(100)),
        )
    }

    #[test]
    fn first_tick_opens_a_new_candle() {
        let engine = CandleEngine::new();
        let event = engine.on_tick(&tick(1000, dec!(100)), 60).unwrap();

        assert_eq!(event.kind, CandleEventKind::New);
        assert_eq!(event.candle.open_time, 960);
        assert_eq!(event.candle.open, dec!(100));
        assert_eq!(event.candle.close, dec!(100));
    }

    #[test]
    fn tick_within_bucket_updates_high_low_close_and_volume() {
        let engine = CandleEngine::new();
        engine.on_tick(&tick(1000, dec!(100)), 60).unwrap();

        let event = engine.on_tick(&tick(1010, dec!(105)), 60).unwrap();
        assert_eq!(event.kind, CandleEventKind::Update);
        assert_eq!(event.candle.high, dec!(105));
        assert_eq!(event.candle.low, dec!(100));
        assert_eq!(event.candle.close, dec!(105));
        assert_eq!(event.candle.volume, dec!(10));
    }

    #[test]
    fn tick_in_next_bucket_emits_a_new_candle_with_strictly_increasing_open_time() {
        let engine = CandleEngine::new();
        let first = engine.on_tick(&tick(1000, dec!(100)), 60).unwrap();
        let second = engine.on_tick(&tick(1065, dec!(110)), 60).unwrap();

        assert_eq!(second.kind, CandleEventKind::New);
        assert!(second.candle.open_time > first.candle.open_time);
        assert_eq!(second.candle.open, dec!(110));
    }

    #[test]
    fn stale_tick_is_discarded() {
        let engine = CandleEngine::new();
        engine.on_tick(&tick(1065, dec!(110)), 60).unwrap();
        let discarded = engine.on_tick(&tick(1000, dec!(90)), 60);

        assert!(discarded.is_none());
    }

    #[test]
    fn reset_clears_a_specific_interval_but_not_others() {
        let engine = CandleEngine::new();
        let key = InstrumentKey::new("NSE_EQ|X");
        engine.on_tick(&tick(1000, dec!(100)), 60).unwrap();
        engine.on_tick(&tick(1000, dec!(100)), 300).unwrap();

        engine.reset(&key, Some(60));

        assert!(engine.current(&key, 60).is_none());
        assert!(engine.current(&key, 300).is_some());
    }
}
