use paper_instrument::{Exchange, InstrumentKey};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A broker record normalized against the Instrument Store (§3 NormalizedTick). Timestamps are
/// seconds since the epoch and are expected to be monotonic per instrument under normal operation;
/// consumers that maintain per-instrument state (the Candle Engine) discard ticks older than their
/// own current bucket rather than trusting global ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTick {
    pub instrument_key: InstrumentKey,
    pub symbol: SmolStr,
    pub price: Decimal,
    pub volume: Decimal,
    pub timestamp: i64,
    pub exchange: Exchange,
    pub prev_close: Option<Decimal>,
}

impl NormalizedTick {
    pub fn new(
        instrument_key: InstrumentKey,
        symbol: SmolStr,
        price: Decimal,
        volume: Decimal,
        timestamp: i64,
        exchange: Exchange,
        prev_close: Option<Decimal>,
    ) -> Self {
        Self {
            instrument_key,
            symbol,
            price,
            volume,
            timestamp,
            exchange,
            prev_close,
        }
    }
}

/// A broker record carrying its wire identifier (ISIN or contract code) prior to instrument
/// resolution (§4.3 "Normalization").
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerRecord {
    pub wire_id: SmolStr,
    pub last_price: Decimal,
    pub close_price: Decimal,
    pub volume: Decimal,
    pub timestamp: i64,
}
