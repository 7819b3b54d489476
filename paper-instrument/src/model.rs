use chrono::{DateTime, Utc};
use derive_more::{Display, From};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Exchange-qualified opaque instrument identifier, e.g. `NSE_EQ|INE002A01018` or
/// `NSE_INDEX|Nifty 50` (§3 Instrument). Kept as a `SmolStr` newtype so it is cheap to clone and
/// use as a hash map key across every component that carries it (Tick Bus, Candle Engine, Ledger
/// references, ...).
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, From, Serialize, Deserialize,
)]
pub struct InstrumentKey(pub SmolStr);

impl InstrumentKey {
    pub fn new(key: impl Into<SmolStr>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for InstrumentKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The venue an instrument or tick originates from.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, Serialize, Deserialize,
)]
pub enum Exchange {
    #[display("NSE")]
    Nse,
    #[display("BSE")]
    Bse,
    #[display("MCX")]
    Mcx,
}

/// Segment/asset-class classification (§3 `instrumentType`).
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, Serialize, Deserialize,
)]
pub enum InstrumentType {
    Equity,
    Index,
    Future,
    Option,
}

impl InstrumentType {
    pub fn is_derivative(&self) -> bool {
        matches!(self, InstrumentType::Future | InstrumentType::Option)
    }
}

/// Option right, only meaningful when [`InstrumentType::Option`].
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, Serialize, Deserialize,
)]
pub enum OptionType {
    #[display("CE")]
    Ce,
    #[display("PE")]
    Pe,
}

/// Canonical contract metadata (§3 Instrument). `instrumentKey` is unique across the store and
/// `tickSize`/`lotSize` are immutable for the instrument's lifetime - once constructed, an
/// `Instrument` is never mutated, only replaced wholesale on a store refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub instrument_key: InstrumentKey,
    pub trading_symbol: SmolStr,
    pub name: SmolStr,
    pub underlying: SmolStr,
    pub segment: SmolStr,
    pub exchange: Exchange,
    pub instrument_type: InstrumentType,
    pub option_type: Option<OptionType>,
    pub strike: Option<Decimal>,
    pub expiry: Option<DateTime<Utc>>,
    pub tick_size: Decimal,
    pub lot_size: u32,
    pub prev_close: Option<Decimal>,
}

impl Instrument {
    /// Days to expiry as whole IST calendar days (§4.9 expiry guard). `None` for instruments
    /// without an expiry (equities, indices).
    pub fn days_to_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        let ist_offset = chrono::Duration::minutes(330);
        self.expiry.map(|expiry| {
            let ist_now = (now + ist_offset).date_naive();
            let ist_expiry = (expiry + ist_offset).date_naive();
            (ist_expiry - ist_now).num_days()
        })
    }

    /// Required margin rate for opening/increasing exposure in this instrument (§4.9).
    pub fn margin_notional_multiplier(&self, is_option_buy: bool) -> Decimal {
        use rust_decimal_macros::dec;
        match self.instrument_type {
            InstrumentType::Future => dec!(0.15),
            InstrumentType::Option if is_option_buy => dec!(1.0),
            InstrumentType::Option => dec!(1.2),
            InstrumentType::Equity | InstrumentType::Index => dec!(1.0),
        }
    }
}
