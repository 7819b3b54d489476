use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use smol_str::SmolStr;

use crate::{
    error::InstrumentError,
    model::{Instrument, InstrumentKey, OptionType},
};

/// Composite lookup key for derivative chains: `(underlying, expiry, optionType, strike)`.
/// `expiry` is stored as the RFC3339 date string rather than `DateTime<Utc>` so the key derives
/// `Eq`/`Hash` without pulling `chrono`'s non-trivial equality semantics into a hot lookup path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainKey {
    pub underlying: SmolStr,
    pub expiry: Option<String>,
    pub option_type: Option<OptionType>,
    pub strike: Option<String>,
}

/// An immutable point-in-time view of every active instrument, indexed three ways. Replacing the
/// `Arc<Snapshot>` pointer atomically is what lets [`InstrumentStore::refresh`] publish a new
/// generation without readers ever blocking (§4.1).
#[derive(Debug, Default)]
struct Snapshot {
    by_key: HashMap<InstrumentKey, Arc<Instrument>>,
    by_symbol: HashMap<SmolStr, Arc<Instrument>>,
    by_chain: HashMap<ChainKey, Vec<Arc<Instrument>>>,
    by_wire_id: HashMap<SmolStr, Arc<Instrument>>,
}

/// Extract the broker wire identifier (ISIN for NSE_EQ, exchange contract code otherwise) from an
/// `instrumentKey` of the form `<exchange>_<segment>|<wireId>`.
fn wire_id(key: &InstrumentKey) -> Option<SmolStr> {
    key.as_str().split_once('|').map(|(_, id)| SmolStr::new(id))
}

impl Snapshot {
    fn build(instruments: Vec<Instrument>) -> Result<Self, InstrumentError> {
        let mut by_key = HashMap::with_capacity(instruments.len());
        let mut by_symbol = HashMap::with_capacity(instruments.len());
        let mut by_chain: HashMap<ChainKey, Vec<Arc<Instrument>>> = HashMap::new();
        let mut by_wire_id = HashMap::with_capacity(instruments.len());

        for instrument in instruments {
            let key = instrument.instrument_key.clone();
            if by_key.contains_key(&key) {
                return Err(InstrumentError::DuplicateKey(key.as_str().to_string()));
            }

            let instrument = Arc::new(instrument);
            by_symbol.insert(instrument.trading_symbol.clone(), Arc::clone(&instrument));

            if let Some(wire_id) = wire_id(&key) {
                by_wire_id.insert(wire_id, Arc::clone(&instrument));
            }

            let chain_key = ChainKey {
                underlying: instrument.underlying.clone(),
                expiry: instrument.expiry.map(|e| e.to_rfc3339()),
                option_type: instrument.option_type,
                strike: instrument.strike.map(|s| s.to_string()),
            };
            by_chain.entry(chain_key).or_default().push(Arc::clone(&instrument));

            by_key.insert(key, instrument);
        }

        Ok(Self {
            by_key,
            by_symbol,
            by_chain,
            by_wire_id,
        })
    }
}

/// In-memory canonical registry of tradable contracts (§4.1). Bulk-loaded at boot, refreshed on
/// demand, never mutated in place: a refresh builds a brand new [`Snapshot`] and swaps the
/// `Arc` under a write lock, so in-flight readers holding a cloned `Arc<Snapshot>` keep seeing a
/// fully consistent prior generation.
#[derive(Debug, Default)]
pub struct InstrumentStore {
    snapshot: RwLock<Option<Arc<Snapshot>>>,
}

impl InstrumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load instruments, replacing any existing snapshot. Fails if two instruments in the
    /// batch share an `instrumentKey`.
    pub fn load(&self, instruments: Vec<Instrument>) -> Result<(), InstrumentError> {
        let snapshot = Snapshot::build(instruments)?;
        *self.snapshot.write() = Some(Arc::new(snapshot));
        Ok(())
    }

    /// Alias for [`Self::load`] used when a scheduled refresh replaces the whole registry.
    pub fn refresh(&self, instruments: Vec<Instrument>) -> Result<(), InstrumentError> {
        self.load(instruments)
    }

    fn current(&self) -> Result<Arc<Snapshot>, InstrumentError> {
        self.snapshot
            .read()
            .as_ref()
            .cloned()
            .ok_or(InstrumentError::NotReady)
    }

    /// Resolve an instrument by its `instrumentKey` or `tradingSymbol`, whichever matches first.
    pub fn resolve(&self, symbol_or_key: &str) -> Result<Arc<Instrument>, InstrumentError> {
        let snapshot = self.current()?;

        if let Some(instrument) = snapshot.by_key.get(&InstrumentKey::new(symbol_or_key)) {
            return Ok(Arc::clone(instrument));
        }

        snapshot
            .by_symbol
            .get(symbol_or_key)
            .cloned()
            .ok_or_else(|| InstrumentError::NotFound(symbol_or_key.to_string()))
    }

    /// Resolve an instrument by the wire identifier a broker frame carries (§4.3 normalization:
    /// "maps each inbound record to a `NormalizedTick` via the Instrument Store (ISIN →
    /// instrumentKey/tradingSymbol)"). Records whose wire id doesn't resolve are counted and
    /// dropped by the caller, not treated as a hard error here.
    pub fn resolve_wire_id(&self, wire_id: &str) -> Result<Arc<Instrument>, InstrumentError> {
        self.current()?
            .by_wire_id
            .get(wire_id)
            .cloned()
            .ok_or_else(|| InstrumentError::NotFound(wire_id.to_string()))
    }

    pub fn by_key(&self, key: &InstrumentKey) -> Result<Arc<Instrument>, InstrumentError> {
        self.current()?
            .by_key
            .get(key)
            .cloned()
            .ok_or_else(|| InstrumentError::NotFound(key.as_str().to_string()))
    }

    /// All instruments for an option/future chain matching the composite key.
    pub fn chain(&self, key: &ChainKey) -> Result<Vec<Arc<Instrument>>, InstrumentError> {
        Ok(self
            .current()?
            .by_chain
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    pub fn len(&self) -> usize {
        self.snapshot
            .read()
            .as_ref()
            .map(|s| s.by_key.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Exchange, InstrumentType};
    use rust_decimal_macros::dec;

    fn equity(key: &str, symbol: &str) -> Instrument {
        Instrument {
            instrument_key: InstrumentKey::new(key),
            trading_symbol: symbol.into(),
            name: symbol.into(),
            underlying: symbol.into(),
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
    fn not_ready_before_first_load() {
        let store = InstrumentStore::new();
        assert_eq!(store.resolve("RELIANCE"), Err(InstrumentError::NotReady));
    }

    #[test]
    fn resolves_by_key_and_symbol() {
        let store = InstrumentStore::new();
        store
            .load(vec![equity("NSE_EQ|INE002A01018", "RELIANCE")])
            .unwrap();

        assert_eq!(
            store.resolve("RELIANCE").unwrap().instrument_key.as_str(),
            "NSE_EQ|INE002A01018"
        );
        assert_eq!(
            store.resolve("NSE_EQ|INE002A01018").unwrap().trading_symbol,
            "RELIANCE"
        );
    }

    #[test]
    fn rejects_duplicate_keys_in_a_single_load() {
        let store = InstrumentStore::new();
        let result = store.load(vec![
            equity("NSE_EQ|DUP", "A"),
            equity("NSE_EQ|DUP", "B"),
        ]);
        assert!(matches!(result, Err(InstrumentError::DuplicateKey(_))));
    }

    #[test]
    fn resolves_by_wire_id() {
        let store = InstrumentStore::new();
        store
            .load(vec![equity("NSE_EQ|INE002A01018", "RELIANCE")])
            .unwrap();

        assert_eq!(
            store.resolve_wire_id("INE002A01018").unwrap().trading_symbol,
            "RELIANCE"
        );
        assert!(matches!(
            store.resolve_wire_id("UNKNOWN"),
            Err(InstrumentError::NotFound(_))
        ));
    }

    #[test]
    fn refresh_replaces_prior_snapshot_atomically() {
        let store = InstrumentStore::new();
        store
            .load(vec![equity("NSE_EQ|INE002A01018", "RELIANCE")])
            .unwrap();

        store
            .refresh(vec![equity("NSE_EQ|INE467B01029", "TCS")])
            .unwrap();

        assert!(store.resolve("RELIANCE").is_err());
        assert!(store.resolve("TCS").is_ok());
    }
}
