use std::{
    collections::{HashMap, HashSet},
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use paper_instrument::InstrumentKey;
use paper_integration::metrics::Counters;
use parking_lot::RwLock;
use tracing::error;

use crate::tick::NormalizedTick;

/// Callback registered with a [`TickBus`]. Implementations must not block - the bus invokes every
/// handler synchronously during [`TickBus::flush`] (§4.2).
pub trait TickHandler: Send + Sync {
    fn on_tick(&self, tick: &NormalizedTick);
}

impl<F> TickHandler for F
where
    F: Fn(&NormalizedTick) + Send + Sync,
{
    fn on_tick(&self, tick: &NormalizedTick) {
        self(tick)
    }
}

/// Opaque handle returned by [`TickBus::subscribe`], used to [`TickBus::unsubscribe`] later.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubscriptionId(u64);

/// Single-writer, multi-subscriber tick broadcaster (§4.2). `publish` is non-blocking: it only
/// updates the `latestByInstrument` map and marks the instrument dirty. Delivery to subscribers
/// happens on [`TickBus::flush`], which the Broker Adapter's cooperative loop calls on every
/// scheduling boundary - concurrent publishes for the same instrument between flushes coalesce
/// into "latest wins".
pub struct TickBus {
    latest: RwLock<HashMap<InstrumentKey, NormalizedTick>>,
    dirty: RwLock<HashSet<InstrumentKey>>,
    subscribers: RwLock<Vec<(SubscriptionId, Arc<dyn TickHandler>)>>,
    next_subscription_id: AtomicU64,
    counters: Counters,
}

impl Default for TickBus {
    fn default() -> Self {
        Self::new()
    }
}

impl TickBus {
    pub fn new() -> Self {
        Self {
            latest: RwLock::new(HashMap::new()),
            dirty: RwLock::new(HashSet::new()),
            subscribers: RwLock::new(Vec::new()),
            next_subscription_id: AtomicU64::new(1),
            counters: Counters::new(),
        }
    }

    /// Update `latestByInstrument` and mark the instrument dirty for the next flush. Counts the
    /// tick for observability immediately; delivery to subscribers is deferred to [`Self::flush`].
    pub fn publish(&self, tick: NormalizedTick) {
        let key = tick.instrument_key.clone();
        self.counters.incr(&format!("tick.{}", key.as_str()));
        self.latest.write().insert(key.clone(), tick);
        self.dirty.write().insert(key);
    }

    pub fn subscribe(&self, handler: Arc<dyn TickHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, handler));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.write().retain(|(sub_id, _)| *sub_id != id);
    }

    /// Deliver the current dirty set to every subscriber exactly once per instrument, then clear
    /// it. A handler that panics is isolated: the panic is caught and logged so the remaining
    /// handlers still receive the batch (§4.2 "Handler exceptions are isolated").
    pub fn flush(&self) {
        let dirty_keys: Vec<InstrumentKey> = {
            let mut dirty = self.dirty.write();
            dirty.drain().collect()
        };

        if dirty_keys.is_empty() {
            return;
        }

        let ticks: Vec<NormalizedTick> = {
            let latest = self.latest.read();
            dirty_keys
                .iter()
                .filter_map(|key| latest.get(key).cloned())
                .collect()
        };

        let subscribers = self.subscribers.read().clone();
        for tick in &ticks {
            for (_, handler) in &subscribers {
                let handler = AssertUnwindSafe(handler.as_ref());
                if std::panic::catch_unwind(|| handler.0.on_tick(tick)).is_err() {
                    error!(instrument = %tick.instrument_key.as_str(), "tick bus subscriber panicked");
                }
            }
        }
    }

    pub fn latest(&self, key: &InstrumentKey) -> Option<NormalizedTick> {
        self.latest.read().get(key).cloned()
    }

    pub fn stats(&self) -> HashMap<String, u64> {
        self.counters.snapshot()
    }

    pub fn reset(&self) {
        self.latest.write().clear();
        self.dirty.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paper_instrument::Exchange;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;

    fn tick(key: &str, price: rust_decimal::Decimal) -> NormalizedTick {
        NormalizedTick::new(
            InstrumentKey::new(key),
            key.into(),
            price,
            dec!(1),
            1_700_000_000,
            Exchange::Nse,
            Some(dec!(100)),
        )
    }

    #[test]
    fn publish_coalesces_until_flush() {
        let bus = TickBus::new();
        bus.publish(tick("NSE_EQ|X", dec!(100)));
        bus.publish(tick("NSE_EQ|X", dec!(101)));

        assert_eq!(bus.latest(&InstrumentKey::new("NSE_EQ|X")).unwrap().price, dec!(101));
    }

    #[test]
    fn flush_delivers_exactly_once_per_dirty_instrument() {
        let bus = TickBus::new();
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = Arc::clone(&received);

        bus.subscribe(Arc::new(move |_: &NormalizedTick| {
            received_clone.fetch_add(1, Ordering::SeqCst);
        }));

        bus.publish(tick("NSE_EQ|X", dec!(100)));
        bus.publish(tick("NSE_EQ|X", dec!(101)));
        bus.flush();

        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn a_panicking_handler_does_not_block_other_handlers() {
        let bus = TickBus::new();
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = Arc::clone(&received);

        bus.subscribe(Arc::new(|_: &NormalizedTick| panic!("boom")));
        bus.subscribe(Arc::new(move |_: &NormalizedTick| {
            received_clone.fetch_add(1, Ordering::SeqCst);
        }));

        bus.publish(tick("NSE_EQ|X", dec!(100)));
        bus.flush();

        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribed_handler_receives_nothing() {
        let bus = TickBus::new();
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = Arc::clone(&received);

        let id = bus.subscribe(Arc::new(move |_: &NormalizedTick| {
            received_clone.fetch_add(1, Ordering::SeqCst);
        }));
        bus.unsubscribe(id);

        bus.publish(tick("NSE_EQ|X", dec!(100)));
        bus.flush();

        assert_eq!(received.load(Ordering::SeqCst), 0);
    }
}
