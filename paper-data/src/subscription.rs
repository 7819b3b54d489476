use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use derive_more::{Display, From};
use paper_instrument::InstrumentKey;
use parking_lot::{Mutex, RwLock};
use smol_str::SmolStr;
use tokio::sync::Notify;
use tracing::debug;

use crate::{broker::BrokerAdapter, bus::TickHandler, tick::NormalizedTick};

/// Heartbeat cadence for an idle SSE connection (§4.13).
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Outbound coalescing flush cadence (§4.13 "flush every 25 ms").
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(25);

/// Opaque identifier for a connected SSE client.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, From)]
pub struct ClientId(pub SmolStr);

impl ClientId {
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    pub fn random() -> Self {
        Self(paper_integration::id::random_id())
    }
}

/// One outbound event of the market stream contract (§4.13).
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Connected,
    Tick(NormalizedTick),
    Heartbeat,
}

/// Bounded, drop-oldest outbound queue for one client connection (§5 "bounded per-connection send
/// queue, dropped-oldest policy; clients that cannot keep up are dropped after queue fills beyond
/// a threshold"). A transport layer (HTTP/SSE handler) drains this with [`Self::recv`].
pub struct ClientOutbox {
    events: Mutex<VecDeque<SseEvent>>,
    notify: Notify,
    max_len: usize,
    dropped: AtomicU64,
}

impl ClientOutbox {
    fn new(max_len: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_len.min(64))),
            notify: Notify::new(),
            max_len,
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, event: SseEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_len {
            events.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        events.push_back(event);
        drop(events);
        self.notify.notify_one();
    }

    /// Await the next queued event. Transport layers call this in a loop to stream events to the
    /// client.
    pub async fn recv(&self) -> SseEvent {
        loop {
            if let Some(event) = self.events.lock().pop_front() {
                return event;
            }
            self.notify.notified().await;
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

struct ClientState {
    interests: RwLock<HashSet<InstrumentKey>>,
    pending_ticks: Mutex<HashMap<InstrumentKey, NormalizedTick>>,
    outbox: Arc<ClientOutbox>,
}

/// Threshold (in units of `max_outbox_len`) of cumulative drops beyond which a client is
/// considered unable to keep up and is forcibly disconnected (§5).
const DROP_DISCONNECT_MULTIPLE: u64 = 3;

/// Demand-driven upstream subscription management plus per-client SSE-style outbound fan-out
/// (§4.13). Registers itself as a [`TickHandler`] on the Tick Bus; on every tick it coalesces the
/// latest value per instrument into each interested client's buffer, and a cooperative flush loop
/// (driven by the composition root, see [`Self::flush_all`]) pushes the coalesced batch onward
/// every [`FLUSH_INTERVAL`].
pub struct SubscriptionBroker {
    adapter: Arc<BrokerAdapter>,
    clients: RwLock<HashMap<ClientId, ClientState>>,
    max_outbox_len: usize,
}

impl SubscriptionBroker {
    pub fn new(adapter: Arc<BrokerAdapter>) -> Self {
        Self {
            adapter,
            clients: RwLock::new(HashMap::new()),
            max_outbox_len: 256,
        }
    }

    /// Register a new client connection, bootstrap-subscribing it to the three index
    /// instruments, its watchlist, and its open-position instruments in one combined demand
    /// increment (§4.13 "On connect"). Returns the client's outbox, already carrying the initial
    /// `{type:"connected"}` event.
    pub fn connect(
        &self,
        client_id: ClientId,
        index_instruments: &[InstrumentKey],
        watchlist: &[InstrumentKey],
        open_positions: &[InstrumentKey],
    ) -> Arc<ClientOutbox> {
        let interests: HashSet<InstrumentKey> = index_instruments
            .iter()
            .chain(watchlist)
            .chain(open_positions)
            .cloned()
            .collect();

        let combined: Vec<InstrumentKey> = interests.iter().cloned().collect();
        self.adapter.subscribe(&combined);

        let outbox = Arc::new(ClientOutbox::new(self.max_outbox_len));
        outbox.push(SseEvent::Connected);

        self.clients.write().insert(
            client_id,
            ClientState {
                interests: RwLock::new(interests),
                pending_ticks: Mutex::new(HashMap::new()),
                outbox: Arc::clone(&outbox),
            },
        );

        outbox
    }

    /// Side-channel demand mutation: add interest without reconnecting (§4.13 "dynamic interest
    /// is added via a side-channel subscribe API that mutates the reference counts").
    pub fn subscribe(&self, client_id: &ClientId, keys: &[InstrumentKey]) {
        let clients = self.clients.read();
        let Some(client) = clients.get(client_id) else {
            return;
        };

        let newly_added: Vec<InstrumentKey> = {
            let mut interests = client.interests.write();
            keys.iter()
                .filter(|key| interests.insert((*key).clone()))
                .cloned()
                .collect()
        };

        if !newly_added.is_empty() {
            self.adapter.subscribe(&newly_added);
        }
    }

    pub fn unsubscribe(&self, client_id: &ClientId, keys: &[InstrumentKey]) {
        let clients = self.clients.read();
        let Some(client) = clients.get(client_id) else {
            return;
        };

        let newly_removed: Vec<InstrumentKey> = {
            let mut interests = client.interests.write();
            keys.iter()
                .filter(|key| interests.remove(*key))
                .cloned()
                .collect()
        };

        if !newly_removed.is_empty() {
            self.adapter.unsubscribe(&newly_removed);
        }
    }

    /// Drop a client's subscription counts and release its buffers (§4.13 "On client abort").
    pub fn disconnect(&self, client_id: &ClientId) {
        let Some(client) = self.clients.write().remove(client_id) else {
            return;
        };

        let keys: Vec<InstrumentKey> = client.interests.read().iter().cloned().collect();
        self.adapter.unsubscribe(&keys);
    }

    /// Push a tick into every interested client's coalescing buffer ("latest wins" until the
    /// next flush). Called once per tick the Subscription Broker observes via its Tick Bus
    /// subscription.
    fn observe(&self, tick: &NormalizedTick) {
        for client in self.clients.read().values() {
            if client.interests.read().contains(&tick.instrument_key) {
                client
                    .pending_ticks
                    .lock()
                    .insert(tick.instrument_key.clone(), tick.clone());
            }
        }
    }

    /// Drain every client's coalesced buffer and push the resulting `Tick` events to its outbox,
    /// disconnecting any client whose outbox has dropped more than
    /// `max_outbox_len * DROP_DISCONNECT_MULTIPLE` events (§5, §4.13 "flush every 25 ms").
    pub fn flush_all(&self) {
        let mut to_disconnect = Vec::new();

        for (id, client) in self.clients.read().iter() {
            let ticks: Vec<NormalizedTick> = {
                let mut pending = client.pending_ticks.lock();
                pending.drain().map(|(_, tick)| tick).collect()
            };

            for tick in ticks {
                client.outbox.push(SseEvent::Tick(tick));
            }

            if client.outbox.dropped_count() > self.max_outbox_len as u64 * DROP_DISCONNECT_MULTIPLE {
                to_disconnect.push(id.clone());
            }
        }

        for id in to_disconnect {
            debug!(%id, "client outbox exceeded drop threshold, disconnecting");
            self.disconnect(&id);
        }
    }

    pub fn heartbeat_all(&self) {
        for client in self.clients.read().values() {
            client.outbox.push(SseEvent::Heartbeat);
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }
}

impl TickHandler for SubscriptionBroker {
    fn on_tick(&self, tick: &NormalizedTick) {
        self.observe(tick);
    }
}
