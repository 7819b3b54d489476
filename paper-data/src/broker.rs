use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use bytes::Buf;
use derive_more::Constructor;
use paper_instrument::{InstrumentKey, InstrumentStore};
use paper_integration::metrics::Counters;
use parking_lot::RwLock;
use rand::Rng;
use tracing::{debug, warn};

use crate::{
    bus::TickBus,
    error::DataError,
    health::{FeedHealthMonitor, SessionState},
    tick::{BrokerRecord, NormalizedTick},
};

/// Exponential reconnection backoff capped at 30s with +/-20% jitter (§4.3 "reconnect scheduled
/// via exponential backoff capped at 30s and +/-20% jitter"). Mirrors the teacher ecosystem's
/// `ReconnectionBackoffPolicy` shape (`barter-data/src/streams/reconnect/stream.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Constructor)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub multiplier: u32,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            multiplier: 2,
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Backoff duration for the `attempt`-th consecutive failure (1-indexed), with uniform
    /// jitter in `[-20%, +20%]` applied after capping at `max`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self
            .initial
            .as_millis()
            .saturating_mul(u128::from(self.multiplier).saturating_pow(attempt.saturating_sub(1)));
        let capped = scaled.min(self.max.as_millis());

        let jitter_frac: f64 = rand::rng().random_range(-0.2..=0.2);
        let jittered = (capped as f64) * (1.0 + jitter_frac);
        Duration::from_millis(jittered.max(0.0) as u64)
    }
}

/// Number of consecutive connection failures after which the session transitions to
/// [`SessionState::Failed`] (§4.3).
pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Observed transition of the upstream connection, surfaced to callers (feed health, logging)
/// that want to react without polling [`FeedHealthMonitor::session_state`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connecting,
    Connected,
    Disconnected { next_attempt_in: Duration },
    Failed,
}

/// A reference-counted set of instrument subscriptions (§4.3 "Subscription set"). `subscribe`
/// increments and reports the keys that newly transitioned from zero (these must be sent upstream
/// in a single subscribe message); `unsubscribe` decrements and reports the keys that newly
/// reached zero (these must be sent upstream as an unsubscribe).
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    ref_counts: RwLock<HashMap<InstrumentKey, u32>>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, keys: &[InstrumentKey]) -> Vec<InstrumentKey> {
        let mut ref_counts = self.ref_counts.write();
        let mut newly_needed = Vec::new();

        for key in keys {
            let count = ref_counts.entry(key.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                newly_needed.push(key.clone());
            }
        }

        newly_needed
    }

    pub fn unsubscribe(&self, keys: &[InstrumentKey]) -> Vec<InstrumentKey> {
        let mut ref_counts = self.ref_counts.write();
        let mut newly_empty = Vec::new();

        for key in keys {
            if let Some(count) = ref_counts.get_mut(key) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ref_counts.remove(key);
                    newly_empty.push(key.clone());
                }
            }
        }

        newly_empty
    }

    /// The current active subscription set, sent as a single resubscribe message on reconnect
    /// (§4.3 "On reconnect, the current set is resubscribed in one message").
    pub fn active_keys(&self) -> Vec<InstrumentKey> {
        self.ref_counts.read().keys().cloned().collect()
    }

    pub fn ref_count(&self, key: &InstrumentKey) -> u32 {
        self.ref_counts.read().get(key).copied().unwrap_or(0)
    }
}

/// Tracks consecutive malformed-frame counts within a rolling window and opens a breaker that
/// pauses reconnect attempts for a cool-off once the threshold is crossed (§4.3 "repeated decode
/// failures open a breaker that pauses reconnects for a cool-off").
#[derive(Debug)]
pub struct DecodeBreaker {
    threshold: u32,
    cool_off: Duration,
    consecutive: AtomicU32,
    opened_at: RwLock<Option<std::time::Instant>>,
}

impl DecodeBreaker {
    pub fn new(threshold: u32, cool_off: Duration) -> Self {
        Self {
            threshold,
            cool_off,
            consecutive: AtomicU32::new(0),
            opened_at: RwLock::new(None),
        }
    }

    pub fn record_success(&self) {
        self.consecutive.store(0, Ordering::Relaxed);
    }

    /// Record a decode failure, returning `true` if this failure trips the breaker open.
    pub fn record_failure(&self) -> bool {
        let count = self.consecutive.fetch_add(1, Ordering::Relaxed) + 1;
        if count >= self.threshold {
            *self.opened_at.write() = Some(std::time::Instant::now());
            true
        } else {
            false
        }
    }

    /// `Some(remaining)` while the breaker is open and cooling off, `None` once it has elapsed.
    pub fn cooling_off(&self) -> Option<Duration> {
        let opened_at = *self.opened_at.read();
        opened_at.and_then(|at| {
            let elapsed = at.elapsed();
            if elapsed < self.cool_off {
                Some(self.cool_off - elapsed)
            } else {
                None
            }
        })
    }
}

/// Owns the single outbound broker connection for the process (§4.3). Decodes length-prefixed
/// binary wire frames into [`BrokerRecord`]s, resolves each against the [`InstrumentStore`], and
/// publishes the resulting [`NormalizedTick`]s to the [`TickBus`]. Session state and the
/// websocket-connected flag are tracked on the shared [`FeedHealthMonitor`] rather than
/// duplicated here, since both the adapter and the monitor need to agree on them.
pub struct BrokerAdapter {
    instruments: Arc<InstrumentStore>,
    tick_bus: Arc<TickBus>,
    health: Arc<FeedHealthMonitor>,
    subscriptions: SubscriptionSet,
    token: RwLock<Option<String>>,
    backoff: BackoffPolicy,
    breaker: DecodeBreaker,
    consecutive_failures: AtomicU32,
    counters: Counters,
}

impl BrokerAdapter {
    pub fn new(
        instruments: Arc<InstrumentStore>,
        tick_bus: Arc<TickBus>,
        health: Arc<FeedHealthMonitor>,
    ) -> Self {
        Self {
            instruments,
            tick_bus,
            health,
            subscriptions: SubscriptionSet::new(),
            token: RwLock::new(None),
            backoff: BackoffPolicy::default(),
            breaker: DecodeBreaker::new(20, Duration::from_secs(60)),
            consecutive_failures: AtomicU32::new(0),
            counters: Counters::new(),
        }
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    pub fn token(&self) -> Result<String, DataError> {
        self.token
            .read()
            .clone()
            .ok_or(DataError::UpstoxTokenMissing)
    }

    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Increment reference counts for `keys`, reporting which ones are newly needed upstream.
    /// Callers send a single subscribe message upstream for the returned keys.
    pub fn subscribe(&self, keys: &[InstrumentKey]) -> Vec<InstrumentKey> {
        let newly_needed = self.subscriptions.subscribe(keys);
        self.health
            .set_subscribed(self.subscriptions.active_keys().into_iter().collect());
        newly_needed
    }

    /// Decrement reference counts for `keys`, reporting which ones should be unsubscribed
    /// upstream (count reached zero).
    pub fn unsubscribe(&self, keys: &[InstrumentKey]) -> Vec<InstrumentKey> {
        let newly_empty = self.subscriptions.unsubscribe(keys);
        self.health
            .set_subscribed(self.subscriptions.active_keys().into_iter().collect());
        newly_empty
    }

    /// Decode a single length-prefixed binary record: a 2-byte big-endian wire-id length, the
    /// wire id itself, then `last_price`, `close_price`, `volume` as f64s and `timestamp` as an
    /// i64 (seconds since epoch) - all big-endian (§6 "length-prefixed binary records").
    pub fn decode_record(mut buf: &[u8]) -> Result<BrokerRecord, DataError> {
        if buf.len() < 2 {
            return Err(DataError::MalformedFrame("truncated wire id length".into()));
        }
        let wire_id_len = buf.get_u16() as usize;

        if buf.len() < wire_id_len + 32 {
            return Err(DataError::MalformedFrame("truncated record body".into()));
        }

        let wire_id_bytes = &buf[..wire_id_len];
        let wire_id = std::str::from_utf8(wire_id_bytes)
            .map_err(|_| DataError::MalformedFrame("wire id is not valid utf8".into()))?
            .to_string();
        buf.advance(wire_id_len);

        let last_price = buf.get_f64();
        let close_price = buf.get_f64();
        let volume = buf.get_f64();
        let timestamp = buf.get_i64();

        Ok(BrokerRecord {
            wire_id: wire_id.into(),
            last_price: rust_decimal::Decimal::from_f64_retain(last_price)
                .ok_or_else(|| DataError::MalformedFrame("non-finite last_price".into()))?,
            close_price: rust_decimal::Decimal::from_f64_retain(close_price)
                .unwrap_or_default(),
            volume: rust_decimal::Decimal::from_f64_retain(volume).unwrap_or_default(),
            timestamp,
        })
    }

    /// Decode every record packed into a single frame. Frames may carry multiple records
    /// back-to-back; record order within a frame is irrelevant (§6).
    pub fn decode_frame(mut buf: &[u8]) -> Vec<Result<BrokerRecord, DataError>> {
        let mut records = Vec::new();
        while !buf.is_empty() {
            match Self::decode_record(buf) {
                Ok(record) => {
                    let consumed = 2 + record.wire_id.len() + 32;
                    if consumed > buf.len() {
                        records.push(Err(DataError::MalformedFrame(
                            "record length exceeds remaining frame".into(),
                        )));
                        break;
                    }
                    buf.advance(consumed);
                    records.push(Ok(record));
                }
                Err(err) => {
                    records.push(Err(err));
                    break;
                }
            }
        }
        records
    }

    /// Resolve a decoded [`BrokerRecord`] against the Instrument Store and produce a
    /// [`NormalizedTick`] (§4.3 "Normalization"). Records whose wire id doesn't resolve are the
    /// caller's responsibility to count and drop.
    pub fn normalize(&self, record: &BrokerRecord) -> Result<NormalizedTick, DataError> {
        let instrument = self
            .instruments
            .resolve_wire_id(&record.wire_id)
            .map_err(|_| DataError::InstrumentNotFound(record.wire_id.to_string()))?;

        Ok(NormalizedTick::new(
            instrument.instrument_key.clone(),
            instrument.trading_symbol.clone(),
            record.last_price,
            record.volume,
            record.timestamp,
            instrument.exchange,
            Some(record.close_price),
        ))
    }

    /// Process one raw wire frame: decode every record, normalize, and publish resolved ticks to
    /// the Tick Bus. Malformed or unresolved records are counted and dropped, never raised as
    /// errors to the caller - §4.3 requires steady-state drops never log at error level.
    pub fn ingest_frame(&self, frame: &[u8]) {
        let mut any_malformed = false;

        for decoded in Self::decode_frame(frame) {
            match decoded {
                Ok(record) => match self.normalize(&record) {
                    Ok(tick) => {
                        self.breaker.record_success();
                        self.tick_bus.publish(tick);
                    }
                    Err(err) => {
                        self.counters.incr("frame.unresolved");
                        debug!(code = err.code(), wire_id = %record.wire_id, "tick did not resolve to an instrument");
                    }
                },
                Err(err) => {
                    any_malformed = true;
                    self.counters.incr("frame.malformed");
                    debug!(code = err.code(), "malformed broker frame");
                    if self.breaker.record_failure() {
                        warn!("decode breaker open after repeated malformed frames, cooling off");
                    }
                }
            }
        }

        if !any_malformed {
            self.breaker.record_success();
        }
    }

    /// Called by the reconnect loop after a connection attempt fails. Returns the delay before
    /// the next attempt, transitioning the session to [`SessionState::Failed`] after
    /// [`MAX_CONSECUTIVE_FAILURES`] (§4.3).
    pub fn on_connection_failed(&self) -> ConnectionEvent {
        let attempt = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        self.health.set_websocket_connected(false);

        if attempt >= MAX_CONSECUTIVE_FAILURES {
            self.health.set_session_state(SessionState::Failed);
            return ConnectionEvent::Failed;
        }

        self.health.set_session_state(SessionState::Disconnected);
        let delay = self.backoff.delay_for(attempt);
        ConnectionEvent::Disconnected {
            next_attempt_in: delay,
        }
    }

    /// Called once the first frame arrives on a fresh connection (§4.3 `CONNECTING -> CONNECTED`
    /// on first frame). Resets the consecutive failure counter.
    pub fn on_connected(&self) -> ConnectionEvent {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.health.set_websocket_connected(true);
        self.health.set_session_state(SessionState::Connected);
        ConnectionEvent::Connected
    }

    pub fn on_connecting(&self) -> ConnectionEvent {
        self.health.set_session_state(SessionState::Connecting);
        ConnectionEvent::Connecting
    }
}
