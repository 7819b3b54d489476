use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use paper_instrument::InstrumentKey;
use paper_integration::metrics::Counters;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::{bus::TickHandler, tick::NormalizedTick};

/// Broker connection lifecycle state (§4.3 "Session state machine"). `ExpectedSilence` is entered
/// outside trading hours, during which the Feed Health Monitor's verdict is forced healthy even if
/// no ticks are arriving.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    ExpectedSilence,
    Failed,
}

struct LastSeen {
    at: Instant,
    price: Decimal,
}

/// Subscribes to the Tick Bus and evaluates feed health once a second (§4.6). Tracks
/// `lastSeenMs[key]`, a rolling tick rate, and the websocket-connected flag the Broker Adapter
/// maintains via [`Self::set_websocket_connected`].
pub struct FeedHealthMonitor {
    last_seen: RwLock<HashMap<InstrumentKey, LastSeen>>,
    subscribed: RwLock<HashSet<InstrumentKey>>,
    websocket_connected: AtomicBool,
    session_state: RwLock<SessionState>,
    counters: Counters,
    max_age: Duration,
    min_tick_rate: f64,
    min_active_tokens: usize,
    window_start: RwLock<Instant>,
    window_ticks: AtomicU64,
}

impl FeedHealthMonitor {
    pub fn new(max_age: Duration, min_tick_rate: f64, min_active_tokens: usize) -> Self {
        Self {
            last_seen: RwLock::new(HashMap::new()),
            subscribed: RwLock::new(HashSet::new()),
            websocket_connected: AtomicBool::new(false),
            session_state: RwLock::new(SessionState::Disconnected),
            counters: Counters::new(),
            max_age,
            min_tick_rate,
            min_active_tokens,
            window_start: RwLock::new(Instant::now()),
            window_ticks: AtomicU64::new(0),
        }
    }

    pub fn set_websocket_connected(&self, connected: bool) {
        self.websocket_connected.store(connected, Ordering::Relaxed);
    }

    pub fn set_session_state(&self, state: SessionState) {
        *self.session_state.write() = state;
    }

    pub fn session_state(&self) -> SessionState {
        *self.session_state.read()
    }

    pub fn set_subscribed(&self, keys: HashSet<InstrumentKey>) {
        *self.subscribed.write() = keys;
    }

    /// Last known price for `key` if seen within `max_age`, used as a fallback by the Price
    /// Oracle and the Fill Engine.
    pub fn last_price(&self, key: &InstrumentKey, max_age: Duration) -> Option<Decimal> {
        self.last_seen.read().get(key).and_then(|seen| {
            if seen.at.elapsed() <= max_age {
                Some(seen.price)
            } else {
                None
            }
        })
    }

    /// `healthy := websocketConnected ∧ globalAge ≤ MAX_AGE ∧ (subscribedCount < MIN_ACTIVE ∨ rate
    /// ≥ MIN_RATE) ∧ (subscribedCount = 0 ∨ staleCount < subscribedCount)` (§4.6). Forced `true`
    /// during `ExpectedSilence`.
    pub fn evaluate(&self) -> bool {
        if self.session_state() == SessionState::ExpectedSilence {
            return true;
        }

        if !self.websocket_connected.load(Ordering::Relaxed) {
            return false;
        }

        let last_seen = self.last_seen.read();
        let global_age_ok = last_seen
            .values()
            .map(|seen| seen.at.elapsed())
            .min()
            .map(|age| age <= self.max_age)
            .unwrap_or(false);

        if !global_age_ok && !last_seen.is_empty() {
            return false;
        }

        let subscribed = self.subscribed.read();
        let subscribed_count = subscribed.len();

        let rate_ok = if subscribed_count < self.min_active_tokens {
            true
        } else {
            self.current_rate() >= self.min_tick_rate
        };

        if !rate_ok {
            return false;
        }

        if subscribed_count == 0 {
            return true;
        }

        let stale_count = subscribed
            .iter()
            .filter(|key| {
                last_seen
                    .get(*key)
                    .map(|seen| seen.at.elapsed() > self.max_age)
                    .unwrap_or(true)
            })
            .count();

        stale_count < subscribed_count
    }

    fn current_rate(&self) -> f64 {
        let elapsed = self.window_start.read().elapsed().as_secs_f64().max(0.001);
        self.window_ticks.load(Ordering::Relaxed) as f64 / elapsed
    }

    /// Reset the rolling rate window, called by the 1s evaluation loop after each tick.
    pub fn roll_window(&self) {
        *self.window_start.write() = Instant::now();
        self.window_ticks.store(0, Ordering::Relaxed);
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }
}

impl TickHandler for FeedHealthMonitor {
    fn on_tick(&self, tick: &NormalizedTick) {
        self.last_seen.write().insert(
            tick.instrument_key.clone(),
            LastSeen {
                at: Instant::now(),
                price: tick.price,
            },
        );
        self.window_ticks.fetch_add(1, Ordering::Relaxed);
        self.counters.incr("feed.tick_observed");
    }
}

/// Convert a broker session timestamp into whether the session is currently outside trading hours
/// (used to transition into [`SessionState::ExpectedSilence`]). NSE cash/derivatives trade
/// 09:15-15:30 IST on weekdays; outside that window the Feed Supervisor should stop treating
/// silence as unhealthy.
pub fn is_outside_trading_hours(now: DateTime<Utc>) -> bool {
    use chrono::{Datelike, Timelike, Weekday};

    let ist = now + chrono::Duration::minutes(330);
    if matches!(ist.weekday(), Weekday::Sat | Weekday::Sun) {
        return true;
    }

    let minutes_since_midnight = ist.hour() as i64 * 60 + ist.minute() as i64;
    minutes_since_midnight < (9 * 60 + 15) || minutes_since_midnight > (15 * 60 + 30)
}
