use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::RwLock;

/// A monotonic counter registry keyed by an arbitrary label (an error code, a frame-drop reason,
/// ...). §7 requires the core to "record a monotonic counter per code for observability"; this is
/// the plain-struct-plus-`parking_lot` implementation the teacher ecosystem reaches for instead
/// of a metrics-crate dependency (none of the example crates pull in `metrics`/`prometheus`).
#[derive(Debug, Default)]
pub struct Counters {
    values: RwLock<HashMap<String, AtomicU64>>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter for `label` by one, creating it at zero if unseen.
    pub fn incr(&self, label: &str) {
        self.incr_by(label, 1);
    }

    pub fn incr_by(&self, label: &str, amount: u64) {
        if let Some(counter) = self.values.read().get(label) {
            counter.fetch_add(amount, Ordering::Relaxed);
            return;
        }

        self.values
            .write()
            .entry(label.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(amount, Ordering::Relaxed);
    }

    pub fn get(&self, label: &str) -> u64 {
        self.values
            .read()
            .get(label)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.values
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }
}
