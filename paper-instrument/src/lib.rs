//! Canonical in-memory registry of tradable contracts (§4.1, §3 Instrument).
//!
//! The [`store::InstrumentStore`] exclusively owns instrument metadata for the process; every
//! other component resolves instruments through it rather than caching its own copy.

pub mod error;
pub mod model;
pub mod store;

pub use error::InstrumentError;
pub use model::{Exchange, Instrument, InstrumentKey, InstrumentType, OptionType};
pub use store::InstrumentStore;
